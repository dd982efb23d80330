//! ビルドスケジューラ
//!
//! 解決済みターゲットごとに1タスクを一斉に起動する。起動順の制御は
//! 行わず、依存関係は完了フューチャで、外部実行数は入場ゲートで
//! 強制する。依存のビルド要求は依存先のフューチャが通知された後に
//! のみ組み立てられるため、データ順序だけが保証される。

use crate::builder::ImageBuilder;
use crate::error::{BuildError, BuildResult};
use crate::gate::JobGate;
use crate::pending::{BuildMetadata, BuildOutput, PendingRegistry, PendingTarget};
use crate::request;
use bakeflow_core::{Bakefile, resolve};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

/// 1回のビルド実行のオプション
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// 相対パス解決の基準ディレクトリ（通常はBakeファイルの場所）
    pub dir: PathBuf,
    /// 同時に実行する外部ビルドステージ数（0 = 無制限）
    pub jobs: usize,
    /// 最初のエラーで実行中の兄弟タスクを中断する
    ///
    /// デフォルトは無効：エラー観測後は待機を打ち切るだけで、
    /// 既に動いている無関係なターゲットのビルドは完走する。
    pub fail_fast: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::new(),
            jobs: 1,
            fail_fast: false,
        }
    }
}

/// 要求された名前を解決し、全ターゲットを並行ビルドする
///
/// 戻り値は成功したターゲット名 → メタデータのマップ。
/// 完了待ちの最初に観測されたエラーが実行全体の結果になる。
pub async fn run_build(
    file: &Bakefile,
    requested: &[String],
    builder: Arc<dyn ImageBuilder>,
    options: &RunOptions,
) -> BuildResult<BTreeMap<String, BuildMetadata>> {
    let target_names = resolve(file, requested)?;
    info!(
        targets = target_names.len(),
        jobs = options.jobs,
        "starting build run"
    );

    // どのタスクが先に走っても依存のフューチャを参照できるよう、
    // タスク起動前にフューチャ表を完成させる
    let pending: Arc<PendingRegistry> = Arc::new(
        target_names
            .iter()
            .map(|name| (name.clone(), Arc::new(PendingTarget::new())))
            .collect(),
    );

    let gate = JobGate::new(options.jobs);
    let file = Arc::new(file.clone());

    let mut handles = Vec::with_capacity(target_names.len());
    for name in &target_names {
        let name = name.clone();
        let own = Arc::clone(&pending[&name]);
        let file = Arc::clone(&file);
        let pending = Arc::clone(&pending);
        let builder = Arc::clone(&builder);
        let gate = gate.clone();
        let dir = options.dir.clone();

        handles.push(tokio::spawn(async move {
            let outcome = build_target(&name, &file, &dir, &pending, builder, gate).await;
            // 自タスクのフューチャへ一度だけ書き込む
            own.signal(outcome);
        }));
    }

    // 解決順に完了を待つ。最初のエラーで待機を打ち切る。
    let mut metadata = BTreeMap::new();
    for name in &target_names {
        match pending[name].wait().await {
            Ok(output) => {
                metadata.insert(name.clone(), output.metadata);
            }
            Err(cause) => {
                error!(target = %name, error = %cause, "build failed");
                if options.fail_fast {
                    // 実行中の兄弟タスクを中断する（オプトイン動作）
                    for handle in &handles {
                        handle.abort();
                    }
                }
                return Err(BuildError::TargetFailed {
                    target: name.clone(),
                    cause,
                });
            }
        }
    }

    info!(built = metadata.len(), "build run complete");
    Ok(metadata)
}

/// 1ターゲット分のビルドタスク本体
async fn build_target(
    name: &str,
    file: &Bakefile,
    dir: &Path,
    pending: &PendingRegistry,
    builder: Arc<dyn ImageBuilder>,
    gate: JobGate,
) -> BuildResult<BuildOutput> {
    let Some(target) = file.targets.get(name) else {
        // 解決済み集合に載った名前がターゲット表に無いのは
        // プログラミングエラーであり、ユーザー入力では到達しない
        debug_assert!(false, "resolved target '{name}' missing from manifest");
        return Err(BuildError::Internal(format!(
            "解決済みターゲット '{name}' がマニフェストに存在しません"
        )));
    };

    debug!(target = name, "build task started");
    let (build_request, containerfile) =
        request::prepare(name, target, dir, pending, gate).await?;
    builder.build(&build_request, &containerfile).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{AdditionalContext, BuildRequest, Containerfile};
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;

    /// ゲートを尊重しつつ呼び出しを記録するテスト用ビルダー
    struct RecordingBuilder {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        requests: Mutex<Vec<BuildRequest>>,
        failures: HashSet<String>,
        delay: Duration,
    }

    impl RecordingBuilder {
        fn new(delay: Duration) -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
                failures: HashSet::new(),
                delay,
            }
        }

        fn failing(delay: Duration, failures: &[&str]) -> Self {
            let mut builder = Self::new(delay);
            builder.failures = failures.iter().map(|s| s.to_string()).collect();
            builder
        }

        fn built_names(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.name.clone())
                .collect()
        }

        fn request_for(&self, name: &str) -> Option<BuildRequest> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.name == name)
                .cloned()
        }
    }

    #[async_trait::async_trait]
    impl ImageBuilder for RecordingBuilder {
        async fn build(
            &self,
            request: &BuildRequest,
            _containerfile: &Containerfile,
        ) -> BuildResult<BuildOutput> {
            let _permit = request.gate.acquire().await;

            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.requests.lock().unwrap().push(request.clone());

            if self.failures.contains(&request.name) {
                return Err(BuildError::BuildFailed(format!(
                    "mock failure: {}",
                    request.name
                )));
            }

            Ok(BuildOutput {
                id: format!("sha256:{}", request.name),
                metadata: BuildMetadata {
                    digest: Some(format!("sha256:digest-{}", request.name)),
                },
            })
        }
    }

    /// 全ターゲットがinline Containerfileを持つBakeファイルを組み立てる
    fn bakefile(dir: &Path, json: serde_json::Value) -> Bakefile {
        let mut file: Bakefile = serde_json::from_value(json).unwrap();
        for target in file.targets.values_mut() {
            target.context = dir.to_str().unwrap().to_string();
            target.dockerfile_inline = Some("FROM scratch".to_string());
        }
        file
    }

    fn options(dir: &Path, jobs: usize) -> RunOptions {
        RunOptions {
            dir: dir.to_path_buf(),
            jobs,
            fail_fast: false,
        }
    }

    #[tokio::test]
    async fn test_run_build_success() {
        let temp_dir = tempdir().unwrap();
        let file = bakefile(
            temp_dir.path(),
            serde_json::json!({
                "target": { "a": {}, "b": {} },
                "group": { "default": { "targets": ["a", "b"] } }
            }),
        );

        let builder = Arc::new(RecordingBuilder::new(Duration::from_millis(1)));
        let metadata = run_build(
            &file,
            &["default".to_string()],
            builder.clone(),
            &options(temp_dir.path(), 0),
        )
        .await
        .unwrap();

        assert_eq!(metadata.len(), 2);
        assert_eq!(
            metadata["a"].digest.as_deref(),
            Some("sha256:digest-a")
        );

        let mut built = builder.built_names();
        built.sort();
        assert_eq!(built, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_concurrency_limit_one_never_overlaps() {
        let temp_dir = tempdir().unwrap();
        let file = bakefile(
            temp_dir.path(),
            serde_json::json!({
                "target": { "a": {}, "b": {}, "c": {}, "d": {} },
                "group": { "default": { "targets": ["a", "b", "c", "d"] } }
            }),
        );

        let builder = Arc::new(RecordingBuilder::new(Duration::from_millis(10)));
        run_build(
            &file,
            &["default".to_string()],
            builder.clone(),
            &options(temp_dir.path(), 1),
        )
        .await
        .unwrap();

        assert_eq!(builder.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(builder.built_names().len(), 4);
    }

    #[tokio::test]
    async fn test_unbounded_runs_concurrently() {
        let temp_dir = tempdir().unwrap();
        let file = bakefile(
            temp_dir.path(),
            serde_json::json!({
                "target": { "a": {}, "b": {}, "c": {}, "d": {} },
                "group": { "default": { "targets": ["a", "b", "c", "d"] } }
            }),
        );

        let builder = Arc::new(RecordingBuilder::new(Duration::from_millis(10)));
        run_build(
            &file,
            &["default".to_string()],
            builder.clone(),
            &options(temp_dir.path(), 0),
        )
        .await
        .unwrap();

        // 依存の無い4ターゲットは同時に実行される
        assert!(builder.max_in_flight.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn test_dependency_id_wired_into_dependent() {
        let temp_dir = tempdir().unwrap();
        let file = bakefile(
            temp_dir.path(),
            serde_json::json!({
                "target": {
                    "base": {},
                    "app": { "contexts": { "base": "target:base" } }
                }
            }),
        );

        let builder = Arc::new(RecordingBuilder::new(Duration::from_millis(1)));
        run_build(
            &file,
            &["app".to_string()],
            builder.clone(),
            &options(temp_dir.path(), 0),
        )
        .await
        .unwrap();

        // 依存の完了後にのみ要求が組み立てられるため、IDが見えている
        let app_request = builder.request_for("app").unwrap();
        assert_eq!(
            app_request.additional_contexts.get("base"),
            Some(&AdditionalContext::Image("sha256:base".to_string()))
        );
    }

    #[tokio::test]
    async fn test_failed_dependency_short_circuits_dependent() {
        let temp_dir = tempdir().unwrap();
        let file = bakefile(
            temp_dir.path(),
            serde_json::json!({
                "target": {
                    "a": {},
                    "b": { "contexts": { "base": "target:a" } }
                },
                "group": { "default": { "targets": ["a", "b"] } }
            }),
        );

        let builder = Arc::new(RecordingBuilder::failing(
            Duration::from_millis(1),
            &["a"],
        ));
        let err = run_build(
            &file,
            &["default".to_string()],
            builder.clone(),
            &options(temp_dir.path(), 0),
        )
        .await
        .unwrap_err();

        // bは外部ビルダーを呼ばず、実行結果はaの失敗を報告する
        assert_eq!(builder.built_names(), vec!["a"]);
        assert!(err.to_string().contains("mock failure: a"));
    }

    #[tokio::test]
    async fn test_tags_split_passed_to_builder() {
        let temp_dir = tempdir().unwrap();
        let file = bakefile(
            temp_dir.path(),
            serde_json::json!({
                "target": {
                    "app": { "tags": ["repo:latest", "repo:v1"] }
                }
            }),
        );

        let builder = Arc::new(RecordingBuilder::new(Duration::from_millis(1)));
        run_build(
            &file,
            &["app".to_string()],
            builder.clone(),
            &options(temp_dir.path(), 0),
        )
        .await
        .unwrap();

        let request = builder.request_for("app").unwrap();
        assert_eq!(request.output.as_deref(), Some("repo:latest"));
        assert_eq!(request.additional_tags, vec!["repo:v1"]);
    }

    #[tokio::test]
    async fn test_unknown_target_fails_before_any_build() {
        let temp_dir = tempdir().unwrap();
        let file = bakefile(temp_dir.path(), serde_json::json!({ "target": { "a": {} } }));

        let builder = Arc::new(RecordingBuilder::new(Duration::from_millis(1)));
        let err = run_build(
            &file,
            &["missing".to_string()],
            builder.clone(),
            &options(temp_dir.path(), 0),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, BuildError::Manifest(_)));
        assert!(builder.built_names().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_siblings_survive_first_error_by_default() {
        let temp_dir = tempdir().unwrap();
        let file = bakefile(
            temp_dir.path(),
            serde_json::json!({
                "target": { "bad": {}, "slow": {} },
                "group": { "default": { "targets": ["bad", "slow"] } }
            }),
        );

        // badは即失敗、slowは長時間かかる独立ターゲット
        let builder = Arc::new(SplitDelayBuilder::new("slow", Duration::from_secs(300)));
        let err = run_build(
            &file,
            &["default".to_string()],
            builder.clone(),
            &RunOptions {
                dir: temp_dir.path().to_path_buf(),
                jobs: 0,
                fail_fast: false,
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("mock failure: bad"));

        // 待機は打ち切られたが、slowのタスクはバックグラウンドで完走する
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(builder.completed.lock().unwrap().contains("slow"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_fast_aborts_running_siblings() {
        let temp_dir = tempdir().unwrap();
        let file = bakefile(
            temp_dir.path(),
            serde_json::json!({
                "target": { "bad": {}, "slow": {} },
                "group": { "default": { "targets": ["bad", "slow"] } }
            }),
        );

        let builder = Arc::new(SplitDelayBuilder::new("slow", Duration::from_secs(300)));
        let err = run_build(
            &file,
            &["default".to_string()],
            builder.clone(),
            &RunOptions {
                dir: temp_dir.path().to_path_buf(),
                jobs: 0,
                fail_fast: true,
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("mock failure: bad"));

        // slowのタスクは中断されたため完了しない
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(!builder.completed.lock().unwrap().contains("slow"));
    }

    /// `slow_name` のターゲットだけ長い遅延を持ち、"bad" は即失敗する
    struct SplitDelayBuilder {
        slow_name: String,
        slow_delay: Duration,
        completed: Mutex<HashSet<String>>,
    }

    impl SplitDelayBuilder {
        fn new(slow_name: &str, slow_delay: Duration) -> Self {
            Self {
                slow_name: slow_name.to_string(),
                slow_delay,
                completed: Mutex::new(HashSet::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl ImageBuilder for SplitDelayBuilder {
        async fn build(
            &self,
            request: &BuildRequest,
            _containerfile: &Containerfile,
        ) -> BuildResult<BuildOutput> {
            let _permit = request.gate.acquire().await;

            if request.name == self.slow_name {
                tokio::time::sleep(self.slow_delay).await;
            }
            self.completed.lock().unwrap().insert(request.name.clone());

            if request.name == "bad" {
                return Err(BuildError::BuildFailed("mock failure: bad".to_string()));
            }
            Ok(BuildOutput {
                id: format!("sha256:{}", request.name),
                metadata: BuildMetadata::default(),
            })
        }
    }
}
