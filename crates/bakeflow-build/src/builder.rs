//! イメージビルダー
//!
//! ビルド要求を実際のイメージビルドへ変換する外部コラボレーター。
//! 通常のビルドはDocker daemon API（bollard）で実行し、daemon APIで
//! 表現できない要求（追加コンテキスト、複数プラットフォーム、
//! キャッシュ入出力、シークレット等）は `docker buildx build`
//! サブプロセスへフォールバックする。

use crate::context::ContextBuilder;
use crate::error::{BuildError, BuildResult};
use crate::pending::{BuildMetadata, BuildOutput};
use crate::request::{AdditionalContext, BuildRequest, Containerfile, PullPolicy};
use async_trait::async_trait;
use bollard::Docker;
use colored::Colorize;
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use tracing::{debug, info};

/// 外部イメージビルダー
///
/// 実装は外部作業を開始する前に `request.gate` のスロットを獲得すること。
/// 同時実行の上限はこのゲートを通じて全ターゲットで共有される。
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// 1ターゲット分のビルドを実行してイメージIDとメタデータを返す
    async fn build(
        &self,
        request: &BuildRequest,
        containerfile: &Containerfile,
    ) -> BuildResult<BuildOutput>;
}

/// Docker daemonを使用するビルダー
pub struct DockerBuilder {
    docker: Docker,
}

/// daemonのクラシックビルドAPIで表現できない要求かどうか
fn needs_buildx(request: &BuildRequest) -> bool {
    !request.additional_contexts.is_empty()
        || request.platforms.len() > 1
        || !request.annotations.is_empty()
        || !request.secrets.is_empty()
        || !request.ssh.is_empty()
        || !request.cache_from.is_empty()
        || !request.cache_to.is_empty()
        || !request.outputs.is_empty()
}

impl DockerBuilder {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// daemon APIによるビルド。成功時はイメージIDを返す
    async fn build_with_api(
        &self,
        request: &BuildRequest,
        containerfile: &Containerfile,
    ) -> BuildResult<String> {
        info!(target = %request.name, "building via daemon API");

        let context_data = ContextBuilder::create_archive(&request.context_dir, containerfile)?;

        let buildargs: HashMap<&str, &str> = request
            .args
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let labels: HashMap<&str, &str> = request
            .labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let platform = request
            .platforms
            .first()
            .map(|p| p.to_string())
            .unwrap_or_default();

        #[allow(deprecated)]
        let options = bollard::image::BuildImageOptions {
            dockerfile: "Dockerfile",
            t: request.output.as_deref().unwrap_or(""),
            buildargs,
            labels,
            target: request.target_stage.as_deref().unwrap_or(""),
            nocache: request.no_cache,
            platform: &platform,
            rm: true,
            forcerm: true,
            // daemonのビルドAPIはbool pullしか持たないため Always のみ強制pull
            pull: matches!(request.pull, PullPolicy::Always),
            ..Default::default()
        };

        debug!("Build options: {:?}", options);

        use bytes::Bytes;
        use http_body_util::{Either, Full};
        let body = Full::new(Bytes::from(context_data));

        #[allow(deprecated)]
        let mut stream = self.docker.build_image(options, None, Some(Either::Left(body)));

        let mut image_id = None;
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(output) => {
                    if let Some(id) = Self::handle_build_output(output)? {
                        image_id = Some(id);
                    }
                }
                Err(e) => {
                    return Err(BuildError::DockerConnection(e));
                }
            }
        }

        match image_id {
            Some(id) => Ok(id),
            None => {
                // auxメッセージを返さないdaemonではプライマリタグから逆引きする
                let reference = request.output.as_deref().ok_or_else(|| {
                    BuildError::BuildFailed("イメージIDを特定できませんでした".to_string())
                })?;
                let inspect = self.docker.inspect_image(reference).await?;
                inspect.id.ok_or_else(|| {
                    BuildError::BuildFailed("イメージIDを特定できませんでした".to_string())
                })
            }
        }
    }

    /// `docker buildx build` サブプロセスによるビルド
    ///
    /// daemon APIに無い `--build-context` / `--platform` /
    /// `--secret` / `--cache-from` 等をそのまま受け渡す。
    async fn build_with_buildx(
        &self,
        request: &BuildRequest,
        containerfile: &Containerfile,
    ) -> BuildResult<String> {
        use tokio::process::Command;

        info!(target = %request.name, "building via docker buildx");

        // インラインContainerfileは一時ファイル経由で渡す
        let mut _inline_file = None;
        let containerfile_path = match containerfile {
            Containerfile::Path(path) => path.clone(),
            Containerfile::Inline(content) => {
                let file = tempfile::NamedTempFile::new()?;
                std::fs::write(file.path(), content)?;
                let path = file.path().to_path_buf();
                _inline_file = Some(file);
                path
            }
        };

        // イメージIDの受け取りにはiidfileを使う
        let iidfile = tempfile::NamedTempFile::new()?;

        let mut cmd = Command::new("docker");
        cmd.arg("buildx")
            .arg("build")
            .arg("-f")
            .arg(&containerfile_path)
            .arg("--iidfile")
            .arg(iidfile.path());

        // 出力指定が無くローカルで使う場合のみ --load
        // （複数プラットフォームのloadはbuildx側が拒否する）
        if request.outputs.is_empty() && request.platforms.len() <= 1 {
            cmd.arg("--load");
        }

        if let Some(tag) = &request.output {
            cmd.arg("-t").arg(tag);
        }
        for (key, value) in &request.args {
            cmd.arg("--build-arg").arg(format!("{}={}", key, value));
        }
        for (key, value) in &request.labels {
            cmd.arg("--label").arg(format!("{}={}", key, value));
        }
        for annotation in &request.annotations {
            cmd.arg("--annotation").arg(annotation);
        }
        if let Some(stage) = &request.target_stage {
            cmd.arg("--target").arg(stage);
        }
        if request.no_cache {
            cmd.arg("--no-cache");
        }
        if matches!(request.pull, PullPolicy::Always) {
            cmd.arg("--pull");
        }

        if !request.platforms.is_empty() {
            let platforms: Vec<String> =
                request.platforms.iter().map(|p| p.to_string()).collect();
            cmd.arg("--platform").arg(platforms.join(","));
        }

        for (name, context) in &request.additional_contexts {
            let value = match context {
                AdditionalContext::Image(id) => format!("docker-image://{}", id),
                AdditionalContext::Url(url) => url.clone(),
                AdditionalContext::Path(path) => path.display().to_string(),
            };
            cmd.arg("--build-context").arg(format!("{}={}", name, value));
        }

        for props in &request.secrets {
            cmd.arg("--secret").arg(props.to_flag_value());
        }
        for props in &request.ssh {
            cmd.arg("--ssh").arg(props.to_flag_value());
        }
        for props in &request.cache_from {
            cmd.arg("--cache-from").arg(props.to_flag_value());
        }
        for props in &request.cache_to {
            cmd.arg("--cache-to").arg(props.to_flag_value());
        }
        for props in &request.outputs {
            cmd.arg("--output").arg(props.to_flag_value());
        }

        cmd.arg(&request.context_dir);

        debug!(target = %request.name, "running: {:?}", cmd.as_std());

        let output = cmd.output().await.map_err(BuildError::Io)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BuildError::BuildFailed(stderr.trim().to_string()));
        }

        let id = std::fs::read_to_string(iidfile.path())?.trim().to_string();
        if id.is_empty() {
            return Err(BuildError::BuildFailed(
                "イメージIDを特定できませんでした".to_string(),
            ));
        }
        Ok(id)
    }

    /// ビルド出力の処理。auxメッセージからイメージIDを拾う
    fn handle_build_output(output: bollard::models::BuildInfo) -> BuildResult<Option<String>> {
        if let Some(stream) = output.stream {
            // ビルドステップの出力
            print!("{}", stream);
        }

        if let Some(error) = output.error {
            return Err(BuildError::BuildFailed(error));
        }

        if let Some(error_detail) = output.error_detail {
            let error_msg = error_detail
                .message
                .unwrap_or_else(|| "Unknown build error".to_string());
            return Err(BuildError::BuildFailed(error_msg));
        }

        if let Some(status) = output.status {
            // ステータスメッセージ（pull等）
            println!("{}", status.cyan());
        }

        Ok(output.aux.and_then(|aux| aux.id))
    }

    /// ビルド済みイメージへエイリアスタグを付与
    async fn apply_tag(&self, id: &str, tag: &str) -> BuildResult<()> {
        // `:` がパス区切りに現れるケース（localhost:5000/repo）はタグとみなさない
        let (repo, tag_part) = match tag.rsplit_once(':') {
            Some((repo, t)) if !t.contains('/') => (repo, t),
            _ => (tag, "latest"),
        };

        #[allow(deprecated)]
        let options = bollard::image::TagImageOptions {
            repo,
            tag: tag_part,
        };
        self.docker.tag_image(id, Some(options)).await?;
        Ok(())
    }

    /// プライマリタグからリポジトリダイジェストを取得
    ///
    /// 出力タグの無いターゲットは参照を生成しないためNoneになる。
    async fn resolve_digest(&self, request: &BuildRequest) -> BuildResult<Option<String>> {
        let Some(reference) = request.output.as_deref() else {
            return Ok(None);
        };
        let inspect = self.docker.inspect_image(reference).await?;
        Ok(inspect
            .repo_digests
            .and_then(|digests| digests.into_iter().next()))
    }
}

#[async_trait]
impl ImageBuilder for DockerBuilder {
    async fn build(
        &self,
        request: &BuildRequest,
        containerfile: &Containerfile,
    ) -> BuildResult<BuildOutput> {
        // 外部実行スロットの獲得（ビルド完了まで保持）
        let _permit = request.gate.acquire().await;

        let id = if needs_buildx(request) {
            self.build_with_buildx(request, containerfile).await?
        } else {
            self.build_with_api(request, containerfile).await?
        };

        // エイリアスタグの付与
        for tag in &request.additional_tags {
            self.apply_tag(&id, tag).await?;
        }

        let digest = self.resolve_digest(request).await?;
        info!(target = %request.name, id = %id, "build finished");

        Ok(BuildOutput {
            id,
            metadata: BuildMetadata { digest },
        })
    }
}
