//! ビルド要求の組み立て
//!
//! 宣言的なターゲット定義を、外部イメージビルダーが消費できる
//! 具体的なビルド要求へ変換します。依存参照（`target:<name>`）の
//! 完了待ちはここで行われ、依存の失敗はビルダーを呼び出さずに
//! そのまま伝播します。

use crate::error::{BuildError, BuildResult};
use crate::gate::JobGate;
use crate::pending::PendingRegistry;
use bakeflow_core::{Props, Target};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 自動発見の対象となるContainerfileの標準ファイル名（優先順）
const CONTAINERFILE_NAMES: [&str; 2] = ["Containerfile", "Dockerfile"];

/// pullポリシー
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PullPolicy {
    /// ローカルに無い場合のみpull（デフォルト）
    #[default]
    IfMissing,
    /// 常にpull
    Always,
    /// pullしない
    Never,
    /// より新しい場合のみpull
    IfNewer,
}

impl PullPolicy {
    /// 大文字小文字を区別せずに文字列からパース
    pub fn parse(value: &str) -> BuildResult<Self> {
        match value.to_lowercase().as_str() {
            "" | "true" | "missing" | "ifmissing" | "notpresent" => Ok(Self::IfMissing),
            "always" => Ok(Self::Always),
            "false" | "never" => Ok(Self::Never),
            "ifnewer" | "newer" => Ok(Self::IfNewer),
            _ => Err(BuildError::UnknownPullPolicy(value.to_string())),
        }
    }
}

/// ターゲットプラットフォーム（`os/arch[/variant]`）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
    pub variant: Option<String>,
}

impl Platform {
    pub fn parse(value: &str) -> BuildResult<Self> {
        let mut parts = value.split('/');
        let (Some(os), Some(arch)) = (parts.next(), parts.next()) else {
            return Err(BuildError::InvalidPlatform(value.to_string()));
        };
        let variant = parts.next();
        if os.is_empty()
            || arch.is_empty()
            || variant.is_some_and(str::is_empty)
            || parts.next().is_some()
        {
            return Err(BuildError::InvalidPlatform(value.to_string()));
        }
        Ok(Self {
            os: os.to_string(),
            arch: arch.to_string(),
            variant: variant.map(str::to_string),
        })
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)?;
        if let Some(variant) = &self.variant {
            write!(f, "/{}", variant)?;
        }
        Ok(())
    }
}

/// ビルダーへ渡すContainerfileの指定
#[derive(Debug, Clone)]
pub enum Containerfile {
    /// ファイルパス
    Path(PathBuf),
    /// インライン内容（`dockerfile-inline`）
    Inline(String),
}

/// 解決済みの名前付き追加コンテキスト
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdditionalContext {
    /// ビルド済みイメージへの参照
    Image(String),
    /// リモートURL
    Url(String),
    /// ローカルパス
    Path(PathBuf),
}

impl AdditionalContext {
    /// 依存参照以外のコンテキスト値を分類する
    ///
    /// 相対パスは実行ディレクトリ基準で解決される。
    pub fn parse(value: &str, dir: &Path) -> BuildResult<Self> {
        if let Some(image) = value.strip_prefix("docker-image://") {
            return Ok(Self::Image(image.to_string()));
        }
        if value.starts_with("http://") || value.starts_with("https://") {
            return Ok(Self::Url(value.to_string()));
        }
        let path = std::path::absolute(resolve_path(dir, Path::new(value)))?;
        Ok(Self::Path(path))
    }
}

/// 外部イメージビルダーへ渡す具体的なビルド要求
#[derive(Clone, Debug)]
pub struct BuildRequest {
    /// ターゲット名（ログ・進捗表示用）
    pub name: String,
    /// 具体化されたビルド引数
    pub args: HashMap<String, String>,
    /// イメージアノテーション
    pub annotations: Vec<String>,
    /// 具体化されたイメージラベル
    pub labels: HashMap<String, String>,
    /// ビルドコンテキストディレクトリ（絶対パス）
    pub context_dir: PathBuf,
    /// マルチステージビルドのターゲットステージ名
    pub target_stage: Option<String>,
    /// プライマリ出力タグ
    pub output: Option<String>,
    /// エイリアスタグ
    pub additional_tags: Vec<String>,
    /// 解決済みの名前付き追加コンテキスト
    pub additional_contexts: BTreeMap<String, AdditionalContext>,
    /// ターゲットプラットフォーム
    pub platforms: Vec<Platform>,
    /// キャッシュ無効化
    pub no_cache: bool,
    /// pullポリシー
    pub pull: PullPolicy,
    /// ビルドシークレット（ビルダーへそのまま渡す）
    pub secrets: Vec<Props>,
    /// SSHエージェント転送設定（ビルダーへそのまま渡す）
    pub ssh: Vec<Props>,
    /// キャッシュインポート元（ビルダーへそのまま渡す）
    pub cache_from: Vec<Props>,
    /// キャッシュエクスポート先（ビルダーへそのまま渡す）
    pub cache_to: Vec<Props>,
    /// 出力設定（ビルダーへそのまま渡す）
    pub outputs: Vec<Props>,
    /// 入場ゲート（ビルダー実装が外部作業の前に獲得する）
    pub gate: JobGate,
}

/// 絶対パスはそのまま、相対パスは基準ディレクトリに結合する
fn resolve_path(base: &Path, target: &Path) -> PathBuf {
    if target.is_absolute() {
        target.to_path_buf()
    } else {
        base.join(target)
    }
}

/// 標準的なファイル名を探索してContainerfileを発見する
fn discover_containerfile(context_dir: &Path) -> BuildResult<PathBuf> {
    for name in CONTAINERFILE_NAMES {
        let candidate = context_dir.join(name);
        if candidate.is_file() {
            debug!("Found containerfile: {}", candidate.display());
            return Ok(candidate);
        }
    }
    Err(BuildError::ContainerfileNotFound(context_dir.to_path_buf()))
}

/// ターゲット定義からビルド要求を組み立てる
///
/// 各ステップは独立して失敗しうる：
/// 1. コンテキストディレクトリの解決（絶対パスはそのまま、相対は実行ディレクトリ基準）
/// 2. Containerfileの解決（inline > 明示パス > 自動発見）
/// 3. ビルド引数・ラベルの平坦化（null値は環境継承としてビルダーへ委ねる）
/// 4. 追加コンテキストの解決（依存参照はここで完了を待つ）
/// 5. プラットフォームとpullポリシーのパース
pub async fn prepare(
    name: &str,
    target: &Target,
    dir: &Path,
    pending: &PendingRegistry,
    gate: JobGate,
) -> BuildResult<(BuildRequest, Containerfile)> {
    // コンテキストディレクトリの解決（未指定は実行ディレクトリ自身）
    let context = if target.context.is_empty() {
        Path::new(".")
    } else {
        Path::new(&target.context)
    };
    let context_dir = std::path::absolute(resolve_path(dir, context))?;
    if !context_dir.is_dir() {
        return Err(BuildError::ContextNotFound(context_dir));
    }

    // Containerfileの解決
    let containerfile = if let Some(inline) = &target.dockerfile_inline {
        Containerfile::Inline(inline.clone())
    } else if let Some(dockerfile) = &target.dockerfile {
        let path = resolve_path(&context_dir, Path::new(dockerfile));
        if !path.is_file() {
            return Err(BuildError::ContainerfileNotFound(path));
        }
        Containerfile::Path(path)
    } else {
        Containerfile::Path(discover_containerfile(&context_dir)?)
    };

    // ビルド引数・ラベルの平坦化
    let args: HashMap<String, String> = target
        .args
        .iter()
        .filter_map(|(k, v)| v.as_ref().map(|v| (k.clone(), v.clone())))
        .collect();
    let labels: HashMap<String, String> = target
        .labels
        .iter()
        .filter_map(|(k, v)| v.as_ref().map(|v| (k.clone(), v.clone())))
        .collect();

    // タグの分割（先頭がプライマリ出力、残りはエイリアス）
    let mut tags = target.tags.iter();
    let output = tags.next().cloned();
    let additional_tags: Vec<String> = tags.cloned().collect();

    // 追加コンテキストの解決
    let mut additional_contexts = BTreeMap::new();
    for (ctx_name, value) in &target.contexts {
        let resolved = match Target::context_dependency(value) {
            Some(dep) => {
                let Some(pt) = pending.get(dep) else {
                    // 解決済み集合の構築が正しければ到達しない
                    debug_assert!(false, "dependency '{dep}' missing from pending registry");
                    return Err(BuildError::Internal(format!(
                        "依存 '{dep}' が解決済みターゲット集合に存在しません"
                    )));
                };
                match pt.wait().await {
                    Ok(dep_output) => AdditionalContext::Image(dep_output.id),
                    Err(cause) => {
                        return Err(BuildError::DependencyFailed {
                            target: dep.to_string(),
                            cause,
                        });
                    }
                }
            }
            None => AdditionalContext::parse(value, dir)?,
        };
        additional_contexts.insert(ctx_name.clone(), resolved);
    }

    // プラットフォームとpullポリシー
    let platforms = target
        .platforms
        .iter()
        .map(|p| Platform::parse(p))
        .collect::<BuildResult<Vec<_>>>()?;
    let pull = PullPolicy::parse(&target.pull)?;

    debug!(target = name, context = %context_dir.display(), "build request prepared");

    let request = BuildRequest {
        name: name.to_string(),
        args,
        annotations: target.annotations.clone(),
        labels,
        context_dir,
        target_stage: target.target.clone(),
        output,
        additional_tags,
        additional_contexts,
        platforms,
        no_cache: target.no_cache,
        pull,
        secrets: target.secret.clone(),
        ssh: target.ssh.clone(),
        cache_from: target.cache_from.clone(),
        cache_to: target.cache_to.clone(),
        outputs: target.output.clone(),
        gate,
    };

    Ok((request, containerfile))
}
