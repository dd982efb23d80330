use bakeflow_core::BakeError;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Containerfileが見つかりません: {0}")]
    ContainerfileNotFound(PathBuf),

    #[error("ビルドコンテキストが見つかりません: {0}")]
    ContextNotFound(PathBuf),

    #[error("不明なpullポリシー: {0:?}")]
    UnknownPullPolicy(String),

    #[error("不正なプラットフォーム指定: {0:?}")]
    InvalidPlatform(String),

    #[error("Docker接続エラー: {0}")]
    DockerConnection(#[from] bollard::errors::Error),

    #[error("ビルドに失敗しました: {0}")]
    BuildFailed(String),

    #[error("マニフェストエラー: {0}")]
    Manifest(#[from] BakeError),

    #[error("依存ターゲット '{target}' のビルドに失敗しました: {cause}")]
    DependencyFailed {
        target: String,
        cause: Arc<BuildError>,
    },

    #[error("ターゲット '{target}' のビルドに失敗しました: {cause}")]
    TargetFailed {
        target: String,
        cause: Arc<BuildError>,
    },

    #[error("不正なビルド設定: {0}")]
    InvalidConfig(String),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("内部エラー: {0}")]
    Internal(String),
}

impl BuildError {
    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            BuildError::ContainerfileNotFound(path) => {
                format!(
                    "Containerfileが見つかりません: {}\n\
                     \n\
                     解決方法:\n\
                     1. コンテキストディレクトリに Containerfile か Dockerfile を置いてください\n\
                     2. ターゲットの dockerfile フィールドでパスを明示してください:\n\
                        \"dockerfile\": \"path/to/Dockerfile\"",
                    path.display()
                )
            }
            BuildError::ContextNotFound(path) => {
                format!(
                    "ビルドコンテキストが見つかりません: {}\n\
                     \n\
                     Bakeファイルの context パスを確認してください。",
                    path.display()
                )
            }
            BuildError::BuildFailed(msg) => {
                format!(
                    "ビルドに失敗しました: {}\n\
                     \n\
                     Containerfileの内容を確認してください。",
                    msg
                )
            }
            BuildError::DependencyFailed { target, cause } => {
                format!(
                    "依存ターゲット '{}' のビルドに失敗したため中断しました。\n\
                     \n\
                     原因: {}",
                    target,
                    cause.user_message()
                )
            }
            _ => format!("{}", self),
        }
    }
}

pub type BuildResult<T> = std::result::Result<T, BuildError>;
