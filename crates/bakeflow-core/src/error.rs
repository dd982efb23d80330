use thiserror::Error;

#[derive(Error, Debug)]
pub enum BakeError {
    #[error("JSONパースエラー: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("ターゲットが見つかりません: {0}")]
    TargetNotFound(String),

    #[error("循環依存が検出されました: {0}")]
    CircularDependency(String),
}

pub type Result<T> = std::result::Result<T, BakeError>;
