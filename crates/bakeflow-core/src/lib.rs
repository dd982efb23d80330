//! Bakeflow コア機能
//!
//! Bakeファイルのデータモデルとターゲットグラフの解決を提供します。
//! 実際のイメージビルドは bakeflow-build クレートが担当します。

pub mod error;
pub mod loader;
pub mod model;
pub mod resolver;

pub use error::{BakeError, Result};
pub use loader::{decode_bakefile, load_bakefile};
pub use model::*;
pub use resolver::resolve;
