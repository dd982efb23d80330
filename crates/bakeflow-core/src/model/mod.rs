//! モデル定義
//!
//! Bakeファイルで使用されるデータモデルを定義します。
//! 各モデルは機能ごとにモジュールに分離されています。

mod bakefile;
mod group;
mod props;
mod target;
mod variable;

// Re-exports
pub use bakefile::*;
pub use group::*;
pub use props::*;
pub use target::*;
pub use variable::*;
