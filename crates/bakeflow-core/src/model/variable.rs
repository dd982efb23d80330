//! 変数定義

use serde::{Deserialize, Serialize};

/// 変数宣言
///
/// `default` キーが存在しない場合とJSON nullはどちらも `None` に
/// デコードされます。「デフォルトは空文字列」を表したい場合は
/// `""` を明示してください。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Variable {
    pub default: Option<String>,
}
