//! グループ定義

use serde::{Deserialize, Serialize};

/// グループ - 複数のターゲットをひとつの別名でまとめる
///
/// メンバーはターゲット名またはネストしたグループ名。
/// 宣言順は解決結果の順序に反映されます。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Group {
    pub targets: Vec<String>,
}
