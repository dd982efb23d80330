//! Bakeファイル定義

use super::group::Group;
use super::target::Target;
use super::variable::Variable;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Bakeファイル - ビルド全体の設計図
///
/// Bakeファイルは複数のターゲットとグループを定義し、
/// どのイメージをどの依存関係でビルドするかを記述します。
/// 名前空間はセクションごとに独立しているため、同じ名前が
/// ターゲットとグループの両方に存在しうる（解決時はグループ優先）。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Bakefile {
    /// このファイルで定義されるターゲット
    #[serde(rename = "target")]
    pub targets: HashMap<String, Target>,
    /// このファイルで定義されるグループ
    #[serde(rename = "group")]
    pub groups: HashMap<String, Group>,
    /// 宣言された変数とそのデフォルト値
    #[serde(rename = "variable")]
    pub variables: HashMap<String, Variable>,
}
