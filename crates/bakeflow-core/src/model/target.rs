//! ターゲット定義

use super::props::Props;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// 依存参照のプレフィックス（`contexts` の値が `target:<name>` 形式）
pub const TARGET_CONTEXT_PREFIX: &str = "target:";

/// ターゲット - 1つのイメージビルド要求のテンプレート
///
/// JSON形式：
/// ```json
/// {
///     "context": "./app",
///     "dockerfile": "Dockerfile",
///     "args": { "VERSION": "1.2.3" },
///     "contexts": { "base": "target:base" },
///     "tags": ["repo/app:latest"]
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Target {
    /// ビルドコンテキストのパス（未指定時は実行ディレクトリ）
    pub context: String,
    /// Containerfileのパス（コンテキストディレクトリからの相対パス）
    pub dockerfile: Option<String>,
    /// Containerfileの内容を直接指定（`dockerfile` より優先）
    pub dockerfile_inline: Option<String>,
    /// ビルド引数（値がnullの場合はビルダーの環境から継承）
    pub args: HashMap<String, Option<String>>,
    /// 名前付き追加コンテキスト（`target:<name>` は依存参照）
    ///
    /// 依存展開の順序を決定的にするため宣言名順に保持する。
    pub contexts: BTreeMap<String, String>,
    /// イメージタグ（先頭がプライマリ出力、残りはエイリアス）
    pub tags: Vec<String>,
    /// ターゲットプラットフォーム（`os/arch[/variant]` 形式）
    pub platforms: Vec<String>,
    /// pullポリシー文字列（空 = if-missing）
    pub pull: String,
    /// キャッシュ無効化フラグ
    pub no_cache: bool,
    /// マルチステージビルドのターゲットステージ名
    pub target: Option<String>,
    /// 説明文
    pub description: Option<String>,
    /// イメージに付与するアノテーション
    pub annotations: Vec<String>,
    /// イメージラベル（値がnullのエントリは除外）
    pub labels: HashMap<String, Option<String>>,
    /// ビルドシークレット（ビルダーへそのまま渡す）
    pub secret: Vec<Props>,
    /// SSHエージェント転送設定（ビルダーへそのまま渡す）
    pub ssh: Vec<Props>,
    /// キャッシュインポート元（ビルダーへそのまま渡す）
    pub cache_from: Vec<Props>,
    /// キャッシュエクスポート先（ビルダーへそのまま渡す）
    pub cache_to: Vec<Props>,
    /// 出力設定（ビルダーへそのまま渡す）
    pub output: Vec<Props>,
}

impl Target {
    /// `contexts` の値から依存ターゲット名を抽出
    pub fn context_dependency(value: &str) -> Option<&str> {
        value.strip_prefix(TARGET_CONTEXT_PREFIX)
    }

    /// このターゲットが依存するターゲット名を宣言名順に返す
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.contexts
            .values()
            .filter_map(|value| Self::context_dependency(value))
    }
}
