//! プロパティリスト定義

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// `key=value` ペアの集合
///
/// JSON形式はオブジェクトとコンパクトな文字列の両方を受け付けます：
/// - `{"type": "registry", "ref": "ghcr.io/owner/cache"}`
/// - `"type=registry,ref=ghcr.io/owner/cache"`
///
/// 文字列形式で `=` を含まない要素は空文字列の値として扱われます。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Props(pub BTreeMap<String, String>);

impl<'de> Deserialize<'de> for Props {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Map(BTreeMap<String, String>),
        }

        let props = match Repr::deserialize(deserializer)? {
            Repr::Text(raw) => raw
                .split(',')
                .map(|kv| match kv.split_once('=') {
                    Some((k, v)) => (k.to_string(), v.to_string()),
                    None => (kv.to_string(), String::new()),
                })
                .collect(),
            Repr::Map(map) => map,
        };

        Ok(Props(props))
    }
}

impl Props {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `key=value,...` 形式へ直列化（CLIフラグ受け渡し用）
    pub fn to_flag_value(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{}={}", k, v)
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}
