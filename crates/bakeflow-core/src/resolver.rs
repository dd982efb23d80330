//! ターゲットグラフの解決
//!
//! 要求されたターゲット/グループ名を、依存関係順で重複のない
//! 具体的なターゲット名のリストへ展開します。

use crate::error::{BakeError, Result};
use crate::model::Bakefile;
use std::collections::HashMap;
use tracing::debug;

/// 訪問状態（循環検出用の彩色）
#[derive(Clone, Copy, PartialEq)]
enum Visit {
    InProgress,
    Done,
}

/// 要求された名前を依存関係順のターゲット名リストへ展開
///
/// - グループは宣言順に再帰展開される（名前解決はグループがターゲットより優先）
/// - ターゲットは `contexts` の `target:<name>` 参照を先に展開してから
///   自身を追加するため、依存は必ず依存元より前に並ぶ
/// - 各名前は一度だけ訪問され、結果には初出位置で一度だけ現れる
/// - 未知の名前は `TargetNotFound`、循環参照は `CircularDependency`
pub fn resolve<S: AsRef<str>>(file: &Bakefile, names: &[S]) -> Result<Vec<String>> {
    let mut resolved = Vec::new();
    let mut visited: HashMap<String, Visit> = HashMap::new();

    for name in names {
        walk(file, name.as_ref(), &mut resolved, &mut visited)?;
    }

    debug!(count = resolved.len(), "target graph resolved");
    Ok(resolved)
}

fn walk(
    file: &Bakefile,
    name: &str,
    resolved: &mut Vec<String>,
    visited: &mut HashMap<String, Visit>,
) -> Result<()> {
    match visited.get(name) {
        Some(Visit::Done) => return Ok(()),
        Some(Visit::InProgress) => {
            return Err(BakeError::CircularDependency(name.to_string()));
        }
        None => {}
    }
    visited.insert(name.to_string(), Visit::InProgress);

    if let Some(group) = file.groups.get(name) {
        for member in &group.targets {
            walk(file, member, resolved, visited)?;
        }
    } else if let Some(target) = file.targets.get(name) {
        for dep in target.dependencies() {
            walk(file, dep, resolved, visited)?;
        }
        resolved.push(name.to_string());
    } else {
        return Err(BakeError::TargetNotFound(name.to_string()));
    }

    visited.insert(name.to_string(), Visit::Done);
    Ok(())
}
