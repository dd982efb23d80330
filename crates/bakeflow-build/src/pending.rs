//! ターゲット完了フューチャ
//!
//! 解決済みターゲットごとに1つ生成される write-once / multi-reader の
//! 完了シグナル。所有タスクが `signal()` を一度だけ呼び、依存タスクと
//! 集約側は `wait()` で完了を待ちます。全waiterは同じ結果を観測します。

use crate::error::{BuildError, BuildResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

/// ビルド結果メタデータ（メタデータファイルへ直列化される形）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildMetadata {
    #[serde(
        rename = "containerimage.digest",
        skip_serializing_if = "Option::is_none"
    )]
    pub digest: Option<String>,
}

/// 1ターゲット分のビルド成果
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// ビルドされたイメージの識別子
    pub id: String,
    /// メタデータファイルへ書き出される付随情報
    pub metadata: BuildMetadata,
}

/// 完了時に全waiterへ共有される結果
///
/// エラーは `Arc` で共有され、依存側すべてが同一の失敗を観測する。
pub type TargetOutcome = Result<BuildOutput, Arc<BuildError>>;

/// 解決済みターゲット名 → 完了フューチャの表
///
/// どのタスクが先に起動しても依存のフューチャを参照できるよう、
/// タスク起動前に全エントリを構築しておく。構築後は読み取り専用。
pub type PendingRegistry = HashMap<String, Arc<PendingTarget>>;

/// ビルド完了を待ち合わせるターゲットごとのフューチャ
pub struct PendingTarget {
    tx: watch::Sender<Option<TargetOutcome>>,
}

impl PendingTarget {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// ビルド結果を通知する
    ///
    /// 所有タスクから一度だけ呼ぶこと。waiterがいなくても結果は保持される。
    pub fn signal(&self, outcome: BuildResult<BuildOutput>) {
        let _ = self.tx.send(Some(outcome.map_err(Arc::new)));
    }

    /// ビルド完了まで待機し、結果を返す
    ///
    /// 複数タスクからの同時待機を許容し、全員が同じ結果を受け取る。
    pub async fn wait(&self) -> TargetOutcome {
        let mut rx = self.tx.subscribe();
        loop {
            {
                let value = rx.borrow_and_update();
                if let Some(outcome) = value.as_ref() {
                    return outcome.clone();
                }
            }
            if rx.changed().await.is_err() {
                return Err(Arc::new(BuildError::Internal(
                    "ビルドタスクが結果を通知せずに終了しました".to_string(),
                )));
            }
        }
    }
}

impl Default for PendingTarget {
    fn default() -> Self {
        Self::new()
    }
}
