//! 同時実行制御ゲート
//!
//! 外部ビルダーで同時に実行されるビルドステージ数を制限する
//! カウンティングセマフォのハンドル。1回の実行の間プロセス全体で
//! 共有され、ビルダー実装が外部作業の前にスロットを獲得します。

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// 同時ジョブ数を制限する入場ゲート
///
/// `new(0)` は無制限（ゲートなし）。クローンは同じゲートを共有する。
#[derive(Clone, Debug)]
pub struct JobGate {
    permits: Option<Arc<Semaphore>>,
}

impl JobGate {
    /// 同時実行数 `jobs` のゲートを生成（0 = 無制限）
    pub fn new(jobs: usize) -> Self {
        let permits = if jobs == 0 {
            None
        } else {
            Some(Arc::new(Semaphore::new(jobs)))
        };
        Self { permits }
    }

    /// 無制限ゲート
    pub fn unbounded() -> Self {
        Self { permits: None }
    }

    /// 実行スロットを獲得する
    ///
    /// 返されたパーミットはドロップまで保持される。無制限ゲートでは
    /// 待機せず `None` を返す。
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        match &self.permits {
            Some(sem) => Some(
                sem.clone()
                    .acquire_owned()
                    .await
                    .expect("job gate semaphore closed"),
            ),
            None => None,
        }
    }
}
