//! WakeSignal port - キューの起床通知
//!
//! フェッチャーがビジーポーリングせずに待つための仕組み。
//! 実装は 2 種類（どちらを使うかは外部設定で決まる）：
//! - LocalWakeSignal: プロセス内カウンタのみ（他プロセスの書き込みは見えない）
//! - TailingWakeSignal: Notification フィードを tail してプロセス間で通知

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::StorageError;

/// Result of a bounded wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// One pending signal for this queue was consumed.
    Signaled(String),
    TimedOut,
}

#[async_trait]
pub trait WakeSignal: Send + Sync {
    /// Wait until one of `queues` is signaled, `timeout` elapses or `cancel` fires.
    ///
    /// Queues are checked in the given order. Cancellation returns
    /// `StorageError::Cancelled`.
    async fn wait_any(
        &self,
        queues: &[String],
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Result<WaitOutcome, StorageError>;

    /// Consume one pending signal for `queue` if there is one.
    fn wait_non_blocking(&self, queue: &str) -> bool;

    /// Record that new work may exist on each of `queues`.
    async fn signal(&self, queues: &[String]) -> Result<(), StorageError>;
}
