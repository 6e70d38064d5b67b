//! LocalWakeSignal - プロセス内のキュー起床通知
//!
//! # 実装詳細
//! - HashMap<String, usize> でキューごとの未消費シグナル数を管理
//! - tokio::sync::Notify で待機中のフェッチャーを起こす
//! - `notified()` を先に enable してからカウンタを見る（通知の取りこぼし防止）

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::StorageError;
use crate::ports::{WaitOutcome, WakeSignal};

/// Countable signal per queue name, visible only inside this process.
#[derive(Default)]
pub struct LocalWakeSignal {
    pending: Mutex<HashMap<String, usize>>,
    notify: Notify,
}

impl LocalWakeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one pending signal to `queue` and wake every waiter.
    pub fn release(&self, queue: &str) {
        {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            *pending.entry(queue.to_string()).or_default() += 1;
        }
        self.notify.notify_waiters();
    }

    /// Pending signals for `queue`.
    pub fn pending(&self, queue: &str) -> usize {
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.get(queue).copied().unwrap_or(0)
    }

    fn try_take(&self, queue: &str) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        match pending.get_mut(queue) {
            Some(count) if *count > 0 => {
                *count -= 1;
                true
            }
            _ => false,
        }
    }

    fn try_take_any(&self, queues: &[String]) -> Option<String> {
        queues.iter().find(|q| self.try_take(q)).cloned()
    }
}

#[async_trait]
impl WakeSignal for LocalWakeSignal {
    async fn wait_any(
        &self,
        queues: &[String],
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Result<WaitOutcome, StorageError> {
        let deadline = Instant::now() + timeout;
        loop {
            if cancel.is_cancelled() {
                return Err(StorageError::Cancelled);
            }

            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(queue) = self.try_take_any(queues) {
                return Ok(WaitOutcome::Signaled(queue));
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StorageError::Cancelled),
                _ = tokio::time::sleep_until(deadline) => return Ok(WaitOutcome::TimedOut),
                _ = &mut notified => {}
            }
        }
    }

    fn wait_non_blocking(&self, queue: &str) -> bool {
        self.try_take(queue)
    }

    async fn signal(&self, queues: &[String]) -> Result<(), StorageError> {
        for queue in queues {
            self.release(queue);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn queues(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn pending_signal_is_consumed_by_wait_any() {
        let signal = LocalWakeSignal::new();
        signal.signal(&queues(&["default"])).await.unwrap();

        let outcome = signal
            .wait_any(&queues(&["default"]), &CancellationToken::new(), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(outcome, WaitOutcome::Signaled("default".into()));
        assert_eq!(signal.pending("default"), 0);
    }

    #[tokio::test]
    async fn wait_any_prefers_earlier_queues() {
        let signal = LocalWakeSignal::new();
        signal.signal(&queues(&["default", "critical"])).await.unwrap();

        let outcome = signal
            .wait_any(
                &queues(&["critical", "default"]),
                &CancellationToken::new(),
                Duration::from_secs(1),
            )
            .await
            .unwrap();

        assert_eq!(outcome, WaitOutcome::Signaled("critical".into()));
    }

    #[tokio::test]
    async fn wait_any_times_out() {
        let signal = LocalWakeSignal::new();
        let start = Instant::now();

        let outcome = signal
            .wait_any(&queues(&["default"]), &CancellationToken::new(), Duration::from_millis(100))
            .await
            .unwrap();

        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn cancellation_interrupts_the_wait() {
        let signal = LocalWakeSignal::new();
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let err = signal
            .wait_any(&queues(&["default"]), &cancel, Duration::from_secs(30))
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn signal_wakes_a_waiter() {
        let signal = Arc::new(LocalWakeSignal::new());
        let waiter = tokio::spawn({
            let signal = signal.clone();
            async move {
                signal
                    .wait_any(&queues(&["default"]), &CancellationToken::new(), Duration::from_secs(5))
                    .await
                    .unwrap()
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        signal.release("default");

        assert_eq!(waiter.await.unwrap(), WaitOutcome::Signaled("default".into()));
    }

    #[test]
    fn wait_non_blocking_only_consumes_available_signals() {
        let signal = LocalWakeSignal::new();
        assert!(!signal.wait_non_blocking("default"));

        signal.release("default");

        assert!(signal.wait_non_blocking("default"));
        assert!(!signal.wait_non_blocking("default"));
        assert!(!signal.wait_non_blocking("critical"));
    }
}
