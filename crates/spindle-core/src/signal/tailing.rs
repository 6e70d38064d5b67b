//! TailingWakeSignal - Notification フィードによるプロセス間の起床通知
//!
//! # 仕組み
//! - `signal()` はキューごとに Notification をストアへ追記する
//! - バックグラウンドの tailer がフィードを読み、LocalWakeSignal を 1 つずつ進める
//! - 待機（wait_any / wait_non_blocking）は LocalWakeSignal にそのまま委譲
//!
//! 起動時点より前の通知は再生しない（カーソルは最新位置から始まる）。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::LocalWakeSignal;
use crate::domain::{FeedPosition, Notification};
use crate::error::StorageError;
use crate::ports::{Clock, DocumentStore, WaitOutcome, WakeSignal};

const TAIL_BATCH: usize = 256;

/// Cross-process wake signal backed by the notification feed.
pub struct TailingWakeSignal {
    local: Arc<LocalWakeSignal>,
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
    tailer: Option<JoinHandle<()>>,
}

impl TailingWakeSignal {
    /// Position the cursor at the end of the feed and spawn the tailer.
    ///
    /// Must be called inside a tokio runtime.
    pub async fn start(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
    ) -> Result<Self, StorageError> {
        let cursor = store.latest_notification().await?;
        let local = Arc::new(LocalWakeSignal::new());
        let shutdown = CancellationToken::new();

        let tailer = tokio::spawn(tail_notifications(
            Arc::clone(&store),
            Arc::clone(&local),
            cursor,
            poll_interval,
            shutdown.clone(),
        ));
        debug!(?cursor, "notification tailer started");

        Ok(Self {
            local,
            store,
            clock,
            shutdown,
            tailer: Some(tailer),
        })
    }

    /// Stop the tailer and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(tailer) = self.tailer.take() {
            let _ = tailer.await;
        }
    }
}

impl Drop for TailingWakeSignal {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn tail_notifications(
    store: Arc<dyn DocumentStore>,
    local: Arc<LocalWakeSignal>,
    mut cursor: Option<FeedPosition>,
    poll_interval: Duration,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }

        loop {
            match store.notifications_after(cursor, TAIL_BATCH).await {
                Ok(batch) => {
                    let drained = batch.len() < TAIL_BATCH;
                    for (position, notification) in batch {
                        local.release(&notification.queue);
                        cursor = Some(position);
                    }
                    if drained {
                        break;
                    }
                }
                Err(err) => {
                    warn!("notification tail read failed: {err}");
                    break;
                }
            }
        }
    }
    debug!("notification tailer stopped");
}

#[async_trait]
impl WakeSignal for TailingWakeSignal {
    async fn wait_any(
        &self,
        queues: &[String],
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Result<WaitOutcome, StorageError> {
        self.local.wait_any(queues, cancel, timeout).await
    }

    fn wait_non_blocking(&self, queue: &str) -> bool {
        self.local.wait_non_blocking(queue)
    }

    async fn signal(&self, queues: &[String]) -> Result<(), StorageError> {
        if queues.is_empty() {
            return Ok(());
        }
        let now = self.clock.now();
        let notifications = queues
            .iter()
            .map(|queue| Notification::job_enqueued(queue.clone(), now))
            .collect();
        self.store.insert_notifications(notifications).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::SystemClock;
    use crate::store::InMemoryDocumentStore;
    use chrono::Utc;

    async fn start(store: &InMemoryDocumentStore) -> TailingWakeSignal {
        TailingWakeSignal::start(
            Arc::new(store.clone()),
            Arc::new(SystemClock),
            Duration::from_millis(10),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn notifications_from_another_writer_wake_the_waiter() {
        let store = InMemoryDocumentStore::new();
        let signal = start(&store).await;

        // Another process writing to the same feed.
        store
            .insert_notifications(vec![Notification::job_enqueued("default", Utc::now())])
            .await
            .unwrap();

        let outcome = signal
            .wait_any(&["default".to_string()], &CancellationToken::new(), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(outcome, WaitOutcome::Signaled("default".into()));
        signal.shutdown().await;
    }

    #[tokio::test]
    async fn signal_appends_one_notification_per_queue() {
        let store = InMemoryDocumentStore::new();
        let signal = start(&store).await;

        signal
            .signal(&["critical".to_string(), "default".to_string()])
            .await
            .unwrap();

        let feed = store.notifications_after(None, 10).await.unwrap();
        let queues: Vec<_> = feed.iter().map(|(_, n)| n.queue.as_str()).collect();
        assert_eq!(queues, ["critical", "default"]);
        signal.shutdown().await;
    }

    #[tokio::test]
    async fn notifications_before_start_are_not_replayed() {
        let store = InMemoryDocumentStore::new();
        store
            .insert_notifications(vec![Notification::job_enqueued("default", Utc::now())])
            .await
            .unwrap();
        let signal = start(&store).await;

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!signal.wait_non_blocking("default"));
        signal.shutdown().await;
    }
}
