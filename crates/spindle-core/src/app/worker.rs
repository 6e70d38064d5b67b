//! WorkerGroup - フェッチ → 実行 → 状態遷移 → acknowledge のループ
//!
//! # 1 件の流れ
//! 1. fetch_next_job（shutdown トークンで中断可能）
//! 2. Processing 状態へ
//! 3. JobPerformer::perform
//! 4. 成功なら Succeeded、失敗なら Failed（理由つき）→ acknowledge
//!
//! shutdown が実行中に来たら perform を打ち切ってリースを release する。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::JobStorage;
use crate::domain::{State, state_names};
use crate::error::StorageError;
use crate::fetch::FetchedJob;
use crate::reader::JobData;

const STORAGE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Runs a job's invocation. The error string becomes the `Failed` state reason.
#[async_trait]
pub trait JobPerformer: Send + Sync {
    async fn perform(&self, job: &JobData) -> Result<(), String>;
}

/// Worker group handle.
/// - `request_shutdown()` で全ワーカーが止まる（実行中のジョブは release される）
/// - `shutdown_and_join()` で全ワーカーの終了を待てる
pub struct WorkerGroup {
    shutdown: CancellationToken,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers fetching from `queues` in priority order.
    pub fn spawn(
        n: usize,
        storage: JobStorage,
        queues: Vec<String>,
        performer: Arc<dyn JobPerformer>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let queues: Arc<[String]> = queues.into();

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let worker = Worker {
                id: worker_id,
                storage: storage.clone(),
                queues: Arc::clone(&queues),
                performer: Arc::clone(&performer),
                shutdown: shutdown.clone(),
            };
            joins.push(tokio::spawn(worker.run()));
        }
        info!(workers = n, queues = ?queues, "worker group started");

        Self { shutdown, joins }
    }

    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(err) = join.await {
                warn!("worker task ended abnormally: {err}");
            }
        }
        info!("worker group stopped");
    }
}

struct Worker {
    id: usize,
    storage: JobStorage,
    queues: Arc<[String]>,
    performer: Arc<dyn JobPerformer>,
    shutdown: CancellationToken,
}

impl Worker {
    async fn run(self) {
        let fetcher = self.storage.fetcher();
        loop {
            let mut lease = match fetcher.fetch_next_job(&self.queues[..], &self.shutdown).await {
                Ok(lease) => lease,
                Err(err) if err.is_cancelled() => break,
                Err(err) => {
                    warn!(worker = self.id, "fetch failed: {err}");
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(STORAGE_ERROR_BACKOFF) => continue,
                    }
                }
            };

            if let Err(err) = self.process(&mut lease).await {
                warn!(worker = self.id, job_id = %lease.job_id(), "job processing failed: {err}");
            }
            // Anything not acknowledged goes back to its queue.
            if let Err(err) = lease.finish().await {
                warn!(worker = self.id, "release failed: {err}");
            }
        }
        debug!(worker = self.id, "worker stopped");
    }

    async fn process(&self, lease: &mut FetchedJob) -> Result<(), StorageError> {
        let job_id = lease.job_id();

        let Some(job) = self.storage.reader().get_job_data(job_id).await? else {
            // Expired or deleted while queued.
            warn!(worker = self.id, %job_id, "fetched job no longer exists");
            return lease.acknowledge().await;
        };

        let mut tx = self.storage.transaction();
        tx.set_job_state(job_id, &State::new(state_names::PROCESSING));
        tx.commit().await?;

        let outcome = tokio::select! {
            _ = self.shutdown.cancelled() => {
                debug!(worker = self.id, %job_id, "shutdown during perform, releasing");
                let mut tx = self.storage.transaction();
                tx.set_job_state(job_id, &State::new(state_names::ENQUEUED).with_reason("Worker shutdown"));
                tx.commit().await?;
                return lease.release().await;
            }
            outcome = self.performer.perform(&job) => outcome,
        };

        let mut tx = self.storage.transaction();
        match outcome {
            Ok(()) => {
                debug!(worker = self.id, %job_id, "job succeeded");
                tx.set_job_state(job_id, &State::new(state_names::SUCCEEDED));
                tx.increment_counter("stats:succeeded")?;
            }
            Err(reason) => {
                debug!(worker = self.id, %job_id, %reason, "job failed");
                tx.set_job_state(job_id, &State::new(state_names::FAILED).with_reason(reason));
                tx.increment_counter("stats:failed")?;
            }
        }
        tx.commit().await?;
        lease.acknowledge().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::test_support::{Harness, queues};

    /// Succeeds unless the first argument is "fail".
    #[derive(Default)]
    struct Recorder {
        performed: AtomicUsize,
    }

    #[async_trait]
    impl JobPerformer for Recorder {
        async fn perform(&self, job: &JobData) -> Result<(), String> {
            self.performed.fetch_add(1, Ordering::SeqCst);
            match job.invocation.arguments.first().and_then(|v| v.as_str()) {
                Some("fail") => Err("requested failure".into()),
                _ => Ok(()),
            }
        }
    }

    struct Forever;

    #[async_trait]
    impl JobPerformer for Forever {
        async fn perform(&self, _job: &JobData) -> Result<(), String> {
            std::future::pending().await
        }
    }

    async fn wait_until<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check().await {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn workers_record_success_and_failure() {
        let h = Harness::new().await;
        let ok = h.enqueue_with_argument("default", "ok").await;
        let failed = h.enqueue_with_argument("critical", "fail").await;
        let recorder = Arc::new(Recorder::default());

        let group = WorkerGroup::spawn(
            2,
            h.storage.clone(),
            queues(&["critical", "default"]),
            recorder.clone(),
        );
        let reader = h.storage.reader();
        wait_until(|| {
            let reader = reader.clone();
            async move {
                reader.get_counter("stats:succeeded").await.unwrap() == 1
                    && reader.get_counter("stats:failed").await.unwrap() == 1
            }
        })
        .await;
        group.shutdown_and_join().await;

        assert_eq!(recorder.performed.load(Ordering::SeqCst), 2);
        assert_eq!(h.job(ok).await.state_name.as_deref(), Some("Succeeded"));
        let failed_job = h.job(failed).await;
        assert_eq!(failed_job.state_name.as_deref(), Some("Failed"));
        assert_eq!(
            failed_job.state_history.last().unwrap().reason.as_deref(),
            Some("requested failure")
        );
        assert_eq!(failed_job.queue, None);
    }

    #[tokio::test]
    async fn shutdown_releases_the_in_flight_job() {
        let h = Harness::new().await;
        let id = h.enqueue("default").await;
        let group = WorkerGroup::spawn(1, h.storage.clone(), queues(&["default"]), Arc::new(Forever));
        let harness = &h;
        wait_until(move || async move {
            harness.job(id).await.state_name.as_deref() == Some("Processing")
        })
        .await;

        group.shutdown_and_join().await;

        let job = h.job(id).await;
        assert_eq!(job.queue.as_deref(), Some("default"));
        assert_eq!(job.fetched_at, None);
        assert_eq!(job.state_name.as_deref(), Some("Enqueued"));
    }

    #[tokio::test]
    async fn idle_workers_stop_on_shutdown() {
        let h = Harness::new().await;
        let group = WorkerGroup::spawn(3, h.storage.clone(), queues(&["default"]), Arc::new(Forever));

        tokio::time::timeout(Duration::from_secs(5), group.shutdown_and_join())
            .await
            .unwrap();
    }
}
