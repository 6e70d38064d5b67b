//! JobFetcher - キューからジョブを 1 件取得する
//!
//! # アルゴリズム
//! 1. キャンセル済みなら即 Cancelled
//! 2. 呼び出し側の優先順にすべてのキューを走査し、アトミックな claim を試す
//! 3. 取れたら、そのキューの未消費シグナルを 1 つ消費して返す
//! 4. 取れなければ起床シグナルを待つ（最大 queue_poll_interval）→ 1 へ
//!
//! シグナルはヒントにすぎない。起こされたキューに関係なく毎回全キューを優先順に走査する。

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::FetchedJob;
use crate::app::JobStorage;
use crate::domain::{Document, DocumentKind};
use crate::error::{StorageError, require_non_empty};
use crate::ports::WaitOutcome;
use crate::store::{Filter, Update};

/// Claims jobs for workers.
#[derive(Clone)]
pub struct JobFetcher {
    storage: JobStorage,
}

impl JobFetcher {
    pub(crate) fn new(storage: JobStorage) -> Self {
        Self { storage }
    }

    /// Block until a job on one of `queues` is claimed or `cancel` fires.
    ///
    /// Earlier queues win when several have work.
    pub async fn fetch_next_job<Q: AsRef<str>>(
        &self,
        queues: &[Q],
        cancel: &CancellationToken,
    ) -> Result<FetchedJob, StorageError> {
        if queues.is_empty() {
            return Err(StorageError::invalid_argument("queues", "must not be empty"));
        }
        let queues: Vec<String> = queues.iter().map(|q| q.as_ref().to_string()).collect();
        for queue in &queues {
            require_non_empty("queues", queue)?;
        }

        let signal = self.storage.signal();
        let poll_interval = self.storage.options().queue_poll_interval;
        loop {
            if cancel.is_cancelled() {
                return Err(StorageError::Cancelled);
            }

            for queue in &queues {
                if let Some(job) = self.try_claim(queue).await? {
                    signal.wait_non_blocking(queue);
                    debug!(job_id = %job.job_id(), queue = %queue, "job fetched");
                    return Ok(job);
                }
            }

            match signal.wait_any(&queues, cancel, poll_interval).await? {
                WaitOutcome::Signaled(queue) => trace!(%queue, "queue signaled"),
                WaitOutcome::TimedOut => trace!("poll interval elapsed, sweeping queues"),
            }
        }
    }

    /// One atomic claim attempt on `queue`.
    async fn try_claim(&self, queue: &str) -> Result<Option<FetchedJob>, StorageError> {
        let now = self.storage.clock().now();
        let filter = Filter::and([
            Filter::Kind(DocumentKind::Job),
            Filter::Queue(queue.to_string()),
            self.claimable(now),
        ]);

        let claimed = self
            .storage
            .store()
            .find_one_and_update(&filter, &[Update::SetFetchedAt(Some(now))])
            .await?;

        Ok(claimed.and_then(Document::into_job).map(|job| {
            FetchedJob::new(self.storage.clone(), job.id, queue.to_string(), now)
        }))
    }

    /// Never fetched, or fetched longer ago than the invisibility timeout.
    fn claimable(&self, now: DateTime<Utc>) -> Filter {
        let not_fetched = Filter::FetchedAt(None);
        let cutoff = self
            .storage
            .options()
            .invisibility_timeout
            .and_then(|timeout| chrono::Duration::from_std(timeout).ok())
            .and_then(|timeout| now.checked_sub_signed(timeout));

        match cutoff {
            Some(cutoff) => Filter::or([not_fetched, Filter::FetchedBefore(cutoff)]),
            None => not_fetched,
        }
    }
}
