//! FetchedJob - 取得済みジョブのリース
//!
//! # ライフサイクル
//! - `acknowledge()`: キューから外す（完了）
//! - `release()`: キューへ戻す（リトライ / シャットダウン）
//! - どちらもせずに手放すと release 扱い
//!
//! 明示的な後始末は `finish()`。Drop は async を待てないので、
//! 実行中の tokio ランタイムに release を投げるだけのフォールバック。

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::app::JobStorage;
use crate::domain::JobId;
use crate::error::StorageError;

/// Exclusive lease on one claimed job.
pub struct FetchedJob {
    storage: JobStorage,
    job_id: JobId,
    queue: String,
    fetched_at: DateTime<Utc>,
    settled: bool,
}

impl std::fmt::Debug for FetchedJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedJob")
            .field("job_id", &self.job_id)
            .field("queue", &self.queue)
            .field("fetched_at", &self.fetched_at)
            .field("settled", &self.settled)
            .finish_non_exhaustive()
    }
}

impl FetchedJob {
    pub(crate) fn new(
        storage: JobStorage,
        job_id: JobId,
        queue: String,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            storage,
            job_id,
            queue,
            fetched_at,
            settled: false,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Claim timestamp; identifies this lease among later reclaims.
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// Whether the job was acknowledged or released.
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// Take the job off its queue. Written immediately in its own transaction.
    ///
    /// A job whose state is "enqueued" again goes back to the queue instead.
    pub async fn acknowledge(&mut self) -> Result<(), StorageError> {
        let mut tx = self.storage.transaction();
        tx.remove_from_queue(self.job_id, self.fetched_at, &self.queue)?;
        tx.commit().await?;
        self.settled = true;
        debug!(job_id = %self.job_id, queue = %self.queue, "job acknowledged");
        Ok(())
    }

    /// Return the job to its queue. Written immediately in its own transaction.
    pub async fn release(&mut self) -> Result<(), StorageError> {
        requeue(&self.storage, self.job_id, &self.queue).await?;
        self.settled = true;
        debug!(job_id = %self.job_id, queue = %self.queue, "job released");
        Ok(())
    }

    /// Release the job unless it was already acknowledged or released.
    pub async fn finish(mut self) -> Result<(), StorageError> {
        if !self.settled {
            self.release().await?;
        }
        Ok(())
    }
}

async fn requeue(storage: &JobStorage, job_id: JobId, queue: &str) -> Result<(), StorageError> {
    let mut tx = storage.transaction();
    tx.requeue(job_id, queue)?;
    tx.commit().await?;
    Ok(())
}

impl Drop for FetchedJob {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let job_id = self.job_id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let storage = self.storage.clone();
                let queue = std::mem::take(&mut self.queue);
                debug!(%job_id, %queue, "unsettled lease dropped, releasing");
                handle.spawn(async move {
                    if let Err(err) = requeue(&storage, job_id, &queue).await {
                        warn!(%job_id, %queue, "release of dropped lease failed: {err}");
                    }
                });
            }
            Err(_) => {
                warn!(
                    %job_id,
                    queue = %self.queue,
                    "unsettled lease dropped outside a runtime; job stays fetched"
                );
            }
        }
    }
}
