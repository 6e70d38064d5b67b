//! Queue monitoring views: what is waiting and what is being worked on.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::{Document, DocumentKind, JobDocument, JobId};
use crate::error::{StorageError, require_non_empty};
use crate::ports::DocumentStore;
use crate::store::Filter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    /// On the queue and not fetched.
    pub enqueued: usize,
    /// On the queue under a lease (possibly a stale one).
    pub fetched: usize,
}

#[derive(Clone)]
pub struct QueueMonitor {
    store: Arc<dyn DocumentStore>,
}

impl QueueMonitor {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    async fn jobs(&self, filter: Filter) -> Result<Vec<JobDocument>, StorageError> {
        let docs = self
            .store
            .find(&Filter::and([Filter::Kind(DocumentKind::Job), filter]))
            .await?;
        Ok(docs.into_iter().filter_map(Document::into_job).collect())
    }

    /// Distinct queue names that currently hold jobs, sorted.
    pub async fn queues(&self) -> Result<Vec<String>, StorageError> {
        let jobs = self.jobs(Filter::Kind(DocumentKind::Job)).await?;
        let names: BTreeSet<String> = jobs.into_iter().filter_map(|job| job.queue).collect();
        Ok(names.into_iter().collect())
    }

    pub async fn counts(&self, queue: &str) -> Result<QueueCounts, StorageError> {
        require_non_empty("queue", queue)?;
        let jobs = self.jobs(Filter::Queue(queue.to_string())).await?;
        let fetched = jobs.iter().filter(|job| job.fetched_at.is_some()).count();
        Ok(QueueCounts {
            enqueued: jobs.len() - fetched,
            fetched,
        })
    }

    /// One page of job ids waiting on `queue`, in insertion order.
    pub async fn enqueued_job_ids(
        &self,
        queue: &str,
        from: usize,
        per_page: usize,
    ) -> Result<Vec<JobId>, StorageError> {
        self.page(queue, Filter::FetchedAt(None), from, per_page).await
    }

    /// One page of job ids leased from `queue`, in insertion order.
    pub async fn fetched_job_ids(
        &self,
        queue: &str,
        from: usize,
        per_page: usize,
    ) -> Result<Vec<JobId>, StorageError> {
        self.page(queue, Filter::not(Filter::FetchedAt(None)), from, per_page)
            .await
    }

    async fn page(
        &self,
        queue: &str,
        lease: Filter,
        from: usize,
        per_page: usize,
    ) -> Result<Vec<JobId>, StorageError> {
        require_non_empty("queue", queue)?;
        let jobs = self
            .jobs(Filter::and([Filter::Queue(queue.to_string()), lease]))
            .await?;
        Ok(jobs
            .into_iter()
            .skip(from)
            .take(per_page)
            .map(|job| job.id)
            .collect())
    }
}
