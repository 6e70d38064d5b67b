//! Shared fixtures for the unit tests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::app::{JobStorage, StorageBuilder};
use crate::config::StorageOptions;
use crate::domain::{Document, JobDocument, JobId, JobInvocation, State, state_names};
use crate::error::StorageError;
use crate::fetch::FetchedJob;
use crate::ports::{Clock, DocumentStore, WaitOutcome, WakeSignal};
use crate::signal::LocalWakeSignal;
use crate::store::{Filter, InMemoryDocumentStore};

pub(crate) fn queues(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Local signal that counts `wait_non_blocking` calls.
#[derive(Default)]
pub(crate) struct RecordingSignal {
    inner: LocalWakeSignal,
    non_blocking_calls: AtomicUsize,
}

impl RecordingSignal {
    pub(crate) fn inner(&self) -> &LocalWakeSignal {
        &self.inner
    }

    pub(crate) fn non_blocking_calls(&self) -> usize {
        self.non_blocking_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WakeSignal for RecordingSignal {
    async fn wait_any(
        &self,
        queues: &[String],
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Result<WaitOutcome, StorageError> {
        self.inner.wait_any(queues, cancel, timeout).await
    }

    fn wait_non_blocking(&self, queue: &str) -> bool {
        self.non_blocking_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.wait_non_blocking(queue)
    }

    async fn signal(&self, queues: &[String]) -> Result<(), StorageError> {
        self.inner.signal(queues).await
    }
}

pub(crate) struct Harness {
    pub storage: JobStorage,
    pub store: InMemoryDocumentStore,
    pub signal: Arc<RecordingSignal>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_options(StorageOptions::default()).await
    }

    pub async fn with_options(options: StorageOptions) -> Self {
        Self::build(StorageBuilder::new, options).await
    }

    /// Storage whose claims and writes are stamped by `clock`.
    pub async fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::build(
            |store| StorageBuilder::new(store).clock(clock),
            StorageOptions::default(),
        )
        .await
    }

    async fn build(
        builder: impl FnOnce(Arc<dyn DocumentStore>) -> StorageBuilder,
        options: StorageOptions,
    ) -> Self {
        let store = InMemoryDocumentStore::new();
        let signal = Arc::new(RecordingSignal::default());
        let handle: Arc<dyn DocumentStore> = Arc::new(store.clone());
        let storage = builder(handle)
            .options(options)
            .wake_signal(signal.clone())
            .build()
            .await
            .unwrap();
        Self {
            storage,
            store,
            signal,
        }
    }

    /// Create an enqueued job on `queue`.
    pub async fn enqueue(&self, queue: &str) -> JobId {
        self.enqueue_invocation(queue, JobInvocation::new("Mailer", "Send"))
            .await
    }

    pub async fn enqueue_with_argument(&self, queue: &str, argument: &str) -> JobId {
        let invocation = JobInvocation::new("Mailer", "Send").with_argument("String", argument.into());
        self.enqueue_invocation(queue, invocation).await
    }

    async fn enqueue_invocation(&self, queue: &str, invocation: JobInvocation) -> JobId {
        let mut tx = self.storage.transaction();
        let id = tx
            .create_expired_job(&invocation, &BTreeMap::new(), Utc::now(), Duration::from_secs(3600))
            .unwrap();
        tx.set_job_state(id, &State::new(state_names::ENQUEUED));
        tx.add_to_queue(queue, id).unwrap();
        tx.commit().await.unwrap();
        id
    }

    pub async fn fetch(&self, queues: &[&str]) -> FetchedJob {
        tokio::time::timeout(
            Duration::from_secs(5),
            self.storage
                .fetcher()
                .fetch_next_job(queues, &CancellationToken::new()),
        )
        .await
        .unwrap()
        .unwrap()
    }

    pub async fn job(&self, id: JobId) -> JobDocument {
        self.store
            .find(&Filter::job(id))
            .await
            .unwrap()
            .into_iter()
            .find_map(Document::into_job)
            .unwrap()
    }
}
