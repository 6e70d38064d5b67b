//! End-to-end behaviour through the public API: enqueue, fetch, settle, side data.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rstest::rstest;
use tokio_util::sync::CancellationToken;

use spindle_core::domain::{Document, JobDocument, JobId, JobInvocation, State, state_names};
use spindle_core::ports::DocumentStore;
use spindle_core::store::{Filter, InMemoryDocumentStore, Update, WriteModel};
use spindle_core::{ErrorKind, JobStorage, StorageBuilder, StorageOptions};

async fn storage(options: StorageOptions) -> (JobStorage, InMemoryDocumentStore) {
    let store = InMemoryDocumentStore::new();
    let storage = StorageBuilder::new(Arc::new(store.clone()))
        .options(options)
        .build()
        .await
        .unwrap();
    (storage, store)
}

async fn enqueue(storage: &JobStorage, queue: &str) -> JobId {
    let mut tx = storage.transaction();
    let id = tx
        .create_expired_job(
            &JobInvocation::new("Reports", "Generate"),
            &BTreeMap::new(),
            Utc::now(),
            Duration::from_secs(3600),
        )
        .unwrap();
    tx.set_job_state(id, &State::new(state_names::ENQUEUED));
    tx.add_to_queue(queue, id).unwrap();
    tx.commit().await.unwrap();
    id
}

async fn job(store: &InMemoryDocumentStore, id: JobId) -> JobDocument {
    store
        .find(&Filter::job(id))
        .await
        .unwrap()
        .into_iter()
        .find_map(Document::into_job)
        .unwrap()
}

fn cancel_after(delay: Duration) -> CancellationToken {
    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        canceller.cancel();
    });
    cancel
}

#[tokio::test]
async fn a_fetched_job_is_leased_exactly_once() {
    let (storage, store) = storage(StorageOptions::default()).await;
    let id = enqueue(&storage, "default").await;
    let fetcher = storage.fetcher();

    let lease = fetcher
        .fetch_next_job(&["default"], &CancellationToken::new())
        .await
        .unwrap();
    let second = fetcher
        .fetch_next_job(&["default"], &cancel_after(Duration::from_millis(100)))
        .await;

    assert_eq!(lease.job_id(), id);
    assert_eq!(job(&store, id).await.fetched_at, Some(lease.fetched_at()));
    assert_eq!(second.unwrap_err().kind(), ErrorKind::Cancelled);
}

#[tokio::test]
async fn critical_work_is_fetched_before_default_work() {
    let (storage, _) = storage(StorageOptions::default()).await;
    let default_job = enqueue(&storage, "default").await;
    let critical_job = enqueue(&storage, "critical").await;
    let fetcher = storage.fetcher();
    let cancel = CancellationToken::new();

    let first = fetcher.fetch_next_job(&["critical", "default"], &cancel).await.unwrap();
    let second = fetcher.fetch_next_job(&["critical", "default"], &cancel).await.unwrap();

    assert_eq!(first.job_id(), critical_job);
    assert_eq!(second.job_id(), default_job);
}

#[tokio::test]
async fn an_abandoned_lease_is_reclaimed_after_the_invisibility_timeout() {
    let options = StorageOptions::default().with_invisibility_timeout(Duration::from_secs(60));
    let (storage, store) = storage(options).await;
    let id = enqueue(&storage, "default").await;
    store
        .bulk_write(&[WriteModel::update_one(
            Filter::job(id),
            [Update::SetFetchedAt(Some(Utc::now() - chrono::Duration::minutes(5)))],
        )])
        .await
        .unwrap();

    let lease = storage
        .fetcher()
        .fetch_next_job(&["default"], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(lease.job_id(), id);
}

#[tokio::test]
async fn without_an_invisibility_timeout_a_lease_is_held_until_released() {
    let options = StorageOptions::default().with_queue_poll_interval(Duration::from_millis(20));
    let (storage, _) = storage(options).await;
    let id = enqueue(&storage, "default").await;
    let fetcher = storage.fetcher();
    let mut lease = fetcher
        .fetch_next_job(&["default"], &CancellationToken::new())
        .await
        .unwrap();

    let blocked = fetcher
        .fetch_next_job(&["default"], &cancel_after(Duration::from_millis(100)))
        .await;
    assert!(blocked.unwrap_err().is_cancelled());

    lease.release().await.unwrap();
    let again = fetcher
        .fetch_next_job(&["default"], &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(again.job_id(), id);
}

#[tokio::test]
async fn a_dropped_lease_goes_back_to_its_queue() {
    let (storage, store) = storage(StorageOptions::default()).await;
    let id = enqueue(&storage, "default").await;
    let fetcher = storage.fetcher();

    {
        let _lease = fetcher
            .fetch_next_job(&["default"], &CancellationToken::new())
            .await
            .unwrap();
    }
    let again = tokio::time::timeout(
        Duration::from_secs(5),
        fetcher.fetch_next_job(&["default"], &CancellationToken::new()),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(again.job_id(), id);
    assert_eq!(job(&store, id).await.queue.as_deref(), Some("default"));
}

#[tokio::test]
async fn acknowledged_work_leaves_the_queue() {
    let (storage, store) = storage(StorageOptions::default()).await;
    let id = enqueue(&storage, "default").await;
    let mut lease = storage
        .fetcher()
        .fetch_next_job(&["default"], &CancellationToken::new())
        .await
        .unwrap();
    let mut tx = storage.transaction();
    tx.set_job_state(id, &State::new(state_names::SUCCEEDED));
    tx.commit().await.unwrap();

    lease.acknowledge().await.unwrap();
    lease.finish().await.unwrap();

    let job = job(&store, id).await;
    assert_eq!((job.queue, job.fetched_at), (None, None));
}

#[tokio::test]
async fn state_written_is_state_read() {
    let (storage, _) = storage(StorageOptions::default()).await;
    let id = enqueue(&storage, "default").await;
    let state = State::new(state_names::FAILED)
        .with_reason("timeout")
        .with_data("RetryCount", "3");

    let mut tx = storage.transaction();
    tx.set_job_state(id, &state);
    tx.commit().await.unwrap();

    let reader = storage.reader();
    let data = reader.get_job_data(id).await.unwrap().unwrap();
    let latest = reader.get_state_data(id).await.unwrap().unwrap();
    assert_eq!(data.state_name.as_deref(), Some("Failed"));
    assert_eq!((latest.name, latest.reason, latest.data), (state.name, state.reason, state.data));
}

#[rstest]
#[case(1)]
#[case(10)]
#[case(100)]
#[tokio::test]
async fn n_increments_add_n(#[case] n: i64) {
    let (storage, _) = storage(StorageOptions::default()).await;
    let before = storage.reader().get_counter("stats:processed").await.unwrap();

    let mut tx = storage.transaction();
    for _ in 0..n {
        tx.increment_counter("stats:processed").unwrap();
    }
    tx.commit().await.unwrap();

    let after = storage.reader().get_counter("stats:processed").await.unwrap();
    assert_eq!(after - before, n);
}

#[rstest]
#[case(10, 0, 4, 5)]
#[case(10, 2, 4, 3)]
#[case(3, 0, 9, 3)]
#[case(3, 5, 9, 0)]
#[tokio::test]
async fn trimmed_list_keeps_the_requested_window(
    #[case] n: usize,
    #[case] start: usize,
    #[case] end: usize,
    #[case] kept: usize,
) {
    let (storage, _) = storage(StorageOptions::default()).await;
    let mut tx = storage.transaction();
    for i in 0..n {
        tx.insert_to_list("succeeded", &format!("job-{i}")).unwrap();
    }
    tx.commit().await.unwrap();

    let mut tx = storage.transaction();
    tx.trim_list("succeeded", start, end).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(storage.reader().get_list_count("succeeded").await.unwrap(), kept);
}

#[tokio::test]
async fn invalid_arguments_fail_before_any_side_effect() {
    let (storage, store) = storage(StorageOptions::default()).await;
    let id = enqueue(&storage, "default").await;
    let before = store.snapshot().await;

    let mut tx = storage.transaction();
    assert_eq!(tx.add_to_queue("", id).unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert_eq!(tx.set_job_parameter(id, "", Some("x")).unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert!(tx.is_empty());
    tx.commit().await.unwrap();

    let none: &[&str] = &[];
    let err = storage
        .fetcher()
        .fetch_next_job(none, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(store.snapshot().await, before);
}

#[tokio::test]
async fn a_cancelled_token_claims_nothing() {
    let (storage, store) = storage(StorageOptions::default()).await;
    let id = enqueue(&storage, "default").await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = storage.fetcher().fetch_next_job(&["default"], &cancel).await.unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(job(&store, id).await.fetched_at, None);
}
