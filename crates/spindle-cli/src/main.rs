use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::{Duration, Instant, sleep};
use tracing::info;
use tracing_subscriber::EnvFilter;

use spindle_core::domain::{JobInvocation, State, state_names};
use spindle_core::store::InMemoryDocumentStore;
use spindle_core::{JobData, JobPerformer, JobStorage, StorageBuilder, StorageOptions, WorkerGroup};

const QUEUES: [&str; 2] = ["critical", "default"];

#[derive(Debug, Deserialize)]
struct HelloArgs {
    name: String,
}

/// Greets; fails the first `remaining_failures` jobs.
struct HelloPerformer {
    remaining_failures: AtomicU32,
}

impl HelloPerformer {
    fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
        }
    }
}

#[async_trait]
impl JobPerformer for HelloPerformer {
    async fn perform(&self, job: &JobData) -> Result<(), String> {
        let arg = job
            .invocation
            .arguments
            .first()
            .cloned()
            .ok_or_else(|| "missing argument".to_string())?;
        let args: HelloArgs = serde_json::from_value(arg).map_err(|e| format!("json decode: {e}"))?;

        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(format!("intentional failure (left={left})"));
        }

        println!("Hello, {}! (job {})", args.name, job.id);
        Ok(())
    }
}

/// Create a job and put it on `queue`, in one transaction.
async fn enqueue(storage: &JobStorage, queue: &str, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let invocation = JobInvocation::new("Greeter", "Hello")
        .with_argument("HelloArgs", serde_json::json!({ "name": name }));

    let mut tx = storage.transaction();
    let id = tx.create_expired_job(
        &invocation,
        &BTreeMap::new(),
        storage.clock().now(),
        Duration::from_secs(3600),
    )?;
    tx.set_job_state(id, &State::new(state_names::ENQUEUED));
    tx.add_to_queue(queue, id)?;
    tx.commit().await?;
    info!(%id, queue, "enqueued");
    Ok(())
}

async fn print_counts(storage: &JobStorage) -> Result<(), Box<dyn std::error::Error>> {
    let monitor = storage.monitor();
    for queue in QUEUES {
        println!("{queue}: {:?}", monitor.counts(queue).await?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // (A) ストレージを用意
    let storage = StorageBuilder::new(Arc::new(InMemoryDocumentStore::new()))
        .options(
            StorageOptions::default()
                .with_invisibility_timeout(Duration::from_secs(30 * 60))
                .with_queue_poll_interval(Duration::from_secs(1)),
        )
        .build()
        .await?;

    // (B) ジョブ投入（critical が先に処理される）
    for (queue, name) in [
        ("default", "alice"),
        ("default", "bob"),
        ("critical", "carol"),
        ("critical", "dave"),
    ] {
        enqueue(&storage, queue, name).await?;
    }
    print_counts(&storage).await?;

    // (C) worker を起動
    let workers = WorkerGroup::spawn(
        2,
        storage.clone(),
        QUEUES.iter().map(|q| q.to_string()).collect(),
        Arc::new(HelloPerformer::new(1)),
    );

    // (D) キューが空になるまでポーリング
    let deadline = Instant::now() + Duration::from_secs(10);
    while !storage.monitor().queues().await?.is_empty() && Instant::now() < deadline {
        sleep(Duration::from_millis(50)).await;
    }

    // (E) graceful shutdown
    workers.shutdown_and_join().await;

    let reader = storage.reader();
    print_counts(&storage).await?;
    println!(
        "succeeded={} failed={}",
        reader.get_counter("stats:succeeded").await?,
        reader.get_counter("stats:failed").await?
    );
    Ok(())
}
