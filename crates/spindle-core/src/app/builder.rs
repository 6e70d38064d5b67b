//! StorageBuilder - ストレージの構築とワイヤリング
//!
//! # 設計
//! - Builder パターン（ストアだけ必須、他は既定値あり）
//! - 起動時検証（Fail-fast）：不正な設定や tailing に必要なランタイム不在は build() で弾く
//! - 組み上がった JobStorage は Clone 可能な共有ハンドル

use std::sync::Arc;

use tracing::info;

use crate::config::{StorageOptions, WakeStrategy};
use crate::error::StorageError;
use crate::fetch::JobFetcher;
use crate::observability::QueueMonitor;
use crate::ports::{Clock, DocumentStore, IdGenerator, SystemClock, UlidGenerator, WakeSignal};
use crate::reader::StorageReader;
use crate::signal::{LocalWakeSignal, TailingWakeSignal};
use crate::transaction::WriteTransaction;

/// StorageBuilder は JobStorage を構築
///
/// # 使用例
/// ```ignore
/// let storage = StorageBuilder::new(Arc::new(InMemoryDocumentStore::new()))
///     .options(StorageOptions::default().with_invisibility_timeout(Duration::from_secs(1800)))
///     .build()
///     .await?;
/// ```
pub struct StorageBuilder {
    store: Arc<dyn DocumentStore>,
    options: StorageOptions,
    clock: Option<Arc<dyn Clock>>,
    id_generator: Option<Arc<dyn IdGenerator>>,
    wake_signal: Option<Arc<dyn WakeSignal>>,
}

/// BuildError はストレージ構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid storage options: {0}")]
    InvalidOptions(#[source] StorageError),

    #[error("notification tailing needs a running tokio runtime")]
    NoRuntime,

    #[error("failed to start the notification tailer: {0}")]
    Tailer(#[source] StorageError),
}

impl StorageBuilder {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            options: StorageOptions::default(),
            clock: None,
            id_generator: None,
            wake_signal: None,
        }
    }

    pub fn options(mut self, options: StorageOptions) -> Self {
        self.options = options;
        self
    }

    /// Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Defaults to a [`UlidGenerator`] on the configured clock.
    pub fn id_generator(mut self, id_generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = Some(id_generator);
        self
    }

    /// Use this signal instead of the one `wake_strategy` selects.
    pub fn wake_signal(mut self, signal: Arc<dyn WakeSignal>) -> Self {
        self.wake_signal = Some(signal);
        self
    }

    /// # 検証
    /// - StorageOptions::validate()
    /// - TailNotifications なら tokio ランタイム上で呼ばれていること
    pub async fn build(self) -> Result<JobStorage, BuildError> {
        self.options.validate().map_err(BuildError::InvalidOptions)?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let id_generator = self
            .id_generator
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));

        let signal: Arc<dyn WakeSignal> = match (self.wake_signal, self.options.wake_strategy) {
            (Some(signal), _) => signal,
            (None, WakeStrategy::Local) => Arc::new(LocalWakeSignal::new()),
            (None, WakeStrategy::TailNotifications) => {
                if tokio::runtime::Handle::try_current().is_err() {
                    return Err(BuildError::NoRuntime);
                }
                let tailing = TailingWakeSignal::start(
                    Arc::clone(&self.store),
                    Arc::clone(&clock),
                    self.options.notification_poll_interval,
                )
                .await
                .map_err(BuildError::Tailer)?;
                Arc::new(tailing)
            }
        };

        info!(
            wake_strategy = ?self.options.wake_strategy,
            invisibility_timeout = ?self.options.invisibility_timeout,
            "job storage ready"
        );

        Ok(JobStorage {
            store: self.store,
            signal,
            clock,
            id_generator,
            options: Arc::new(self.options),
        })
    }
}

/// Shared handle to the job graph. Cheap to clone.
#[derive(Clone)]
pub struct JobStorage {
    store: Arc<dyn DocumentStore>,
    signal: Arc<dyn WakeSignal>,
    clock: Arc<dyn Clock>,
    id_generator: Arc<dyn IdGenerator>,
    options: Arc<StorageOptions>,
}

impl JobStorage {
    /// Start a new write batch.
    pub fn transaction(&self) -> WriteTransaction {
        WriteTransaction::new(
            Arc::clone(&self.store),
            Arc::clone(&self.signal),
            Arc::clone(&self.clock),
            Arc::clone(&self.id_generator),
        )
    }

    pub fn fetcher(&self) -> JobFetcher {
        JobFetcher::new(self.clone())
    }

    pub fn reader(&self) -> StorageReader {
        StorageReader::new(Arc::clone(&self.store))
    }

    pub fn monitor(&self) -> QueueMonitor {
        QueueMonitor::new(Arc::clone(&self.store))
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn signal(&self) -> &Arc<dyn WakeSignal> {
        &self.signal
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn options(&self) -> &StorageOptions {
        &self.options
    }
}
