//! spindle-core
//!
//! Persistence and queueing core for a background-job system: jobs, their state
//! history and parameters, named queues, and the counter/set/list/hash side data,
//! all kept as documents in one shared store.
//!
//! # モジュール構成
//! - **domain**: ドキュメントモデル（ids, state, invocation, document）
//! - **ports**: 抽象化レイヤー（DocumentStore, WakeSignal, Clock, IdGenerator）
//! - **store**: フィルタ・更新・書き込みモデルとインメモリ実装
//! - **signal**: キューの起床通知（プロセス内 / Notification フィード）
//! - **fetch**: ジョブの取得とリース（JobFetcher, FetchedJob）
//! - **transaction**: 書き込みのバッチ化（WriteTransaction）
//! - **reader / observability**: 読み取りとキュー監視
//! - **app**: 構築（StorageBuilder）とワーカー（WorkerGroup）
//!
//! # 使用例
//! ```ignore
//! let storage = StorageBuilder::new(Arc::new(InMemoryDocumentStore::new())).build().await?;
//!
//! let mut tx = storage.transaction();
//! let id = tx.create_expired_job(&invocation, &parameters, Utc::now(), Duration::from_secs(3600))?;
//! tx.set_job_state(id, &State::new(state_names::ENQUEUED));
//! tx.add_to_queue("default", id)?;
//! tx.commit().await?;
//!
//! let mut lease = storage.fetcher().fetch_next_job(&["critical", "default"], &cancel).await?;
//! lease.acknowledge().await?;
//! ```

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod observability;
pub mod ports;
pub mod reader;
pub mod signal;
pub mod store;
pub mod transaction;

#[cfg(test)]
mod test_support;

pub use app::{BuildError, JobPerformer, JobStorage, StorageBuilder, WorkerGroup};
pub use config::{StorageOptions, WakeStrategy};
pub use error::{ErrorKind, StorageError};
pub use fetch::{FetchedJob, JobFetcher};
pub use observability::{QueueCounts, QueueMonitor};
pub use reader::{JobData, StorageReader};
pub use transaction::WriteTransaction;
