//! App - アプリケーション層
//!
//! ports と store/signal/fetch/transaction を組み合わせて使える形にする。
//!
//! # 主要コンポーネント
//! - **StorageBuilder / JobStorage**: 構築とワイヤリング、共有ハンドル
//! - **WorkerGroup**: フェッチと実行のループ

pub mod builder;
pub mod worker;

pub use self::builder::{BuildError, JobStorage, StorageBuilder};
pub use self::worker::{JobPerformer, WorkerGroup};
