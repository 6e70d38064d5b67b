//! Ports - 抽象化レイヤー
//!
//! 各 trait は外部の仕組み（ドキュメントストア、時刻、ID 生成、起床通知）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - JobGraph コレクションが唯一の共有ミュータブル資源（source of truth）
//! - 書き込みはすべて WriteTransaction の bulk write を通る
//! - claim はすべて JobFetcher の単一条件付き更新を通る

pub mod clock;
pub mod document_store;
pub mod id_generator;
pub mod wake_signal;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::document_store::DocumentStore;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::wake_signal::{WaitOutcome, WakeSignal};
