//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース、単調増加（同一ミリ秒内でも順序が保たれる）

use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use ulid::{Generator, Ulid};

use crate::domain::ids::{EntryId, JobId};
use crate::ports::Clock;

/// IdGenerator は分散システムで使える ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数ワーカーから使える）
pub trait IdGenerator: Send + Sync {
    fn generate_job_id(&self) -> JobId;

    fn generate_entry_id(&self) -> EntryId;
}

/// ULID generator driven by a [`Clock`].
///
/// IDs produced by one generator are strictly increasing, which the list ordering
/// (newest first) relies on.
pub struct UlidGenerator {
    clock: Arc<dyn Clock>,
    generator: Mutex<Generator>,
}

impl UlidGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            generator: Mutex::new(Generator::new()),
        }
    }

    fn next_ulid(&self) -> Ulid {
        let now: SystemTime = self.clock.now().into();
        let mut generator = self.generator.lock().unwrap_or_else(|e| e.into_inner());
        // Overflow of the random part within one millisecond: fall back to a fresh ULID.
        generator
            .generate_from_datetime(now)
            .unwrap_or_else(|_| Ulid::from_datetime(now))
    }
}

impl IdGenerator for UlidGenerator {
    fn generate_job_id(&self) -> JobId {
        JobId::from(self.next_ulid())
    }

    fn generate_entry_id(&self) -> EntryId {
        EntryId::from(self.next_ulid())
    }
}
