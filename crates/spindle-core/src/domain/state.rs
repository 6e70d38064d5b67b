//! State - ジョブの状態と履歴
//!
//! 状態名は実行エンジン側が決める文字列です。コアが意味を持つのは
//! `ENQUEUED` だけ（acknowledge が requeue に降格する条件）。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Well-known state names used by the execution engine.
pub mod names {
    pub const ENQUEUED: &str = "Enqueued";
    pub const PROCESSING: &str = "Processing";
    pub const SUCCEEDED: &str = "Succeeded";
    pub const FAILED: &str = "Failed";
    pub const SCHEDULED: &str = "Scheduled";
    pub const DELETED: &str = "Deleted";
}

/// A state transition requested by the execution engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub name: String,
    pub reason: Option<String>,
    /// Opaque serialized state data.
    pub data: BTreeMap<String, String>,
}

impl State {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: None,
            data: BTreeMap::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Is this the "enqueued" state? Compared case-insensitively.
    pub fn is_enqueued(&self) -> bool {
        is_enqueued_name(&self.name)
    }
}

/// One entry of a job's state history, stamped when the write was accumulated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    pub name: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub data: BTreeMap<String, String>,
}

impl StateEntry {
    pub fn from_state(state: &State, created_at: DateTime<Utc>) -> Self {
        Self {
            name: state.name.clone(),
            reason: state.reason.clone(),
            created_at,
            data: state.data.clone(),
        }
    }
}

pub(crate) fn is_enqueued_name(name: &str) -> bool {
    name.eq_ignore_ascii_case(names::ENQUEUED)
}
