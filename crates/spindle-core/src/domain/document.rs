//! The job graph: one polymorphic collection of tagged documents.
//!
//! # 設計
//! - すべてのエンティティは 1 つの名前空間（JobGraph）に置かれる
//! - `_t` タグで種類を判別する（サブクラスではなく sum type）
//! - Notification は別コレクション（追記のみのフィード）

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{EntryId, JobId};
use super::state::StateEntry;

/// Entity-kind discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    Job,
    Counter,
    SetMember,
    ListEntry,
    Hash,
}

/// Document identity across all kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentId {
    Job(JobId),
    Entry(EntryId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDocument {
    pub id: JobId,
    /// Serialized `InvocationData` (opaque to the core).
    pub invocation_data: String,
    /// Serialized argument list, kept beside the payload for querying.
    pub arguments: String,
    pub parameters: BTreeMap<String, Option<String>>,
    pub created_at: DateTime<Utc>,
    pub expire_at: Option<DateTime<Utc>>,
    pub state_name: Option<String>,
    pub state_history: Vec<StateEntry>,
    /// `None` when the job is not enqueued.
    pub queue: Option<String>,
    /// `Some` while a worker holds a lease on the job.
    pub fetched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterDocument {
    pub id: EntryId,
    pub key: String,
    pub value: i64,
    pub expire_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetMemberDocument {
    pub id: EntryId,
    /// Derived uniqueness key, see [`SetMemberDocument::member_key`].
    pub key: String,
    /// The owning set's key.
    pub set_type: String,
    pub value: String,
    pub score: f64,
    pub expire_at: Option<DateTime<Utc>>,
}

impl SetMemberDocument {
    /// At most one document exists per `(set key, value)`; this is the key that enforces it.
    pub fn member_key(set_key: &str, value: &str) -> String {
        format!("{set_key}<{value}>")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListEntryDocument {
    /// Time-ordered; newest entries have the greatest id.
    pub id: EntryId,
    /// The owning list's key.
    pub item: String,
    pub value: String,
    pub expire_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashDocument {
    pub id: EntryId,
    pub key: String,
    pub fields: BTreeMap<String, String>,
    pub expire_at: Option<DateTime<Utc>>,
}

/// One document of the job graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_t")]
pub enum Document {
    Job(JobDocument),
    Counter(CounterDocument),
    SetMember(SetMemberDocument),
    ListEntry(ListEntryDocument),
    Hash(HashDocument),
}

impl Document {
    pub fn kind(&self) -> DocumentKind {
        match self {
            Document::Job(_) => DocumentKind::Job,
            Document::Counter(_) => DocumentKind::Counter,
            Document::SetMember(_) => DocumentKind::SetMember,
            Document::ListEntry(_) => DocumentKind::ListEntry,
            Document::Hash(_) => DocumentKind::Hash,
        }
    }

    pub fn id(&self) -> DocumentId {
        match self {
            Document::Job(d) => DocumentId::Job(d.id),
            Document::Counter(d) => DocumentId::Entry(d.id),
            Document::SetMember(d) => DocumentId::Entry(d.id),
            Document::ListEntry(d) => DocumentId::Entry(d.id),
            Document::Hash(d) => DocumentId::Entry(d.id),
        }
    }

    /// The `Key` field: counter and hash keys, the derived set-member key.
    /// Jobs and list entries have none.
    pub fn key(&self) -> Option<&str> {
        match self {
            Document::Counter(d) => Some(&d.key),
            Document::SetMember(d) => Some(&d.key),
            Document::Hash(d) => Some(&d.key),
            Document::Job(_) | Document::ListEntry(_) => None,
        }
    }

    pub fn expire_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Document::Job(d) => d.expire_at,
            Document::Counter(d) => d.expire_at,
            Document::SetMember(d) => d.expire_at,
            Document::ListEntry(d) => d.expire_at,
            Document::Hash(d) => d.expire_at,
        }
    }

    pub fn set_expire_at(&mut self, expire_at: Option<DateTime<Utc>>) {
        match self {
            Document::Job(d) => d.expire_at = expire_at,
            Document::Counter(d) => d.expire_at = expire_at,
            Document::SetMember(d) => d.expire_at = expire_at,
            Document::ListEntry(d) => d.expire_at = expire_at,
            Document::Hash(d) => d.expire_at = expire_at,
        }
    }

    pub fn as_job(&self) -> Option<&JobDocument> {
        match self {
            Document::Job(job) => Some(job),
            _ => None,
        }
    }

    pub fn into_job(self) -> Option<JobDocument> {
        match self {
            Document::Job(job) => Some(job),
            _ => None,
        }
    }
}

/// Position of a notification in the append-only feed. Assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FeedPosition(pub u64);

/// "Work may be available on `queue`". Ephemeral, only ever tailed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub queue: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn job_enqueued(queue: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            queue: queue.into(),
            created_at,
        }
    }
}
