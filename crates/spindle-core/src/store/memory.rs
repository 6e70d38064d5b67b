//! In-memory document store.
//!
//! A process-local [`DocumentStore`]: every call takes the state lock once, so the
//! claim is atomic and a bulk write applies its models back to back.
//!
//! The notification feed is capped like a capped collection: once it holds
//! `notification_capacity` entries the oldest are dropped. Positions keep counting, so a
//! tailer that fell behind the cap resumes at the oldest retained entry.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{BulkWriteResult, Filter, Update, WriteModel};
use crate::domain::{Document, FeedPosition, Notification};
use crate::error::StorageError;
use crate::ports::DocumentStore;

/// Notifications retained by [`InMemoryDocumentStore::new`].
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 1_000;

/// Store state.
struct InMemoryStoreState {
    /// The job graph, in insertion order.
    documents: Vec<Document>,

    /// Retained tail of the notification feed. Position `dropped + i + 1` is at index `i`.
    notifications: VecDeque<Notification>,
    dropped: u64,
    notification_capacity: usize,
}

impl InMemoryStoreState {
    fn new(notification_capacity: usize) -> Self {
        Self {
            documents: Vec::new(),
            notifications: VecDeque::new(),
            dropped: 0,
            notification_capacity: notification_capacity.max(1),
        }
    }

    fn insert(&mut self, doc: Document) -> Result<(), StorageError> {
        let id = doc.id();
        if self.documents.iter().any(|d| d.id() == id) {
            return Err(StorageError::DuplicateKey(format!("document id {id:?}")));
        }
        if let Document::SetMember(member) = &doc
            && self
                .documents
                .iter()
                .any(|d| matches!(d, Document::SetMember(m) if m.key == member.key))
        {
            return Err(StorageError::DuplicateKey(member.key.clone()));
        }
        self.documents.push(doc);
        Ok(())
    }

    /// Apply one model; returns the number of documents it affected.
    fn apply(
        &mut self,
        model: &WriteModel,
        result: &mut BulkWriteResult,
    ) -> Result<u64, StorageError> {
        match model {
            WriteModel::InsertOne(doc) => {
                self.insert(doc.clone())?;
                result.inserted += 1;
                Ok(1)
            }
            WriteModel::DeleteOne(filter) => {
                let Some(pos) = self.documents.iter().position(|d| filter.matches(d)) else {
                    return Ok(0);
                };
                self.documents.remove(pos);
                result.deleted += 1;
                Ok(1)
            }
            WriteModel::DeleteMany(filter) => {
                let before = self.documents.len();
                self.documents.retain(|d| !filter.matches(d));
                let deleted = (before - self.documents.len()) as u64;
                result.deleted += deleted;
                Ok(deleted)
            }
            WriteModel::UpdateOne {
                filter,
                update,
                upsert,
            } => {
                if let Some(doc) = self.documents.iter_mut().find(|d| filter.matches(d)) {
                    result.matched += 1;
                    if Update::apply_all(update, doc)? {
                        result.modified += 1;
                        return Ok(1);
                    }
                    return Ok(0);
                }
                let Some(shell) = upsert else {
                    return Ok(0);
                };
                let mut doc = shell.clone();
                Update::apply_all(update, &mut doc)?;
                self.insert(doc)?;
                result.upserted += 1;
                Ok(1)
            }
            WriteModel::UpdateMany { filter, update } => {
                let mut modified = 0;
                for doc in self.documents.iter_mut().filter(|d| filter.matches(d)) {
                    result.matched += 1;
                    if Update::apply_all(update, doc)? {
                        modified += 1;
                    }
                }
                result.modified += modified;
                Ok(modified)
            }
        }
    }

    fn push_notifications(&mut self, notifications: Vec<Notification>) {
        self.notifications.extend(notifications);
        let excess = self
            .notifications
            .len()
            .saturating_sub(self.notification_capacity);
        self.notifications.drain(..excess);
        self.dropped += excess as u64;
    }
}

/// In-memory [`DocumentStore`]. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct InMemoryDocumentStore {
    state: Arc<Mutex<InMemoryStoreState>>,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::with_notification_capacity(DEFAULT_NOTIFICATION_CAPACITY)
    }
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `capacity` notifications (at least one).
    pub fn with_notification_capacity(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(InMemoryStoreState::new(capacity))),
        }
    }

    /// Every document in the job graph (for tests and debugging).
    pub async fn snapshot(&self) -> Vec<Document> {
        self.state.lock().await.documents.clone()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn find(&self, filter: &Filter) -> Result<Vec<Document>, StorageError> {
        let state = self.state.lock().await;
        Ok(state
            .documents
            .iter()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect())
    }

    async fn find_one_and_update(
        &self,
        filter: &Filter,
        update: &[Update],
    ) -> Result<Option<Document>, StorageError> {
        let mut state = self.state.lock().await;
        let Some(doc) = state.documents.iter_mut().find(|d| filter.matches(d)) else {
            return Ok(None);
        };
        Update::apply_all(update, doc)?;
        Ok(Some(doc.clone()))
    }

    async fn bulk_write(&self, models: &[WriteModel]) -> Result<BulkWriteResult, StorageError> {
        let mut state = self.state.lock().await;
        let mut result = BulkWriteResult::default();
        for (index, model) in models.iter().enumerate() {
            let affected = state
                .apply(model, &mut result)
                .map_err(|source| StorageError::BulkWrite {
                    index,
                    applied: index,
                    source: Box::new(source),
                })?;
            result.affected.push(affected);
        }
        Ok(result)
    }

    async fn insert_notifications(
        &self,
        notifications: Vec<Notification>,
    ) -> Result<(), StorageError> {
        self.state.lock().await.push_notifications(notifications);
        Ok(())
    }

    async fn notifications_after(
        &self,
        after: Option<FeedPosition>,
        limit: usize,
    ) -> Result<Vec<(FeedPosition, Notification)>, StorageError> {
        let state = self.state.lock().await;
        let after = after.map_or(0, |FeedPosition(p)| p);
        let skip = usize::try_from(after.saturating_sub(state.dropped)).unwrap_or(usize::MAX);
        Ok(state
            .notifications
            .iter()
            .enumerate()
            .skip(skip)
            .take(limit)
            .map(|(i, n)| (FeedPosition(state.dropped + i as u64 + 1), n.clone()))
            .collect())
    }

    async fn latest_notification(&self) -> Result<Option<FeedPosition>, StorageError> {
        let state = self.state.lock().await;
        Ok(match state.dropped + state.notifications.len() as u64 {
            0 => None,
            n => Some(FeedPosition(n)),
        })
    }
}
