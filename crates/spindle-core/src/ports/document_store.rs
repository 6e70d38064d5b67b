//! DocumentStore port - 共有ドキュメントストア
//!
//! ストアが保証すべきこと：
//! - `find_one_and_update` は単一のアトミック操作（claim の二重取得を防ぐ唯一の仕組み）
//! - `bulk_write` は順序付き。途中で失敗したら、それまでの操作は適用されたまま
//! - (set key, value) ごとに SetMember は高々 1 件
//! - Notification フィードは追記のみ、位置は単調増加

use async_trait::async_trait;

use crate::domain::{Document, FeedPosition, Notification};
use crate::error::StorageError;
use crate::store::{BulkWriteResult, Filter, Update, WriteModel};

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// All documents matching `filter`, in insertion order.
    async fn find(&self, filter: &Filter) -> Result<Vec<Document>, StorageError>;

    /// Atomically update the first document matching `filter` and return it as updated.
    /// `Ok(None)` when nothing matched.
    async fn find_one_and_update(
        &self,
        filter: &Filter,
        update: &[Update],
    ) -> Result<Option<Document>, StorageError>;

    /// Apply `models` in order. On failure at index `i`, models `0..i` stay applied and
    /// `StorageError::BulkWrite { index: i, .. }` is returned.
    async fn bulk_write(&self, models: &[WriteModel]) -> Result<BulkWriteResult, StorageError>;

    /// Append notifications to the feed, in order.
    async fn insert_notifications(
        &self,
        notifications: Vec<Notification>,
    ) -> Result<(), StorageError>;

    /// Notifications strictly after `after` (from the beginning when `None`), oldest first.
    async fn notifications_after(
        &self,
        after: Option<FeedPosition>,
        limit: usize,
    ) -> Result<Vec<(FeedPosition, Notification)>, StorageError>;

    /// Position of the newest notification, `None` for an empty feed.
    async fn latest_notification(&self) -> Result<Option<FeedPosition>, StorageError>;
}
