//! WriteTransaction - 書き込みのバッチ化
//!
//! # 設計
//! - 論理的な変更を `WriteModel` の順序付きリストとして貯める（commit まではストアに触れない）
//! - commit で 1 回の ordered bulk write として送る（順序は貯めた順そのまま）
//! - commit 後、新しい仕事が入ったキューごとに起床通知を 1 回出す
//!
//! リトライはしない。失敗は呼び出し側に返す。

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::domain::{
    CounterDocument, Document, EntryId, HashDocument, InvocationData, JobDocument, JobId,
    JobInvocation, ListEntryDocument, SetMemberDocument, State, StateEntry,
};
use crate::error::{StorageError, require_non_empty};
use crate::ports::{Clock, DocumentStore, IdGenerator, WakeSignal};
use crate::store::{BulkWriteResult, Filter, Update, WriteModel};

/// Accumulates writes against the job graph and commits them as one ordered bulk write.
pub struct WriteTransaction {
    store: Arc<dyn DocumentStore>,
    signal: Arc<dyn WakeSignal>,
    clock: Arc<dyn Clock>,
    id_gen: Arc<dyn IdGenerator>,

    models: Vec<WriteModel>,

    /// Queues that received new or returned work.
    jobs_added_to_queue: BTreeSet<String>,

    /// Queues to signal only if the model at the index modified a document.
    conditional_wakes: Vec<(usize, String)>,
}

impl WriteTransaction {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        signal: Arc<dyn WakeSignal>,
        clock: Arc<dyn Clock>,
        id_gen: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            store,
            signal,
            clock,
            id_gen,
            models: Vec::new(),
            jobs_added_to_queue: BTreeSet::new(),
            conditional_wakes: Vec::new(),
        }
    }

    /// Accumulated write models, in commit order.
    pub fn models(&self) -> &[WriteModel] {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    fn expire_at(&self, expire_in: Duration) -> Result<DateTime<Utc>, StorageError> {
        let delta = chrono::Duration::from_std(expire_in)
            .map_err(|_| StorageError::invalid_argument("expire_in", "out of range"))?;
        Ok(self.clock.now() + delta)
    }

    // ========================================
    // Jobs
    // ========================================

    /// Insert a new job that expires after `expire_in` unless persisted.
    pub fn create_expired_job(
        &mut self,
        job: &JobInvocation,
        parameters: &BTreeMap<String, String>,
        created_at: DateTime<Utc>,
        expire_in: Duration,
    ) -> Result<JobId, StorageError> {
        if parameters.keys().any(String::is_empty) {
            return Err(StorageError::invalid_argument(
                "parameters",
                "parameter names must not be empty",
            ));
        }
        let invocation_data = InvocationData::serialize(job)?;
        let delta = chrono::Duration::from_std(expire_in)
            .map_err(|_| StorageError::invalid_argument("expire_in", "out of range"))?;

        let id = self.id_gen.generate_job_id();
        let doc = JobDocument {
            id,
            invocation_data: invocation_data.to_json()?,
            arguments: invocation_data.arguments.clone(),
            parameters: parameters
                .iter()
                .map(|(k, v)| (k.clone(), Some(v.clone())))
                .collect(),
            created_at,
            expire_at: Some(created_at + delta),
            state_name: None,
            state_history: Vec::new(),
            queue: None,
            fetched_at: None,
        };
        self.models.push(WriteModel::InsertOne(Document::Job(doc)));
        Ok(id)
    }

    pub fn expire_job(&mut self, job_id: JobId, expire_in: Duration) -> Result<(), StorageError> {
        let at = self.expire_at(expire_in)?;
        self.models.push(WriteModel::update_one(
            Filter::job(job_id),
            [Update::SetExpireAt(Some(at))],
        ));
        Ok(())
    }

    pub fn persist_job(&mut self, job_id: JobId) {
        self.models.push(WriteModel::update_one(
            Filter::job(job_id),
            [Update::SetExpireAt(None)],
        ));
    }

    /// Move the job to `state` and append it to the history.
    pub fn set_job_state(&mut self, job_id: JobId, state: &State) {
        let entry = StateEntry::from_state(state, self.clock.now());
        self.models.push(WriteModel::update_one(
            Filter::job(job_id),
            [
                Update::SetStateName(state.name.clone()),
                Update::PushState(entry),
            ],
        ));
    }

    /// Append `state` to the history without changing the current state.
    pub fn add_job_state(&mut self, job_id: JobId, state: &State) {
        let entry = StateEntry::from_state(state, self.clock.now());
        self.models.push(WriteModel::update_one(
            Filter::job(job_id),
            [Update::PushState(entry)],
        ));
    }

    /// Set one parameter. `None` is stored as an explicit null.
    pub fn set_job_parameter(
        &mut self,
        job_id: JobId,
        name: &str,
        value: Option<&str>,
    ) -> Result<(), StorageError> {
        require_non_empty("name", name)?;
        self.models.push(WriteModel::update_one(
            Filter::job(job_id),
            [Update::SetParameter {
                name: name.to_string(),
                value: value.map(str::to_string),
            }],
        ));
        Ok(())
    }

    // ========================================
    // Queues
    // ========================================

    pub fn add_to_queue(&mut self, queue: &str, job_id: JobId) -> Result<(), StorageError> {
        require_non_empty("queue", queue)?;
        self.models.push(WriteModel::update_one(
            Filter::job(job_id),
            [Update::SetQueue(Some(queue.to_string()))],
        ));
        self.jobs_added_to_queue.insert(queue.to_string());
        Ok(())
    }

    /// Return a fetched job to `queue`, unconditionally.
    pub fn requeue(&mut self, job_id: JobId, queue: &str) -> Result<(), StorageError> {
        require_non_empty("queue", queue)?;
        self.models.push(WriteModel::update_one(
            Filter::job(job_id),
            [
                Update::SetFetchedAt(None),
                Update::SetQueue(Some(queue.to_string())),
            ],
        ));
        self.jobs_added_to_queue.insert(queue.to_string());
        Ok(())
    }

    /// Take a fetched job off its queue.
    ///
    /// Only clears the lease taken at `fetched_at` on `queue`, so a lease that was
    /// reclaimed by another worker is left alone. A job whose current state is
    /// "enqueued" is requeued instead. Both branches are guarded by mutually
    /// exclusive state filters inside the same ordered batch, so no read is needed.
    pub fn remove_from_queue(
        &mut self,
        job_id: JobId,
        fetched_at: DateTime<Utc>,
        queue: &str,
    ) -> Result<(), StorageError> {
        require_non_empty("queue", queue)?;
        self.models.push(WriteModel::update_one(
            Filter::and([
                Filter::job(job_id),
                Filter::FetchedAt(Some(fetched_at)),
                Filter::Queue(queue.to_string()),
                Filter::not(Filter::StateIsEnqueued),
            ]),
            [Update::SetFetchedAt(None), Update::SetQueue(None)],
        ));

        self.models.push(WriteModel::update_one(
            Filter::and([Filter::job(job_id), Filter::StateIsEnqueued]),
            [
                Update::SetFetchedAt(None),
                Update::SetQueue(Some(queue.to_string())),
            ],
        ));
        self.conditional_wakes
            .push((self.models.len() - 1, queue.to_string()));
        Ok(())
    }

    // ========================================
    // Counters
    // ========================================

    pub fn increment_counter(&mut self, key: &str) -> Result<(), StorageError> {
        self.set_counter(key, 1, None)
    }

    pub fn increment_counter_expiring(
        &mut self,
        key: &str,
        expire_in: Duration,
    ) -> Result<(), StorageError> {
        self.set_counter(key, 1, Some(expire_in))
    }

    pub fn decrement_counter(&mut self, key: &str) -> Result<(), StorageError> {
        self.set_counter(key, -1, None)
    }

    pub fn decrement_counter_expiring(
        &mut self,
        key: &str,
        expire_in: Duration,
    ) -> Result<(), StorageError> {
        self.set_counter(key, -1, Some(expire_in))
    }

    /// Delta write; the expiry is rewritten on every touch (cleared when `None`).
    fn set_counter(
        &mut self,
        key: &str,
        amount: i64,
        expire_in: Option<Duration>,
    ) -> Result<(), StorageError> {
        require_non_empty("key", key)?;
        let expire_at = expire_in.map(|d| self.expire_at(d)).transpose()?;
        let shell = Document::Counter(CounterDocument {
            id: self.id_gen.generate_entry_id(),
            key: key.to_string(),
            value: 0,
            expire_at: None,
        });
        self.models.push(WriteModel::upsert_one(
            Filter::counter(key),
            [Update::Increment(amount), Update::SetExpireAt(expire_at)],
            shell,
        ));
        Ok(())
    }

    // ========================================
    // Sets
    // ========================================

    pub fn add_to_set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.add_to_set_with_score(key, value, 0.0)
    }

    pub fn add_to_set_with_score(
        &mut self,
        key: &str,
        value: &str,
        score: f64,
    ) -> Result<(), StorageError> {
        self.add_range_to_set_with_score(key, &[value], score)
    }

    pub fn add_range_to_set<S: AsRef<str>>(
        &mut self,
        key: &str,
        items: &[S],
    ) -> Result<(), StorageError> {
        self.add_range_to_set_with_score(key, items, 0.0)
    }

    fn add_range_to_set_with_score<S: AsRef<str>>(
        &mut self,
        key: &str,
        items: &[S],
        score: f64,
    ) -> Result<(), StorageError> {
        require_non_empty("key", key)?;
        for item in items {
            let value = item.as_ref();
            let shell = Document::SetMember(SetMemberDocument {
                id: self.id_gen.generate_entry_id(),
                key: SetMemberDocument::member_key(key, value),
                set_type: key.to_string(),
                value: value.to_string(),
                score: 0.0,
                expire_at: None,
            });
            self.models.push(WriteModel::upsert_one(
                Filter::set_member(key, value),
                [Update::SetScore(score)],
                shell,
            ));
        }
        Ok(())
    }

    pub fn remove_from_set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        require_non_empty("key", key)?;
        self.models
            .push(WriteModel::DeleteOne(Filter::set_member(key, value)));
        Ok(())
    }

    pub fn remove_set(&mut self, key: &str) -> Result<(), StorageError> {
        require_non_empty("key", key)?;
        self.models.push(WriteModel::DeleteMany(Filter::set(key)));
        Ok(())
    }

    pub fn expire_set(&mut self, key: &str, expire_in: Duration) -> Result<(), StorageError> {
        require_non_empty("key", key)?;
        let at = self.expire_at(expire_in)?;
        self.models.push(WriteModel::update_many(
            Filter::set(key),
            [Update::SetExpireAt(Some(at))],
        ));
        Ok(())
    }

    pub fn persist_set(&mut self, key: &str) -> Result<(), StorageError> {
        require_non_empty("key", key)?;
        self.models.push(WriteModel::update_many(
            Filter::set(key),
            [Update::SetExpireAt(None)],
        ));
        Ok(())
    }

    // ========================================
    // Lists
    // ========================================

    pub fn insert_to_list(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        require_non_empty("key", key)?;
        self.models
            .push(WriteModel::InsertOne(Document::ListEntry(ListEntryDocument {
                id: self.id_gen.generate_entry_id(),
                item: key.to_string(),
                value: value.to_string(),
                expire_at: None,
            })));
        Ok(())
    }

    /// Remove every entry of list `key` equal to `value`.
    pub fn remove_from_list(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        require_non_empty("key", key)?;
        self.models.push(WriteModel::DeleteMany(Filter::and([
            Filter::list(key),
            Filter::ListValue(value.to_string()),
        ])));
        Ok(())
    }

    /// Keep only entries ranked `keep_starting_from..=keep_ending_at` (0-based, newest
    /// first) in list `key`.
    ///
    /// Ranks cover the stored entries plus the ones inserted earlier in this transaction.
    pub async fn trim_list(
        &mut self,
        key: &str,
        keep_starting_from: usize,
        keep_ending_at: usize,
    ) -> Result<(), StorageError> {
        require_non_empty("key", key)?;

        let mut ids: Vec<EntryId> = self
            .store
            .find(&Filter::list(key))
            .await?
            .into_iter()
            .filter_map(|doc| match doc {
                Document::ListEntry(entry) => Some(entry.id),
                _ => None,
            })
            .collect();
        ids.extend(self.models.iter().filter_map(|model| match model {
            WriteModel::InsertOne(Document::ListEntry(entry)) if entry.item == key => {
                Some(entry.id)
            }
            _ => None,
        }));
        ids.sort_unstable_by(|a, b| b.cmp(a));

        let keep = keep_starting_from..=keep_ending_at;
        let to_trim: Vec<EntryId> = ids
            .into_iter()
            .enumerate()
            .filter(|(rank, _)| !keep.contains(rank))
            .map(|(_, id)| id)
            .collect();
        if to_trim.is_empty() {
            return Ok(());
        }

        self.models.push(WriteModel::DeleteMany(Filter::and([
            Filter::list(key),
            Filter::EntryIdIn(to_trim),
        ])));
        Ok(())
    }

    pub fn expire_list(&mut self, key: &str, expire_in: Duration) -> Result<(), StorageError> {
        require_non_empty("key", key)?;
        let at = self.expire_at(expire_in)?;
        self.models.push(WriteModel::update_many(
            Filter::list(key),
            [Update::SetExpireAt(Some(at))],
        ));
        Ok(())
    }

    pub fn persist_list(&mut self, key: &str) -> Result<(), StorageError> {
        require_non_empty("key", key)?;
        self.models.push(WriteModel::update_many(
            Filter::list(key),
            [Update::SetExpireAt(None)],
        ));
        Ok(())
    }

    // ========================================
    // Hashes
    // ========================================

    /// Merge `pairs` into hash `key`, creating it when missing.
    pub fn set_range_in_hash<K, V>(
        &mut self,
        key: &str,
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Result<(), StorageError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        require_non_empty("key", key)?;
        let fields: BTreeMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let shell = Document::Hash(HashDocument {
            id: self.id_gen.generate_entry_id(),
            key: key.to_string(),
            fields: BTreeMap::new(),
            expire_at: None,
        });
        self.models.push(WriteModel::upsert_one(
            Filter::hash(key),
            [Update::MergeFields(fields)],
            shell,
        ));
        Ok(())
    }

    pub fn remove_hash(&mut self, key: &str) -> Result<(), StorageError> {
        require_non_empty("key", key)?;
        self.models.push(WriteModel::DeleteOne(Filter::hash(key)));
        Ok(())
    }

    pub fn expire_hash(&mut self, key: &str, expire_in: Duration) -> Result<(), StorageError> {
        require_non_empty("key", key)?;
        let at = self.expire_at(expire_in)?;
        self.models.push(WriteModel::update_one(
            Filter::hash(key),
            [Update::SetExpireAt(Some(at))],
        ));
        Ok(())
    }

    pub fn persist_hash(&mut self, key: &str) -> Result<(), StorageError> {
        require_non_empty("key", key)?;
        self.models.push(WriteModel::update_one(
            Filter::hash(key),
            [Update::SetExpireAt(None)],
        ));
        Ok(())
    }

    // ========================================
    // Commit
    // ========================================

    /// Submit everything as one ordered bulk write, then wake the queues that got work.
    ///
    /// An empty transaction does not touch the store.
    pub async fn commit(self) -> Result<BulkWriteResult, StorageError> {
        if self.models.is_empty() {
            trace!("empty transaction, nothing to commit");
            return Ok(BulkWriteResult::default());
        }

        for (index, model) in self.models.iter().enumerate() {
            trace!(index, model_type = model.model_type(), ?model, "bulk write");
        }

        let result = self.store.bulk_write(&self.models).await?;

        let mut queues = self.jobs_added_to_queue;
        for (index, queue) in self.conditional_wakes {
            if result.affected_by(index) > 0 {
                queues.insert(queue);
            }
        }
        if !queues.is_empty() {
            let queues: Vec<String> = queues.into_iter().collect();
            self.signal.signal(&queues).await?;
        }

        debug!(
            models = self.models.len(),
            inserted = result.inserted,
            modified = result.modified,
            upserted = result.upserted,
            deleted = result.deleted,
            "transaction committed"
        );
        Ok(result)
    }
}
