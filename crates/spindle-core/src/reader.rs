//! StorageReader - ジョブグラフの読み取り
//!
//! 書き込みは WriteTransaction、読み取りはここ。どれも 1 回の `find` で完結する。

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::{
    Document, InvocationData, JobDocument, JobId, JobInvocation, ListEntryDocument,
    SetMemberDocument, StateEntry,
};
use crate::error::{StorageError, require_non_empty};
use crate::ports::DocumentStore;
use crate::store::Filter;

/// What the execution engine needs to run a job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobData {
    pub id: JobId,
    pub invocation: JobInvocation,
    pub state_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Read-side queries over the job graph.
#[derive(Clone)]
pub struct StorageReader {
    store: Arc<dyn DocumentStore>,
}

impl StorageReader {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    async fn find_job(&self, id: JobId) -> Result<Option<JobDocument>, StorageError> {
        let docs = self.store.find(&Filter::job(id)).await?;
        Ok(docs.into_iter().find_map(Document::into_job))
    }

    pub async fn get_job_data(&self, id: JobId) -> Result<Option<JobData>, StorageError> {
        let Some(job) = self.find_job(id).await? else {
            return Ok(None);
        };
        let mut data = InvocationData::from_json(&job.invocation_data)?;
        // Arguments may have been rewritten on the document after creation.
        data.arguments = job.arguments;
        Ok(Some(JobData {
            id: job.id,
            invocation: data.deserialize()?,
            state_name: job.state_name,
            created_at: job.created_at,
        }))
    }

    /// `None` when the job or the parameter is missing, or the parameter was set to null.
    pub async fn get_job_parameter(
        &self,
        id: JobId,
        name: &str,
    ) -> Result<Option<String>, StorageError> {
        require_non_empty("name", name)?;
        Ok(self
            .find_job(id)
            .await?
            .and_then(|mut job| job.parameters.remove(name).flatten()))
    }

    /// Most recent history entry.
    pub async fn get_state_data(&self, id: JobId) -> Result<Option<StateEntry>, StorageError> {
        Ok(self
            .find_job(id)
            .await?
            .and_then(|mut job| job.state_history.pop()))
    }

    /// Sum of every counter document under `key`.
    pub async fn get_counter(&self, key: &str) -> Result<i64, StorageError> {
        require_non_empty("key", key)?;
        let docs = self.store.find(&Filter::counter(key)).await?;
        Ok(docs
            .iter()
            .map(|doc| match doc {
                Document::Counter(counter) => counter.value,
                _ => 0,
            })
            .sum())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<SetMemberDocument>, StorageError> {
        require_non_empty("key", key)?;
        let docs = self.store.find(&Filter::set(key)).await?;
        Ok(docs
            .into_iter()
            .filter_map(|doc| match doc {
                Document::SetMember(member) => Some(member),
                _ => None,
            })
            .collect())
    }

    pub async fn get_all_items_from_set(&self, key: &str) -> Result<BTreeSet<String>, StorageError> {
        Ok(self
            .set_members(key)
            .await?
            .into_iter()
            .map(|member| member.value)
            .collect())
    }

    pub async fn get_set_count(&self, key: &str) -> Result<usize, StorageError> {
        Ok(self.set_members(key).await?.len())
    }

    /// Lowest-scored member with a score in `from_score..=to_score`.
    pub async fn get_first_by_lowest_score_from_set(
        &self,
        key: &str,
        from_score: f64,
        to_score: f64,
    ) -> Result<Option<String>, StorageError> {
        if from_score > to_score {
            return Err(StorageError::invalid_argument(
                "to_score",
                "must not be lower than from_score",
            ));
        }
        Ok(self
            .set_members(key)
            .await?
            .into_iter()
            .filter(|member| (from_score..=to_score).contains(&member.score))
            .min_by(|a, b| a.score.total_cmp(&b.score))
            .map(|member| member.value))
    }

    /// Entries of list `key`, newest first.
    async fn list_entries(&self, key: &str) -> Result<Vec<ListEntryDocument>, StorageError> {
        require_non_empty("key", key)?;
        let mut entries: Vec<ListEntryDocument> = self
            .store
            .find(&Filter::list(key))
            .await?
            .into_iter()
            .filter_map(|doc| match doc {
                Document::ListEntry(entry) => Some(entry),
                _ => None,
            })
            .collect();
        entries.sort_unstable_by(|a, b| b.id.cmp(&a.id));
        Ok(entries)
    }

    pub async fn get_all_items_from_list(&self, key: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .list_entries(key)
            .await?
            .into_iter()
            .map(|entry| entry.value)
            .collect())
    }

    /// Values ranked `starting_from..=ending_at` (0-based, newest first).
    pub async fn get_range_from_list(
        &self,
        key: &str,
        starting_from: usize,
        ending_at: usize,
    ) -> Result<Vec<String>, StorageError> {
        let take = ending_at.saturating_add(1).saturating_sub(starting_from);
        Ok(self
            .list_entries(key)
            .await?
            .into_iter()
            .skip(starting_from)
            .take(take)
            .map(|entry| entry.value)
            .collect())
    }

    pub async fn get_list_count(&self, key: &str) -> Result<usize, StorageError> {
        Ok(self.list_entries(key).await?.len())
    }

    /// `None` when the hash does not exist.
    pub async fn get_all_entries_from_hash(
        &self,
        key: &str,
    ) -> Result<Option<BTreeMap<String, String>>, StorageError> {
        require_non_empty("key", key)?;
        let docs = self.store.find(&Filter::hash(key)).await?;
        Ok(docs.into_iter().find_map(|doc| match doc {
            Document::Hash(hash) => Some(hash.fields),
            _ => None,
        }))
    }

    pub async fn get_value_from_hash(
        &self,
        key: &str,
        name: &str,
    ) -> Result<Option<String>, StorageError> {
        require_non_empty("name", name)?;
        Ok(self
            .get_all_entries_from_hash(key)
            .await?
            .and_then(|mut fields| fields.remove(name)))
    }
}
