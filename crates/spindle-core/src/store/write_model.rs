//! Declarative write operations submitted as one ordered bulk write.

use crate::domain::Document;

use super::{Filter, Update};

/// One conditional write. A transaction is an ordered `Vec<WriteModel>`.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteModel {
    InsertOne(Document),
    DeleteOne(Filter),
    DeleteMany(Filter),
    UpdateOne {
        filter: Filter,
        update: Vec<Update>,
        /// Shell inserted (then updated) when nothing matches.
        upsert: Option<Document>,
    },
    UpdateMany {
        filter: Filter,
        update: Vec<Update>,
    },
}

impl WriteModel {
    pub fn update_one(filter: Filter, update: impl IntoIterator<Item = Update>) -> Self {
        WriteModel::UpdateOne {
            filter,
            update: update.into_iter().collect(),
            upsert: None,
        }
    }

    pub fn upsert_one(
        filter: Filter,
        update: impl IntoIterator<Item = Update>,
        shell: Document,
    ) -> Self {
        WriteModel::UpdateOne {
            filter,
            update: update.into_iter().collect(),
            upsert: Some(shell),
        }
    }

    pub fn update_many(filter: Filter, update: impl IntoIterator<Item = Update>) -> Self {
        WriteModel::UpdateMany {
            filter,
            update: update.into_iter().collect(),
        }
    }

    /// Short name used in logs.
    pub fn model_type(&self) -> &'static str {
        match self {
            WriteModel::InsertOne(_) => "InsertOne",
            WriteModel::DeleteOne(_) => "DeleteOne",
            WriteModel::DeleteMany(_) => "DeleteMany",
            WriteModel::UpdateOne { .. } => "UpdateOne",
            WriteModel::UpdateMany { .. } => "UpdateMany",
        }
    }
}

/// Outcome of a bulk write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkWriteResult {
    pub inserted: u64,
    pub matched: u64,
    pub modified: u64,
    pub deleted: u64,
    pub upserted: u64,
    /// Documents affected by each model, in submission order.
    pub affected: Vec<u64>,
}

impl BulkWriteResult {
    /// Documents affected by the model at `index` (0 if out of range).
    pub fn affected_by(&self, index: usize) -> u64 {
        self.affected.get(index).copied().unwrap_or(0)
    }
}
