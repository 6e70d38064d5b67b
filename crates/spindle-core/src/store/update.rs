//! Field updates applied to a matched (or freshly upserted) document.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::domain::{Document, StateEntry};
use crate::error::StorageError;

/// One field mutation. Updates that name a field the document kind does not have
/// leave the document unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    SetExpireAt(Option<DateTime<Utc>>),
    SetStateName(String),
    PushState(StateEntry),
    /// `None` is stored as an explicit null, distinct from an absent parameter.
    SetParameter { name: String, value: Option<String> },
    SetQueue(Option<String>),
    SetFetchedAt(Option<DateTime<Utc>>),
    /// Additive delta on a counter value.
    Increment(i64),
    SetScore(f64),
    /// Merges fields into a hash; existing fields not named are kept.
    MergeFields(BTreeMap<String, String>),
}

impl Update {
    /// Apply to `doc`; returns whether anything changed.
    ///
    /// A counter increment that would leave the `i64` range fails and leaves the
    /// value as it was.
    pub fn apply(&self, doc: &mut Document) -> Result<bool, StorageError> {
        let changed = match (self, doc) {
            (Update::SetExpireAt(at), doc) => {
                let changed = doc.expire_at() != *at;
                doc.set_expire_at(*at);
                changed
            }
            (Update::SetStateName(name), Document::Job(job)) => {
                replace(&mut job.state_name, Some(name.clone()))
            }
            (Update::PushState(entry), Document::Job(job)) => {
                job.state_history.push(entry.clone());
                true
            }
            (Update::SetParameter { name, value }, Document::Job(job)) => {
                let previous = job.parameters.insert(name.clone(), value.clone());
                previous.as_ref() != Some(value)
            }
            (Update::SetQueue(queue), Document::Job(job)) => replace(&mut job.queue, queue.clone()),
            (Update::SetFetchedAt(at), Document::Job(job)) => replace(&mut job.fetched_at, *at),
            (Update::Increment(delta), Document::Counter(counter)) => {
                let Some(value) = counter.value.checked_add(*delta) else {
                    return Err(StorageError::Store(format!(
                        "counter `{}` overflows at {} + {delta}",
                        counter.key, counter.value
                    )));
                };
                counter.value = value;
                *delta != 0
            }
            (Update::SetScore(score), Document::SetMember(member)) => {
                let changed = member.score != *score;
                member.score = *score;
                changed
            }
            (Update::MergeFields(fields), Document::Hash(hash)) => {
                let mut changed = false;
                for (field, value) in fields {
                    if hash.fields.get(field) != Some(value) {
                        hash.fields.insert(field.clone(), value.clone());
                        changed = true;
                    }
                }
                changed
            }
            _ => false,
        };
        Ok(changed)
    }

    /// Apply every update, or none of them when one fails.
    pub fn apply_all(updates: &[Update], doc: &mut Document) -> Result<bool, StorageError> {
        let mut next = doc.clone();
        let mut changed = false;
        for update in updates {
            changed |= update.apply(&mut next)?;
        }
        *doc = next;
        Ok(changed)
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}
