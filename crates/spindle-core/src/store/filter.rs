//! Filters over job-graph documents.

use chrono::{DateTime, Utc};

use crate::domain::state::is_enqueued_name;
use crate::domain::{Document, DocumentKind, EntryId, JobId, SetMemberDocument};

/// A predicate over one document. Field predicates never match documents
/// that lack the field.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Kind(DocumentKind),
    JobId(JobId),
    EntryIdIn(Vec<EntryId>),
    /// Counter and hash keys, derived set-member keys.
    Key(String),
    /// Owning key of a set member.
    SetType(String),
    /// Owning key of a list entry.
    ListItem(String),
    ListValue(String),
    /// Job queue equals the given name.
    Queue(String),
    /// Job fetch timestamp equals the value (`None` = not fetched).
    FetchedAt(Option<DateTime<Utc>>),
    /// Job has a fetch timestamp strictly older than the instant.
    FetchedBefore(DateTime<Utc>),
    /// Job's current state is "enqueued" (case-insensitive).
    StateIsEnqueued,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::And(filters.into_iter().collect())
    }

    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Or(filters.into_iter().collect())
    }

    pub fn not(filter: Filter) -> Self {
        Filter::Not(Box::new(filter))
    }

    /// The job document with this id.
    pub fn job(id: JobId) -> Self {
        Filter::and([Filter::Kind(DocumentKind::Job), Filter::JobId(id)])
    }

    pub fn counter(key: &str) -> Self {
        Filter::and([Filter::Kind(DocumentKind::Counter), Filter::Key(key.to_string())])
    }

    pub fn hash(key: &str) -> Self {
        Filter::and([Filter::Kind(DocumentKind::Hash), Filter::Key(key.to_string())])
    }

    /// The single member `value` of set `key`.
    pub fn set_member(key: &str, value: &str) -> Self {
        Filter::and([
            Filter::Kind(DocumentKind::SetMember),
            Filter::Key(SetMemberDocument::member_key(key, value)),
        ])
    }

    /// Every member of set `key`.
    pub fn set(key: &str) -> Self {
        Filter::and([
            Filter::Kind(DocumentKind::SetMember),
            Filter::SetType(key.to_string()),
        ])
    }

    /// Every entry of list `key`.
    pub fn list(key: &str) -> Self {
        Filter::and([
            Filter::Kind(DocumentKind::ListEntry),
            Filter::ListItem(key.to_string()),
        ])
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::Kind(kind) => doc.kind() == *kind,
            Filter::JobId(id) => matches!(doc, Document::Job(job) if job.id == *id),
            Filter::EntryIdIn(ids) => match doc {
                Document::Job(_) => false,
                Document::Counter(d) => ids.contains(&d.id),
                Document::SetMember(d) => ids.contains(&d.id),
                Document::ListEntry(d) => ids.contains(&d.id),
                Document::Hash(d) => ids.contains(&d.id),
            },
            Filter::Key(key) => doc.key() == Some(key.as_str()),
            Filter::SetType(key) => matches!(doc, Document::SetMember(d) if d.set_type == *key),
            Filter::ListItem(key) => matches!(doc, Document::ListEntry(d) if d.item == *key),
            Filter::ListValue(value) => {
                matches!(doc, Document::ListEntry(d) if d.value == *value)
            }
            Filter::Queue(queue) => {
                matches!(doc, Document::Job(job) if job.queue.as_deref() == Some(queue.as_str()))
            }
            Filter::FetchedAt(at) => matches!(doc, Document::Job(job) if job.fetched_at == *at),
            Filter::FetchedBefore(at) => {
                matches!(doc, Document::Job(job) if job.fetched_at.is_some_and(|f| f < *at))
            }
            Filter::StateIsEnqueued => matches!(
                doc,
                Document::Job(job) if job.state_name.as_deref().is_some_and(is_enqueued_name)
            ),
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(doc)),
            Filter::Not(filter) => !filter.matches(doc),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::domain::{CounterDocument, JobDocument};
    use chrono::Duration;
    use rstest::rstest;
    use ulid::Ulid;

    fn job(queue: Option<&str>, fetched_at: Option<DateTime<Utc>>, state: Option<&str>) -> Document {
        Document::Job(JobDocument {
            id: JobId::from_ulid(Ulid::new()),
            invocation_data: String::new(),
            arguments: String::new(),
            parameters: BTreeMap::new(),
            created_at: Utc::now(),
            expire_at: None,
            state_name: state.map(str::to_string),
            state_history: Vec::new(),
            queue: queue.map(str::to_string),
            fetched_at,
        })
    }

    #[test]
    fn queue_filter_ignores_other_kinds() {
        let counter = Document::Counter(CounterDocument {
            id: EntryId::from_ulid(Ulid::new()),
            key: "default".into(),
            value: 1,
            expire_at: None,
        });

        assert!(!Filter::Queue("default".into()).matches(&counter));
        assert!(Filter::Queue("default".into()).matches(&job(Some("default"), None, None)));
        assert!(!Filter::Queue("default".into()).matches(&job(None, None, None)));
    }

    #[rstest]
    #[case(None, false)]
    #[case(Some(Duration::hours(-2)), true)]
    #[case(Some(Duration::zero()), false)]
    fn fetched_before_requires_an_older_timestamp(
        #[case] offset: Option<Duration>,
        #[case] expected: bool,
    ) {
        let now = Utc::now();
        let doc = job(Some("default"), offset.map(|o| now + o), None);
        let cutoff = now - Duration::hours(1);

        assert_eq!(Filter::FetchedBefore(cutoff).matches(&doc), expected);
    }

    #[test]
    fn state_is_enqueued_matches_case_insensitively() {
        assert!(Filter::StateIsEnqueued.matches(&job(None, None, Some("enqueued"))));
        assert!(!Filter::StateIsEnqueued.matches(&job(None, None, Some("Processing"))));
        assert!(!Filter::StateIsEnqueued.matches(&job(None, None, None)));
    }

    #[test]
    fn combinators_compose() {
        let doc = job(Some("critical"), None, None);
        let f = Filter::and([
            Filter::Kind(DocumentKind::Job),
            Filter::or([Filter::Queue("default".into()), Filter::Queue("critical".into())]),
            Filter::not(Filter::StateIsEnqueued),
        ]);

        assert!(f.matches(&doc));
    }
}
