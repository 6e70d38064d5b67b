//! Domain model (ids, documents, states, invocation data).

pub mod document;
pub mod ids;
pub mod invocation;
pub mod state;

pub use document::{
    CounterDocument, Document, DocumentId, DocumentKind, FeedPosition, HashDocument,
    JobDocument, ListEntryDocument, Notification, SetMemberDocument,
};
pub use ids::{EntryId, Id, IdMarker, JobId, ParseIdError};
pub use invocation::{InvocationData, JobInvocation};
pub use state::{State, StateEntry, names as state_names};
