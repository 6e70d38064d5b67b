//! Store module: the declarative write language and the in-memory store.

mod filter;
mod memory;
mod update;
mod write_model;

pub use filter::Filter;
pub use memory::{DEFAULT_NOTIFICATION_CAPACITY, InMemoryDocumentStore};
pub use update::Update;
pub use write_model::{BulkWriteResult, WriteModel};
