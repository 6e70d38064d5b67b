use thiserror::Error;

/// Operational classification of a [`StorageError`].
///
/// A claim that matched nothing (another worker won the race) is not an error at all:
/// it surfaces as `Ok(None)` from the claim and drives the fetch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Required input was empty. Reported before any side effect.
    InvalidArgument,
    /// A wait was cancelled. No partial claim was made.
    Cancelled,
    /// The backing store rejected a write or failed. Retry belongs to the caller.
    Store,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    #[error("operation was cancelled")]
    Cancelled,

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// An ordered bulk write stopped at `index`; the first `applied` models stay applied.
    #[error("bulk write failed at operation {index} ({applied} applied): {source}")]
    BulkWrite {
        index: usize,
        applied: usize,
        #[source]
        source: Box<StorageError>,
    },

    #[error("store failure: {0}")]
    Store(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    pub fn invalid_argument(name: &'static str, reason: impl Into<String>) -> Self {
        StorageError::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            StorageError::Cancelled => ErrorKind::Cancelled,
            StorageError::DuplicateKey(_)
            | StorageError::BulkWrite { .. }
            | StorageError::Store(_)
            | StorageError::Serialization(_) => ErrorKind::Store,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }

    /// A unique key was violated, directly or as the cause of a failed bulk write.
    pub fn is_duplicate_key(&self) -> bool {
        match self {
            StorageError::DuplicateKey(_) => true,
            StorageError::BulkWrite { source, .. } => source.is_duplicate_key(),
            _ => false,
        }
    }
}

/// Reject empty strings for arguments the store keys on.
pub(crate) fn require_non_empty(name: &'static str, value: &str) -> Result<(), StorageError> {
    if value.is_empty() {
        return Err(StorageError::invalid_argument(name, "must not be empty"));
    }
    Ok(())
}
