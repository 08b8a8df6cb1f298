use ess_types::{Revision, StorageKey, TypeError};

/// Errors from holder, cache, and backend operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A bounded wait for the read or write lock expired.
    #[error("timed out after {waited_ms}ms waiting for lock on {key}")]
    LockTimeout { key: StorageKey, waited_ms: u64 },

    /// The holder was closed before or while the operation ran.
    #[error("holder closed: {key}")]
    HolderClosed { key: StorageKey },

    /// The initial load failed; no holder was created.
    #[error("failed to load {key}: {source}")]
    PersistenceLoadFailed {
        key: StorageKey,
        #[source]
        source: Box<StorageError>,
    },

    /// Writing dirty state to the backend failed. In-memory state was
    /// still released when this comes from `close()`.
    #[error("failed to flush {key}: {source}")]
    PersistenceFlushFailed {
        key: StorageKey,
        #[source]
        source: Box<StorageError>,
    },

    /// The backend has no object for this key and none could be created.
    #[error("storage object not found: {key}")]
    NotFound { key: StorageKey },

    /// Another writer saved the object since this copy was loaded.
    #[error("stale revision for {key}: expected {expected}, found {found}")]
    StaleRevision {
        key: StorageKey,
        expected: Revision,
        found: Revision,
    },

    /// A key read back from the backend failed validation.
    #[error("invalid key: {0}")]
    InvalidKey(#[from] TypeError),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Holder configuration could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// Returns `true` for [`StorageError::HolderClosed`].
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::HolderClosed { .. })
    }
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
