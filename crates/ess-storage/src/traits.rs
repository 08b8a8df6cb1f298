use ess_types::{Revision, StorageKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;

/// A persisted domain object that can live inside a
/// [`StorageObjectHolder`](crate::StorageObjectHolder).
///
/// The holder tracks the dirty flag and revision on the object's behalf, so
/// implementors only supply the data and, optionally, a way to construct a
/// fresh instance for a key the backend has never seen.
pub trait StorageObject: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Build a new object for a key with no persisted state.
    ///
    /// Returning `None` (the default) means the type cannot be created from
    /// nothing, and opening a missing key fails with `NotFound`.
    fn create(key: &StorageKey) -> Option<Self> {
        let _ = key;
        None
    }
}

/// An object paired with the revision it was persisted at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub revision: Revision,
    pub data: T,
}

impl<T> Versioned<T> {
    pub fn new(revision: Revision, data: T) -> Self {
        Self { revision, data }
    }

    /// Borrow the payload without cloning it.
    pub fn by_ref(&self) -> Versioned<&T> {
        Versioned {
            revision: self.revision,
            data: &self.data,
        }
    }
}

/// Load/save contract between holders and durable storage.
///
/// All implementations must satisfy these invariants:
/// - `load` of a key that was never saved returns `Ok(None)`.
/// - `save` is rejected with `StaleRevision` when `expected` differs from the
///   revision currently stored (`Revision::zero()` when nothing is stored).
/// - A successful `save` is visible to every later `load`.
/// - All I/O errors are propagated, never silently ignored.
pub trait PersistenceBackend<T: StorageObject>: Send + Sync {
    /// Read the object stored under `key`.
    fn load(&self, key: &StorageKey) -> StorageResult<Option<Versioned<T>>>;

    /// Replace the object stored under `key` with `record`.
    fn save(&self, key: &StorageKey, record: Versioned<&T>, expected: Revision)
        -> StorageResult<()>;

    /// Delete the object stored under `key`. Returns `true` if it existed.
    fn delete(&self, key: &StorageKey) -> StorageResult<bool>;

    /// All keys with persisted state, sorted.
    fn keys(&self) -> StorageResult<Vec<StorageKey>>;
}
