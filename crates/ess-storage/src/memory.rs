use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use ess_types::{Revision, StorageKey};
use parking_lot::RwLock;

use crate::error::{StorageError, StorageResult};
use crate::traits::{PersistenceBackend, StorageObject, Versioned};

/// In-memory, HashMap-based persistence backend.
///
/// Intended for tests and embedding. Objects are cloned on load and save.
/// Counts loads and saves so callers can assert on backend traffic.
pub struct InMemoryBackend<T> {
    objects: RwLock<HashMap<StorageKey, Versioned<T>>>,
    loads: AtomicU64,
    saves: AtomicU64,
}

impl<T: StorageObject> InMemoryBackend<T> {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            loads: AtomicU64::new(0),
            saves: AtomicU64::new(0),
        }
    }

    /// Seed an object at revision 1 without counting it as a save.
    pub fn insert(&self, key: StorageKey, data: T) {
        self.objects
            .write()
            .insert(key, Versioned::new(Revision::new(1, 0), data));
    }

    /// Current stored copy of `key`, if any.
    pub fn get(&self, key: &StorageKey) -> Option<Versioned<T>> {
        self.objects.read().get(key).cloned()
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Returns `true` if the backend is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Number of `load` calls served so far.
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    /// Number of successful `save` calls so far.
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::Relaxed)
    }
}

impl<T: StorageObject> Default for InMemoryBackend<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: StorageObject> PersistenceBackend<T> for InMemoryBackend<T> {
    fn load(&self, key: &StorageKey) -> StorageResult<Option<Versioned<T>>> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        Ok(self.objects.read().get(key).cloned())
    }

    fn save(
        &self,
        key: &StorageKey,
        record: Versioned<&T>,
        expected: Revision,
    ) -> StorageResult<()> {
        let mut map = self.objects.write();
        let found = map.get(key).map(|v| v.revision).unwrap_or_default();
        if found != expected {
            return Err(StorageError::StaleRevision {
                key: key.clone(),
                expected,
                found,
            });
        }
        map.insert(
            key.clone(),
            Versioned::new(record.revision, record.data.clone()),
        );
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn delete(&self, key: &StorageKey) -> StorageResult<bool> {
        Ok(self.objects.write().remove(key).is_some())
    }

    fn keys(&self) -> StorageResult<Vec<StorageKey>> {
        let mut keys: Vec<StorageKey> = self.objects.read().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

impl<T> std::fmt::Debug for InMemoryBackend<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("object_count", &self.objects.read().len())
            .field("saves", &self.saves.load(Ordering::Relaxed))
            .finish()
    }
}
