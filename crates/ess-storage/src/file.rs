//! JSON-file persistence backend.
//!
//! Each object lives in its own document:
//!
//! ```text
//! <root>/<namespace>/<id>.json
//! ```
//!
//! Saves write a temporary file in the target directory and rename it over
//! the old document, so a crash never leaves a half-written object behind.

use std::fs;
use std::io::{self, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use ess_types::{Revision, StorageKey};
use parking_lot::Mutex;
use serde::Deserialize;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::traits::{PersistenceBackend, StorageObject, Versioned};

const EXTENSION: &str = "json";

/// Stores one pretty-printed JSON document per key under a root directory.
pub struct JsonFileBackend<T> {
    root: PathBuf,
    /// Serializes the revision check and rename within this process.
    write_lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

/// Just the revision of a stored document.
#[derive(Deserialize)]
struct RevisionOnly {
    revision: Revision,
}

impl<T: StorageObject> JsonFileBackend<T> {
    /// Open (or create) a document store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "opened json file backend");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
            _marker: PhantomData,
        })
    }

    /// The root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the document for `key`.
    pub fn path_for(&self, key: &StorageKey) -> PathBuf {
        self.root
            .join(key.namespace())
            .join(format!("{}.{EXTENSION}", key.id()))
    }

    fn read_bytes(&self, key: &StorageKey) -> StorageResult<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn stored_revision(&self, key: &StorageKey) -> StorageResult<Revision> {
        match self.read_bytes(key)? {
            Some(bytes) => {
                let doc: RevisionOnly = serde_json::from_slice(&bytes)
                    .map_err(|e| StorageError::Serialization(format!("{key}: {e}")))?;
                Ok(doc.revision)
            }
            None => Ok(Revision::zero()),
        }
    }
}

impl<T: StorageObject> PersistenceBackend<T> for JsonFileBackend<T> {
    fn load(&self, key: &StorageKey) -> StorageResult<Option<Versioned<T>>> {
        let Some(bytes) = self.read_bytes(key)? else {
            return Ok(None);
        };
        let record = serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::Serialization(format!("{key}: {e}")))?;
        Ok(Some(record))
    }

    fn save(
        &self,
        key: &StorageKey,
        record: Versioned<&T>,
        expected: Revision,
    ) -> StorageResult<()> {
        let path = self.path_for(key);
        let dir = path
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "document has no parent"))?;
        let payload = serde_json::to_vec_pretty(&record)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let _guard = self.write_lock.lock();
        let found = self.stored_revision(key)?;
        if found != expected {
            return Err(StorageError::StaleRevision {
                key: key.clone(),
                expected,
                found,
            });
        }

        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&payload)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StorageError::Io(e.error))?;

        debug!(%key, revision = %record.revision, len = payload.len(), "document saved");
        Ok(())
    }

    fn delete(&self, key: &StorageKey) -> StorageResult<bool> {
        let _guard = self.write_lock.lock();
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> StorageResult<Vec<StorageKey>> {
        let mut keys = Vec::new();
        for ns_entry in fs::read_dir(&self.root)? {
            let ns_entry = ns_entry?;
            if !ns_entry.file_type()?.is_dir() {
                continue;
            }
            let Some(namespace) = ns_entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            for doc in fs::read_dir(ns_entry.path())? {
                let path = doc?.path();
                if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                    continue;
                }
                let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                keys.push(StorageKey::new(&namespace, id)?);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

impl<T> std::fmt::Debug for JsonFileBackend<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonFileBackend")
            .field("root", &self.root)
            .finish()
    }
}
