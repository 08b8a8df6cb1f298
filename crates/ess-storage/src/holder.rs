//! Lock-guarded ownership of one persisted object.
//!
//! [`StorageObjectHolder`] pairs a single [`StorageObject`] with a
//! reader/writer lock and the backend it came from:
//!
//! - many [`ReadGuard`]s or exactly one [`WriteGuard`] at a time, never both
//! - the object is only reachable through a guard
//! - the backend is read once on [`open`](StorageObjectHolder::open) and
//!   written under the write lock
//! - after [`close`](StorageObjectHolder::close) every operation except a
//!   second `close` fails with `HolderClosed`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ess_types::{Revision, StorageKey};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, trace, warn};

use crate::config::{millis, HolderConfig, MissingPolicy};
use crate::error::{StorageError, StorageResult};
use crate::guard::{ReadGuard, WriteGuard};
use crate::traits::{PersistenceBackend, StorageObject, Versioned};

/// State of an open holder. `None` in the lock once the holder is closed.
pub(crate) struct Live<T> {
    pub(crate) data: T,
    pub(crate) dirty: bool,
    pub(crate) revision: Revision,
}

/// Owns one persisted object and mediates all access to it.
pub struct StorageObjectHolder<T: StorageObject> {
    key: StorageKey,
    state: RwLock<Option<Live<T>>>,
    /// Set once `state` is `None` and the final save has run.
    closed: AtomicBool,
    backend: Arc<dyn PersistenceBackend<T>>,
    config: HolderConfig,
}

impl<T: StorageObject> StorageObjectHolder<T> {
    /// Load `key` from `backend` and wrap it.
    ///
    /// The backend is asked exactly once. A missing object is handled per
    /// [`MissingPolicy`]; a freshly created object starts dirty so that it is
    /// persisted on close. Load failures produce no holder.
    pub fn open(
        key: StorageKey,
        backend: Arc<dyn PersistenceBackend<T>>,
        config: HolderConfig,
    ) -> StorageResult<Self> {
        let loaded = backend
            .load(&key)
            .map_err(|e| StorageError::PersistenceLoadFailed {
                key: key.clone(),
                source: Box::new(e),
            })?;

        let live = match loaded {
            Some(Versioned { revision, data }) => {
                debug!(%key, %revision, "storage object loaded");
                Live {
                    data,
                    dirty: false,
                    revision,
                }
            }
            None => {
                let created = match config.missing_policy {
                    MissingPolicy::Create => T::create(&key),
                    MissingPolicy::Fail => None,
                };
                let Some(data) = created else {
                    return Err(StorageError::NotFound { key });
                };
                debug!(%key, "storage object created");
                Live {
                    data,
                    dirty: true,
                    revision: Revision::zero(),
                }
            }
        };

        Ok(Self {
            key,
            state: RwLock::new(Some(live)),
            closed: AtomicBool::new(false),
            backend,
            config,
        })
    }

    pub fn key(&self) -> &StorageKey {
        &self.key
    }

    pub fn config(&self) -> &HolderConfig {
        &self.config
    }

    /// Returns `true` once `close()` has finished its final flush. Takes no
    /// lock.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether the object has unflushed changes. Takes a read lock.
    pub fn is_dirty(&self) -> StorageResult<bool> {
        Ok(self.read()?.is_dirty())
    }

    /// Acquire shared access, waiting at most the configured lock timeout.
    pub fn read(&self) -> StorageResult<ReadGuard<'_, T>> {
        self.acquire_read(self.config.lock_timeout())
    }

    /// Acquire shared access, waiting at most `timeout`.
    pub fn read_for(&self, timeout: Duration) -> StorageResult<ReadGuard<'_, T>> {
        self.acquire_read(Some(timeout))
    }

    /// Acquire exclusive access, waiting at most the configured lock timeout.
    pub fn write(&self) -> StorageResult<WriteGuard<'_, T>> {
        self.acquire_write(self.config.lock_timeout())
    }

    /// Acquire exclusive access, waiting at most `timeout`.
    pub fn write_for(&self, timeout: Duration) -> StorageResult<WriteGuard<'_, T>> {
        self.acquire_write(Some(timeout))
    }

    /// Run `f` with shared access.
    pub fn with_read<R>(&self, f: impl FnOnce(&T) -> R) -> StorageResult<R> {
        let guard = self.read()?;
        Ok(f(&guard))
    }

    /// Run `f` with exclusive access, then unlock (flushing under
    /// write-through). The object is marked dirty.
    pub fn with_write<R>(&self, f: impl FnOnce(&mut T) -> R) -> StorageResult<R> {
        let mut guard = self.write()?;
        let out = f(&mut guard);
        guard.unlock()?;
        Ok(out)
    }

    /// Flush dirty state under the write lock. Returns `true` if a save ran.
    pub fn flush(&self) -> StorageResult<bool> {
        let mut guard = self.write()?;
        if !guard.is_dirty() {
            return Ok(false);
        }
        guard.flush()?;
        Ok(true)
    }

    /// End the holder's lifecycle.
    ///
    /// Waits (up to the lock timeout) for outstanding readers and writers,
    /// flushes dirty state, and drops the object. A failed flush is reported
    /// as `PersistenceFlushFailed`, but the holder is closed regardless.
    /// Closing an already closed holder is a no-op.
    pub fn close(&self) -> StorageResult<()> {
        if self.is_closed() {
            return Ok(());
        }
        let mut state = self.lock_write(self.config.lock_timeout())?;
        let Some(mut live) = state.take() else {
            return Ok(());
        };

        let result = if live.dirty {
            self.persist(&mut live)
        } else {
            Ok(())
        };
        // `is_closed()` implies the final save has finished.
        self.closed.store(true, Ordering::Release);
        drop(state);

        match &result {
            Ok(()) => debug!(key = %self.key, revision = %live.revision, "holder closed"),
            Err(e) => warn!(key = %self.key, error = %e, "holder closed with unflushed changes"),
        }
        result
    }

    /// Save `live` and advance its revision. Caller holds the write lock.
    pub(crate) fn persist(&self, live: &mut Live<T>) -> StorageResult<()> {
        let next = live.revision.next();
        self.backend
            .save(&self.key, Versioned::new(next, &live.data), live.revision)
            .map_err(|e| StorageError::PersistenceFlushFailed {
                key: self.key.clone(),
                source: Box::new(e),
            })?;
        live.revision = next;
        live.dirty = false;
        debug!(key = %self.key, revision = %next, "storage object flushed");
        Ok(())
    }

    fn acquire_read(&self, timeout: Option<Duration>) -> StorageResult<ReadGuard<'_, T>> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        let state = match timeout {
            Some(t) => self
                .state
                .try_read_for(t)
                .ok_or_else(|| self.timeout_error(t))?,
            None => self.state.read(),
        };
        let live = RwLockReadGuard::try_map(state, Option::as_ref)
            .map_err(|_| self.closed_error())?;
        trace!(key = %self.key, "read lock acquired");
        Ok(ReadGuard::new(&self.key, live))
    }

    fn acquire_write(&self, timeout: Option<Duration>) -> StorageResult<WriteGuard<'_, T>> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        let state = self.lock_write(timeout)?;
        let live = RwLockWriteGuard::try_map(state, Option::as_mut)
            .map_err(|_| self.closed_error())?;
        trace!(key = %self.key, "write lock acquired");
        Ok(WriteGuard::new(self, live))
    }

    fn lock_write(
        &self,
        timeout: Option<Duration>,
    ) -> StorageResult<RwLockWriteGuard<'_, Option<Live<T>>>> {
        match timeout {
            Some(t) => self
                .state
                .try_write_for(t)
                .ok_or_else(|| self.timeout_error(t)),
            None => Ok(self.state.write()),
        }
    }

    fn closed_error(&self) -> StorageError {
        StorageError::HolderClosed {
            key: self.key.clone(),
        }
    }

    fn timeout_error(&self, waited: Duration) -> StorageError {
        let waited_ms = millis(waited);
        debug!(key = %self.key, waited_ms, "lock wait timed out");
        StorageError::LockTimeout {
            key: self.key.clone(),
            waited_ms,
        }
    }
}

impl<T: StorageObject> Drop for StorageObjectHolder<T> {
    fn drop(&mut self) {
        if let Some(live) = self.state.get_mut() {
            if live.dirty {
                warn!(key = %self.key, "holder dropped without close; unflushed changes lost");
            }
        }
    }
}

impl<T: StorageObject> std::fmt::Debug for StorageObjectHolder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageObjectHolder")
            .field("key", &self.key)
            .field("closed", &self.is_closed())
            .finish()
    }
}
