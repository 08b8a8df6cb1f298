//! Scoped access to a holder's object.
//!
//! A guard is the only way to reach the data inside a
//! [`StorageObjectHolder`]. The lock is released when the guard is dropped
//! or explicitly unlocked, on every exit path including panics.

use std::fmt;
use std::ops::{Deref, DerefMut};

use ess_types::{Revision, StorageKey};
use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard};
use tracing::trace;

use crate::config::WritePolicy;
use crate::error::StorageResult;
use crate::holder::{Live, StorageObjectHolder};
use crate::traits::StorageObject;

/// Shared access to a holder's object. Many may exist at once.
#[must_use = "the read lock is released as soon as the guard is dropped"]
pub struct ReadGuard<'a, T: StorageObject> {
    key: &'a StorageKey,
    live: MappedRwLockReadGuard<'a, Live<T>>,
}

impl<'a, T: StorageObject> ReadGuard<'a, T> {
    pub(crate) fn new(key: &'a StorageKey, live: MappedRwLockReadGuard<'a, Live<T>>) -> Self {
        Self { key, live }
    }

    pub fn key(&self) -> &StorageKey {
        self.key
    }

    /// Revision of the last successful save (zero if never persisted).
    pub fn revision(&self) -> Revision {
        self.live.revision
    }

    pub fn is_dirty(&self) -> bool {
        self.live.dirty
    }

    /// Release the read lock.
    pub fn unlock(self) {
        trace!(key = %self.key, "read lock released");
    }
}

impl<T: StorageObject> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.live.data
    }
}

impl<T: StorageObject> fmt::Debug for ReadGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadGuard")
            .field("key", self.key)
            .field("revision", &self.live.revision)
            .field("dirty", &self.live.dirty)
            .finish()
    }
}

/// Exclusive access to a holder's object.
///
/// Any mutable dereference marks the object dirty.
#[must_use = "the write lock is released as soon as the guard is dropped"]
pub struct WriteGuard<'a, T: StorageObject> {
    holder: &'a StorageObjectHolder<T>,
    live: MappedRwLockWriteGuard<'a, Live<T>>,
}

impl<'a, T: StorageObject> WriteGuard<'a, T> {
    pub(crate) fn new(
        holder: &'a StorageObjectHolder<T>,
        live: MappedRwLockWriteGuard<'a, Live<T>>,
    ) -> Self {
        Self { holder, live }
    }

    pub fn key(&self) -> &StorageKey {
        self.holder.key()
    }

    pub fn revision(&self) -> Revision {
        self.live.revision
    }

    pub fn is_dirty(&self) -> bool {
        self.live.dirty
    }

    /// Flag the object as changed without touching it through `DerefMut`.
    pub fn mark_dirty(&mut self) {
        self.live.dirty = true;
    }

    /// Persist the object now, keeping the lock.
    ///
    /// Clears the dirty flag and advances the revision on success. Does
    /// nothing for a clean object.
    pub fn flush(&mut self) -> StorageResult<()> {
        if !self.live.dirty {
            return Ok(());
        }
        self.holder.persist(&mut self.live)
    }

    /// Release the write lock.
    ///
    /// Under [`WritePolicy::WriteThrough`] a dirty object is flushed first;
    /// the lock is released even when that flush fails, and the object stays
    /// dirty for the next flush attempt.
    pub fn unlock(mut self) -> StorageResult<()> {
        if self.holder.config().write_policy == WritePolicy::WriteThrough {
            self.flush()?;
        }
        trace!(key = %self.holder.key(), "write lock released");
        Ok(())
    }
}

impl<T: StorageObject> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.live.data
    }
}

impl<T: StorageObject> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.live.dirty = true;
        &mut self.live.data
    }
}

impl<T: StorageObject> fmt::Debug for WriteGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteGuard")
            .field("key", self.holder.key())
            .field("revision", &self.live.revision)
            .field("dirty", &self.live.dirty)
            .finish()
    }
}
