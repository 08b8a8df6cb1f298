//! Lock-guarded storage objects for Essentials.
//!
//! Game-event handlers on many threads share mutable, persisted objects
//! (player accounts, jails, warps, kits). This crate gives each object a
//! single owner, the [`StorageObjectHolder`], that hands out scoped read and
//! write guards and writes the object back to a [`PersistenceBackend`].
//!
//! # Components
//!
//! - [`StorageObject`] -- capability bound for payloads (serde + identity keyed)
//! - [`StorageObjectHolder`] -- reader/writer lock around one object
//! - [`ReadGuard`] / [`WriteGuard`] -- the only way to reach the object
//! - [`HolderCache`] -- owns holder lifetimes, one holder per key
//! - [`InMemoryBackend`] / [`JsonFileBackend`] -- persistence backends
//!
//! # Design Rules
//!
//! 1. No read hold ever overlaps a write hold on the same holder.
//! 2. An object is mutated only through a `WriteGuard`; mutation marks it dirty.
//! 3. The backend is loaded once per holder and saved under the write lock.
//! 4. `close()` flushes dirty state and releases the object even when the
//!    flush fails; the failure is reported, never swallowed.
//! 5. Lock waits are bounded by [`HolderConfig::lock_timeout`].

pub mod cache;
pub mod config;
pub mod error;
pub mod file;
pub mod guard;
pub mod holder;
pub mod memory;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use cache::HolderCache;
pub use config::{HolderConfig, MissingPolicy, WritePolicy};
pub use error::{StorageError, StorageResult};
pub use ess_types::{Revision, StorageKey};
pub use file::JsonFileBackend;
pub use guard::{ReadGuard, WriteGuard};
pub use holder::StorageObjectHolder;
pub use memory::InMemoryBackend;
pub use traits::{PersistenceBackend, StorageObject, Versioned};
