//! Foundation types for Essentials storage.
//!
//! Every persisted object is addressed by a [`StorageKey`] and carries a
//! [`Revision`] that advances each time it is written to a backend. Both
//! types are shared by the storage and metrics crates.
//!
//! # Key Types
//!
//! - [`StorageKey`] -- validated `namespace:id` identity used for persistence lookup
//! - [`Revision`] -- modification stamp used to detect stale writes

pub mod error;
pub mod key;
pub mod revision;

pub use error::TypeError;
pub use key::StorageKey;
pub use revision::Revision;
