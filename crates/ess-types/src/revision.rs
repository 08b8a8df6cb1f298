use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Modification stamp of a persisted object.
///
/// `counter` increases by one on every successful save; `modified_ms` is the
/// wall-clock time of that save and never moves backwards. A backend compares
/// the revision a writer last saw with the one it holds to detect writes
/// based on stale data.
///
/// Ordering: `counter` → `modified_ms` (total order).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Revision {
    /// Number of saves that produced this revision.
    pub counter: u64,
    /// Wall-clock milliseconds since UNIX epoch at save time.
    pub modified_ms: u64,
}

impl Revision {
    /// Create a revision with explicit values.
    pub fn new(counter: u64, modified_ms: u64) -> Self {
        Self {
            counter,
            modified_ms,
        }
    }

    /// The revision of an object that has never been persisted.
    pub const fn zero() -> Self {
        Self {
            counter: 0,
            modified_ms: 0,
        }
    }

    /// Returns `true` for [`Revision::zero`].
    pub fn is_zero(&self) -> bool {
        self.counter == 0
    }

    /// The revision produced by saving on top of `self`.
    pub fn next(&self) -> Self {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            counter: self.counter + 1,
            modified_ms: now_ms.max(self.modified_ms),
        }
    }
}

impl PartialOrd for Revision {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Revision {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.counter
            .cmp(&other.counter)
            .then(self.modified_ms.cmp(&other.modified_ms))
    }
}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Revision(r{}@{}ms)", self.counter, self.modified_ms)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}@{}", self.counter, self.modified_ms)
    }
}

impl FromStr for Revision {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || TypeError::InvalidRevision(s.to_string());
        let rest = s.strip_prefix('r').ok_or_else(bad)?;
        let (counter, modified) = rest.split_once('@').ok_or_else(bad)?;
        Ok(Self {
            counter: counter.parse().map_err(|_| bad())?,
            modified_ms: modified.parse().map_err(|_| bad())?,
        })
    }
}
