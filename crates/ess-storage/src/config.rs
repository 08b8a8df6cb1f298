use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

/// When dirty state is written to the backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WritePolicy {
    /// Flush on `close()`, cache eviction, and `flush_all()`.
    #[default]
    OnClose,
    /// Also flush whenever a dirty write guard is explicitly unlocked.
    WriteThrough,
}

/// What opening a key with no persisted state does.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingPolicy {
    /// Build a fresh object with `StorageObject::create`; fail with
    /// `NotFound` when the type has no constructor.
    #[default]
    Create,
    /// Always fail with `NotFound`.
    Fail,
}

/// Configuration shared by every holder a cache opens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HolderConfig {
    /// Upper bound on lock waits in milliseconds. `None` waits forever and
    /// is written as `0`.
    #[serde(with = "timeout_ms")]
    pub lock_timeout_ms: Option<u64>,
    pub write_policy: WritePolicy,
    pub missing_policy: MissingPolicy,
}

impl Default for HolderConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: Some(30_000),
            write_policy: WritePolicy::default(),
            missing_policy: MissingPolicy::default(),
        }
    }
}

impl HolderConfig {
    /// Parse a `[storage]`-style TOML table.
    pub fn from_toml_str(s: &str) -> StorageResult<Self> {
        toml::from_str(s).map_err(|e| StorageError::Config(e.to_string()))
    }

    /// The configured lock wait bound.
    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }

    /// Same configuration with a different lock bound. A zero bound waits
    /// forever, matching `lock_timeout_ms = 0`.
    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout_ms = timeout.map(millis).filter(|&ms| ms > 0);
        self
    }

    pub fn with_write_policy(mut self, policy: WritePolicy) -> Self {
        self.write_policy = policy;
        self
    }

    pub fn with_missing_policy(mut self, policy: MissingPolicy) -> Self {
        self.missing_policy = policy;
        self
    }
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// `Option<u64>` as a plain integer where `0` means no timeout.
mod timeout_ms {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        // TOML integers are signed 64-bit.
        serializer.serialize_u64(value.unwrap_or(0).min(i64::MAX as u64))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok((ms > 0).then_some(ms))
    }
}
