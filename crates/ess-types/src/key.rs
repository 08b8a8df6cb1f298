//! Storage key validation.
//!
//! A key has the form `namespace:id`, for example `player:alice` or
//! `warp:spawn`. Valid keys:
//! - Namespace is 1..=32 bytes of `[a-z0-9_-]`
//! - Id is 1..=128 bytes
//! - Id must not contain `/`, `\`, `:`, or control characters
//! - Id must not start with `.`
//!
//! The id restrictions keep keys usable as file names by on-disk backends.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Maximum namespace length in bytes.
pub const MAX_NAMESPACE_LEN: usize = 32;

/// Maximum id length in bytes.
pub const MAX_ID_LEN: usize = 128;

/// Characters that are forbidden anywhere in an id.
const FORBIDDEN_ID_CHARS: &[char] = &['/', '\\', ':'];

/// Stable identity of a persisted storage object.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StorageKey {
    raw: String,
    /// Byte offset of the `:` separator in `raw`.
    split: usize,
}

impl StorageKey {
    /// Build a key from its two parts, validating both.
    ///
    /// ```
    /// use ess_types::StorageKey;
    ///
    /// let key = StorageKey::new("player", "alice").unwrap();
    /// assert_eq!(key.to_string(), "player:alice");
    /// assert!(StorageKey::new("Player", "alice").is_err());
    /// ```
    pub fn new(namespace: &str, id: &str) -> Result<Self, TypeError> {
        let raw = format!("{namespace}:{id}");
        validate_namespace(&raw, namespace)?;
        validate_id(&raw, id)?;
        Ok(Self {
            split: namespace.len(),
            raw,
        })
    }

    /// The namespace part (`player` in `player:alice`).
    pub fn namespace(&self) -> &str {
        &self.raw[..self.split]
    }

    /// The id part (`alice` in `player:alice`).
    pub fn id(&self) -> &str {
        &self.raw[self.split + 1..]
    }

    /// The full `namespace:id` form.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> TypeError {
    TypeError::InvalidKey {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn validate_namespace(key: &str, namespace: &str) -> Result<(), TypeError> {
    if namespace.is_empty() {
        return Err(invalid(key, "namespace must not be empty"));
    }
    if namespace.len() > MAX_NAMESPACE_LEN {
        return Err(invalid(
            key,
            format!("namespace longer than {MAX_NAMESPACE_LEN} bytes"),
        ));
    }
    if let Some(ch) = namespace
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-'))
    {
        return Err(invalid(key, format!("namespace contains {ch:?}")));
    }
    Ok(())
}

fn validate_id(key: &str, id: &str) -> Result<(), TypeError> {
    if id.is_empty() {
        return Err(invalid(key, "id must not be empty"));
    }
    if id.len() > MAX_ID_LEN {
        return Err(invalid(key, format!("id longer than {MAX_ID_LEN} bytes")));
    }
    if id.starts_with('.') {
        return Err(invalid(key, "id must not start with '.'"));
    }
    if let Some(ch) = id
        .chars()
        .find(|c| c.is_control() || FORBIDDEN_ID_CHARS.contains(c))
    {
        return Err(invalid(key, format!("id contains forbidden character {ch:?}")));
    }
    Ok(())
}

impl FromStr for StorageKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, id) = s
            .split_once(':')
            .ok_or_else(|| invalid(s, "expected namespace:id"))?;
        Self::new(namespace, id)
    }
}

impl TryFrom<String> for StorageKey {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StorageKey> for String {
    fn from(key: StorageKey) -> Self {
        key.raw
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageKey({})", self.raw)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_splits_namespace_and_id() {
        let key: StorageKey = "player:alice".parse().unwrap();
        assert_eq!(key.namespace(), "player");
        assert_eq!(key.id(), "alice");
        assert_eq!(key.as_str(), "player:alice");
    }

    #[test]
    fn id_may_contain_dots_and_spaces() {
        let key: StorageKey = "warp:the spawn.v2".parse().unwrap();
        assert_eq!(key.id(), "the spawn.v2");
    }

    #[test]
    fn missing_separator_rejected() {
        assert!("playeralice".parse::<StorageKey>().is_err());
    }

    #[test]
    fn only_first_separator_splits() {
        // The id may not contain ':' so a second separator is invalid.
        assert!("player:alice:bob".parse::<StorageKey>().is_err());
    }

    #[test]
    fn empty_parts_rejected() {
        assert!(":alice".parse::<StorageKey>().is_err());
        assert!("player:".parse::<StorageKey>().is_err());
    }

    #[test]
    fn uppercase_namespace_rejected() {
        let err = StorageKey::new("Player", "alice").unwrap_err();
        assert!(matches!(err, TypeError::InvalidKey { .. }));
    }

    #[test]
    fn path_traversal_rejected() {
        assert!(StorageKey::new("player", "../etc").is_err());
        assert!(StorageKey::new("player", "a/b").is_err());
        assert!(StorageKey::new("player", "a\\b").is_err());
        assert!(StorageKey::new("player", ".hidden").is_err());
    }

    #[test]
    fn control_characters_rejected() {
        assert!(StorageKey::new("player", "al\nice").is_err());
        assert!(StorageKey::new("player", "al\0ice").is_err());
    }

    #[test]
    fn length_limits() {
        let long_ns = "a".repeat(MAX_NAMESPACE_LEN + 1);
        assert!(StorageKey::new(&long_ns, "x").is_err());
        let long_id = "a".repeat(MAX_ID_LEN + 1);
        assert!(StorageKey::new("player", &long_id).is_err());
        let max_id = "a".repeat(MAX_ID_LEN);
        assert!(StorageKey::new("player", &max_id).is_ok());
    }

    #[test]
    fn serde_as_plain_string() {
        let key = StorageKey::new("kit", "starter").unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"kit:starter\"");
        let parsed: StorageKey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn serde_rejects_invalid_string() {
        let parsed: Result<StorageKey, _> = serde_json::from_str("\"no-separator\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn debug_and_display() {
        let key = StorageKey::new("jail", "cell_1").unwrap();
        assert_eq!(format!("{key}"), "jail:cell_1");
        assert_eq!(format!("{key:?}"), "StorageKey(jail:cell_1)");
    }

    proptest! {
        #[test]
        fn valid_parts_always_parse_back(
            ns in "[a-z0-9_-]{1,32}",
            id in "[A-Za-z0-9_ -][A-Za-z0-9_. -]{0,127}",
        ) {
            let key = StorageKey::new(&ns, &id).unwrap();
            let reparsed: StorageKey = key.to_string().parse().unwrap();
            prop_assert_eq!(reparsed.namespace(), ns.as_str());
            prop_assert_eq!(reparsed.id(), id.as_str());
        }

        #[test]
        fn ids_with_slashes_never_validate(
            prefix in "[a-z]{0,8}",
            suffix in "[a-z]{0,8}",
        ) {
            let id = format!("{prefix}/{suffix}");
            prop_assert!(StorageKey::new("player", &id).is_err());
        }
    }
}
