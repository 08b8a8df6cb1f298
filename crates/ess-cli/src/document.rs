use std::ops::{Deref, DerefMut};

use ess_storage::{StorageKey, StorageObject};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A schemaless stored object: a flat JSON map of fields.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl StorageObject for Document {
    fn create(_key: &StorageKey) -> Option<Self> {
        Some(Self::default())
    }
}

impl Deref for Document {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Document {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Interpret a command-line value as JSON, falling back to a plain string.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
