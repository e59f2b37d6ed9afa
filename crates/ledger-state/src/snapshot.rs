//! Schema-agnostic snapshots of record field values.
//!
//! A [`Snapshot`] is an ordered `field -> JSON value` map. Version entries,
//! draft overlays and operations all store snapshots rather than typed
//! records, so adding a field to a record never requires migrating history.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::StorageError;

/// Pseudo-field carrying the soft-delete state of a record inside a snapshot.
pub const DELETED_KEY: &str = "deleted";

/// Content digest (SHA-256 hex string) of a snapshot.
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Old and new value of a single field between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: Option<Value>,
    pub new: Option<Value>,
}

/// Ordered field map describing a record's values at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(BTreeMap<String, Value>);

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from a JSON object. Non-object values yield an
    /// empty snapshot.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Snapshot(map.into_iter().collect()),
            _ => Snapshot::default(),
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone().into_iter().collect())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overwrite this snapshot's values with every key present in `other`.
    pub fn merge(&mut self, other: &Snapshot) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Soft-delete state carried by the snapshot, if any.
    pub fn deleted(&self) -> Option<bool> {
        self.0.get(DELETED_KEY).and_then(Value::as_bool)
    }

    pub fn with_deleted(mut self, deleted: bool) -> Self {
        self.0.insert(DELETED_KEY.to_string(), Value::Bool(deleted));
        self
    }

    /// Fields whose values differ between `self` (old) and `newer`.
    ///
    /// Keys missing on one side are reported with `None` on that side.
    pub fn diff(&self, newer: &Snapshot) -> BTreeMap<String, FieldChange> {
        let mut changes = BTreeMap::new();
        for (key, new_value) in &newer.0 {
            let old_value = self.0.get(key);
            if old_value != Some(new_value) {
                changes.insert(
                    key.clone(),
                    FieldChange {
                        old: old_value.cloned(),
                        new: Some(new_value.clone()),
                    },
                );
            }
        }
        for (key, old_value) in &self.0 {
            if !newer.0.contains_key(key) {
                changes.insert(
                    key.clone(),
                    FieldChange {
                        old: Some(old_value.clone()),
                        new: None,
                    },
                );
            }
        }
        changes
    }

    /// SHA-256 over the canonical (key-ordered) JSON encoding.
    pub fn digest(&self) -> ContentDigest {
        let bytes = serde_json::to_vec(&self.0).unwrap_or_default();
        ContentDigest::from_bytes(&bytes)
    }
}

impl FromIterator<(String, Value)> for Snapshot {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Snapshot(iter.into_iter().collect())
    }
}
