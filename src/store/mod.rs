//! Persistent key-value store the classifier reads and writes.
//!
//! Mirrors the extension storage API: `get(keys)` returns a partial record,
//! `set(record)` merges a partial record, `remove(keys)` deletes entries.
//! Values are JSON so every backend stores the same shapes.

pub mod file;
pub mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// A partial record: key → JSON value.
pub type Record = Map<String, Value>;

/// Keys consumed by the classifier core and the navigation layer.
pub mod keys {
    pub const WORD_SCORES: &str = "wordScores";
    pub const TRAINING_DATA: &str = "trainingData";
    pub const MODEL_ARTIFACTS: &str = "modelArtifacts";
    pub const NORMALIZER: &str = "normalizer";
    pub const WHITELIST: &str = "whitelist";
    pub const BLACKLIST: &str = "blacklist";
    pub const ENABLED: &str = "enabled";
    pub const ML_ENABLED: &str = "mlEnabled";
    pub const MULTI_TAB: &str = "multiTab";
    pub const ENGINE: &str = "engine";
    pub const STATS: &str = "stats";
    pub const LAST_REDIRECT: &str = "lastRedirect";
    pub const SEARCH_HISTORY: &str = "searchHistory";
}

/// Storage backend shared by every component.
///
/// Implementations must be safe to call from several navigation threads.
pub trait KeyValueStore: Send + Sync {
    /// Fetch the entries present for `keys`. Missing keys are simply absent.
    fn get(&self, keys: &[&str]) -> Result<Record>;

    /// Merge `record` into the store.
    fn set(&self, record: Record) -> Result<()>;

    /// Delete `keys`. Deleting an absent key is not an error.
    fn remove(&self, keys: &[&str]) -> Result<()>;
}

/// Read one key and deserialize it. `Ok(None)` when the key is absent.
pub fn load<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    let mut record = store.get(&[key])?;
    match record.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| Error::MalformedRecord {
                key: key.to_string(),
                reason: e.to_string(),
            }),
    }
}

/// Serialize `value` and write it under `key`.
pub fn save<T: Serialize + ?Sized>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let mut record = Record::new();
    record.insert(key.to_string(), serde_json::to_value(value)?);
    store.set(record)
}
