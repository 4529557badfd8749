use std::sync::{Mutex, PoisonError};

use super::{KeyValueStore, Record};
use crate::error::Result;

/// Process-local store. Used by tests and as the fallback when no file
/// store is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<Record>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, keys: &[&str]) -> Result<Record> {
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(keys
            .iter()
            .filter_map(|k| data.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    fn set(&self, record: Record) -> Result<()> {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        data.extend(record);
        Ok(())
    }

    fn remove(&self, keys: &[&str]) -> Result<()> {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            data.remove(*key);
        }
        Ok(())
    }
}
