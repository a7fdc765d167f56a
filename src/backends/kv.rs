use super::KeyValueStore;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Mutex;

/// Key-value store backed by a sled tree.
pub struct SledStore {
    tree: sled::Tree,
}

impl SledStore {
    pub fn new(tree: sled::Tree) -> Self {
        Self { tree }
    }

    pub fn open(db: &sled::Db, name: &str) -> Result<Self> {
        Ok(Self::new(db.open_tree(name)?))
    }
}

impl KeyValueStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.tree.get(key)? {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|e| Error::Store(format!("non-UTF-8 value for {}: {}", key, e))),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<bool> {
        self.tree.insert(key, value.as_bytes())?;
        self.tree.flush()?;
        Ok(true)
    }
}

/// Process-local store; counters vanish on exit.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|_| Error::Store("memory store poisoned".into()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<bool> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| Error::Store("memory store poisoned".into()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(true)
    }
}
