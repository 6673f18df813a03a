//! Storage capability — minimal key-value seam for persisted learning state.
//!
//! The engine never touches a concrete store directly; the log, preference
//! store, and personalization model each serialize through this trait. The
//! original kept everything in browser local storage, so the contract stays
//! deliberately small: opaque bytes per string key.

use anyhow::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tracing::warn;

pub trait Storage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set(&mut self, key: &str, value: &[u8]) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// In-process map-backed storage. Used by tests and embedders that do not
/// want durable state.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Read a JSON value from storage.
///
/// Missing and corrupt state are both non-fatal: scoring must keep working
/// with empty state, so a bad payload degrades to `None` with a warning.
pub fn load_json<T: DeserializeOwned>(storage: &dyn Storage, key: &str) -> Option<T> {
    let bytes = match storage.get(key) {
        Ok(Some(b)) => b,
        Ok(None) => return None,
        Err(e) => {
            warn!(key, error = %e, "storage read failed; treating as empty");
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(key, error = %e, "corrupt persisted state; treating as empty");
            None
        }
    }
}

/// Write a JSON value to storage, best effort. A failed write is logged and
/// swallowed; the in-memory state remains authoritative for the session.
pub fn save_json<T: Serialize>(storage: &mut dyn Storage, key: &str, value: &T) {
    let bytes = match serde_json::to_vec(value) {
        Ok(b) => b,
        Err(e) => {
            warn!(key, error = %e, "failed to serialize state");
            return;
        }
    };
    if let Err(e) = storage.set(key, &bytes) {
        warn!(key, error = %e, "storage write failed; continuing without persistence");
    }
}
