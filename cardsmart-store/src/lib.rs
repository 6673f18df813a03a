//! cardsmart-store: file-backed implementation of the core `Storage`
//! capability.
//!
//! One JSON file per key under a root directory (by default `~/.cardsmart`).
//! Writes are best effort; the engine treats storage as fallible and keeps
//! going, so this crate never needs to be clever about durability.

use anyhow::{Context, Result};
use cardsmart_core::Storage;
use std::fs;
use std::path::{Path, PathBuf};

/// `~/.cardsmart`.
pub fn cardsmart_home() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".cardsmart"))
}

pub fn ensure_cardsmart_home() -> Result<PathBuf> {
    let dir = cardsmart_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

/// Directory-rooted key-value storage: key `usage_log` lives at
/// `<root>/usage_log.json`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Open (creating if needed) storage rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).with_context(|| format!("create {}", root.display()))?;
        Ok(Self { root })
    }

    /// Open storage under the default home directory.
    pub fn open_default() -> Result<Self> {
        Self::open(ensure_cardsmart_home()?)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are internal constants, but keep them filesystem-safe anyway.
        let safe: String = key
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.root.join(format!("{safe}.json"))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
        Ok(Some(bytes))
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        fs::write(&path, value).with_context(|| format!("write {}", path.display()))
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
        }
        Ok(())
    }
}
