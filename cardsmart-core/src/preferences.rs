//! Preference store — explicit user overrides, declared and never inferred.
//!
//! Entries are only written by direct user action (pin, tag, priority) and
//! never decay. The audit trail (a `preference_change` usage event per
//! write) is appended by the ranking engine, which owns both this store and
//! the log.

use crate::storage::{Storage, load_json, save_json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Storage key for persisted preferences.
pub const PREFERENCES_KEY: &str = "user_preferences";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceEntry {
    pub pinned: bool,
    /// Manual priority weight in [0, 1].
    pub priority: f64,
    pub tags: BTreeSet<String>,
    pub last_updated: DateTime<Utc>,
}

impl PreferenceEntry {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            pinned: false,
            priority: 0.0,
            tags: BTreeSet::new(),
            last_updated: now,
        }
    }
}

/// Partial update merged into an entry; absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreferencePatch {
    pub pinned: Option<bool>,
    pub priority: Option<f64>,
    pub add_tags: Vec<String>,
    pub remove_tags: Vec<String>,
}

impl PreferencePatch {
    pub fn pin() -> Self {
        Self {
            pinned: Some(true),
            priority: Some(1.0),
            ..Self::default()
        }
    }

    pub fn unpin() -> Self {
        Self {
            pinned: Some(false),
            ..Self::default()
        }
    }

    pub fn tags(tags: impl IntoIterator<Item = String>) -> Self {
        Self {
            add_tags: tags.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn untag(tag: impl Into<String>) -> Self {
        Self {
            remove_tags: vec![tag.into()],
            ..Self::default()
        }
    }

    /// Short human-readable description, used for audit records.
    pub fn describe(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(p) = self.pinned {
            parts.push(if p { "pin".to_string() } else { "unpin".to_string() });
        }
        if let Some(p) = self.priority {
            parts.push(format!("priority={p}"));
        }
        if !self.add_tags.is_empty() {
            parts.push(format!("+tags:{}", self.add_tags.join(",")));
        }
        if !self.remove_tags.is_empty() {
            parts.push(format!("-tags:{}", self.remove_tags.join(",")));
        }
        parts.join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreferenceStore {
    entries: HashMap<String, PreferenceEntry>,
}

impl PreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, card_id: &str) -> Option<&PreferenceEntry> {
        self.entries.get(card_id)
    }

    pub fn entries(&self) -> &HashMap<String, PreferenceEntry> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge a patch into the card's entry, creating it when absent. Tag
    /// union/difference is idempotent. Stamps `last_updated`.
    pub fn apply(&mut self, card_id: &str, patch: &PreferencePatch, now: DateTime<Utc>) -> &PreferenceEntry {
        let entry = self
            .entries
            .entry(card_id.to_string())
            .or_insert_with(|| PreferenceEntry::new(now));

        if let Some(pinned) = patch.pinned {
            entry.pinned = pinned;
        }
        if let Some(priority) = patch.priority {
            entry.priority = priority.clamp(0.0, 1.0);
        }
        for tag in &patch.add_tags {
            entry.tags.insert(tag.clone());
        }
        for tag in &patch.remove_tags {
            entry.tags.remove(tag);
        }
        entry.last_updated = now;
        entry
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn load(storage: &dyn Storage) -> Self {
        let entries = load_json::<HashMap<String, PreferenceEntry>>(storage, PREFERENCES_KEY)
            .unwrap_or_default();
        Self { entries }
    }

    pub fn save(&self, storage: &mut dyn Storage) {
        save_json(storage, PREFERENCES_KEY, &self.entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn pin_sets_priority_to_one() {
        let mut store = PreferenceStore::new();
        let entry = store.apply("card-a", &PreferencePatch::pin(), t0());
        assert!(entry.pinned);
        assert_eq!(entry.priority, 1.0);
    }

    #[test]
    fn unpin_keeps_other_fields() {
        let mut store = PreferenceStore::new();
        store.apply("card-a", &PreferencePatch::pin(), t0());
        store.apply("card-a", &PreferencePatch::tags(vec!["travel".to_string()]), t0());
        let entry = store.apply("card-a", &PreferencePatch::unpin(), t0());
        assert!(!entry.pinned);
        assert_eq!(entry.priority, 1.0);
        assert!(entry.tags.contains("travel"));
    }

    #[test]
    fn tagging_is_idempotent() {
        let mut store = PreferenceStore::new();
        let tags = || PreferencePatch::tags(vec!["travel".to_string(), "points".to_string()]);
        store.apply("card-a", &tags(), t0());
        let entry = store.apply("card-a", &tags(), t0());
        assert_eq!(entry.tags.len(), 2);

        let entry = store.apply("card-a", &PreferencePatch::untag("points"), t0());
        assert_eq!(entry.tags.len(), 1);
        // Removing an absent tag is a no-op.
        let entry = store.apply("card-a", &PreferencePatch::untag("points"), t0());
        assert_eq!(entry.tags.len(), 1);
    }

    #[test]
    fn priority_is_clamped() {
        let mut store = PreferenceStore::new();
        let patch = PreferencePatch {
            priority: Some(3.0),
            ..PreferencePatch::default()
        };
        let entry = store.apply("card-a", &patch, t0());
        assert_eq!(entry.priority, 1.0);
    }

    #[test]
    fn load_save_roundtrip() {
        let mut storage = MemoryStorage::new();
        let mut store = PreferenceStore::new();
        store.apply("card-a", &PreferencePatch::pin(), t0());
        store.save(&mut storage);

        let reloaded = PreferenceStore::load(&storage);
        assert!(reloaded.get("card-a").unwrap().pinned);
    }

    #[test]
    fn missing_state_loads_empty() {
        let storage = MemoryStorage::new();
        assert!(PreferenceStore::load(&storage).is_empty());
    }
}
