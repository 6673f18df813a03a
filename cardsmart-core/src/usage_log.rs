//! Usage event log — append-only, FIFO-capped record of card interactions.
//!
//! Events are immutable once appended. The log is bounded: past the cap the
//! oldest entries are evicted first, never the most recent. The whole log
//! can be cleared only by the engine-level learning reset.

use crate::context::{DeviceType, EventContext};
use crate::storage::{Storage, load_json, save_json};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Storage key for the persisted log.
pub const USAGE_LOG_KEY: &str = "card_usage_logs";

/// Default eviction cap. Matches the original's persisted bound.
pub const DEFAULT_LOG_CAP: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageAction {
    Selected,
    Rejected,
    Viewed,
    Pinned,
    /// Audit record appended by the preference store path; not a direct
    /// card touch.
    PreferenceChange,
}

impl UsageAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageAction::Selected => "selected",
            UsageAction::Rejected => "rejected",
            UsageAction::Viewed => "viewed",
            UsageAction::Pinned => "pinned",
            UsageAction::PreferenceChange => "preference_change",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub id: u64,
    pub card_id: String,
    pub action: UsageAction,
    pub timestamp: DateTime<Utc>,
    pub context: EventContext,
}

/// Aggregate usage counts bucketed by hour, location, device, and action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsagePatterns {
    pub by_hour: HashMap<u32, usize>,
    pub by_location: HashMap<String, usize>,
    pub by_device: HashMap<DeviceType, usize>,
    pub by_action: HashMap<UsageAction, usize>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedLog {
    next_id: u64,
    entries: Vec<UsageEvent>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UsageLog {
    entries: VecDeque<UsageEvent>,
    cap: usize,
    next_id: u64,
}

impl Default for UsageLog {
    fn default() -> Self {
        Self::with_cap(DEFAULT_LOG_CAP)
    }
}

impl UsageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cap(cap: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cap: cap.max(1),
            next_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Oldest-first view of the events.
    pub fn events(&self) -> impl Iterator<Item = &UsageEvent> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&UsageEvent> {
        self.entries.back()
    }

    /// Append an event, evicting the oldest entry past the cap. Returns a
    /// clone of the created event so callers can hand it to learners.
    pub fn append(
        &mut self,
        card_id: impl Into<String>,
        action: UsageAction,
        context: EventContext,
        now: DateTime<Utc>,
    ) -> UsageEvent {
        let event = UsageEvent {
            id: self.next_id,
            card_id: card_id.into(),
            action,
            timestamp: now,
            context,
        };
        self.next_id += 1;

        self.entries.push_back(event.clone());
        while self.entries.len() > self.cap {
            self.entries.pop_front();
        }
        event
    }

    /// Aggregate usage counts, optionally filtered to one card. O(n) walk
    /// over the log; pure.
    pub fn query_patterns(&self, card_id: Option<&str>, tz: Tz) -> UsagePatterns {
        let mut patterns = UsagePatterns::default();

        for event in self.entries.iter() {
            if let Some(id) = card_id {
                if event.card_id != id {
                    continue;
                }
            }

            let hour = crate::time::local_hour(event.timestamp, tz);
            let location = event
                .context
                .location
                .clone()
                .unwrap_or_else(|| "Unknown".to_string());

            *patterns.by_hour.entry(hour).or_insert(0) += 1;
            *patterns.by_location.entry(location).or_insert(0) += 1;
            if let Some(device) = event.context.device_type {
                *patterns.by_device.entry(device).or_insert(0) += 1;
            }
            *patterns.by_action.entry(event.action).or_insert(0) += 1;
            patterns.total += 1;
        }

        patterns
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Load the persisted log, keeping the configured cap. Missing or
    /// corrupt state yields an empty log.
    pub fn load(storage: &dyn Storage, cap: usize) -> Self {
        let mut log = Self::with_cap(cap);
        if let Some(persisted) = load_json::<PersistedLog>(storage, USAGE_LOG_KEY) {
            log.next_id = persisted.next_id.max(1);
            for event in persisted.entries {
                log.entries.push_back(event);
            }
            while log.entries.len() > log.cap {
                log.entries.pop_front();
            }
        }
        log
    }

    /// Persist the log snapshot, best effort.
    pub fn save(&self, storage: &mut dyn Storage) {
        let persisted = PersistedLog {
            next_id: self.next_id,
            entries: self.entries.iter().cloned().collect(),
        };
        save_json(storage, USAGE_LOG_KEY, &persisted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 15, 0, 0).unwrap()
    }

    fn tz() -> Tz {
        "America/Chicago".parse().unwrap()
    }

    fn home_ctx() -> EventContext {
        EventContext::default().with_location("Home").with_time(t0())
    }

    #[test]
    fn append_assigns_monotonic_ids_in_call_order() {
        let mut log = UsageLog::new();
        let a = log.append("card-a", UsageAction::Selected, home_ctx(), t0());
        let b = log.append("card-b", UsageAction::Viewed, home_ctx(), t0());
        assert!(b.id > a.id);
        let ids: Vec<u64> = log.events().map(|e| e.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[test]
    fn eviction_drops_oldest_first() {
        let mut log = UsageLog::with_cap(3);
        for i in 0..5 {
            log.append(format!("card-{i}"), UsageAction::Viewed, home_ctx(), t0());
        }
        assert_eq!(log.len(), 3);
        let cards: Vec<&str> = log.events().map(|e| e.card_id.as_str()).collect();
        assert_eq!(cards, vec!["card-2", "card-3", "card-4"]);
    }

    #[test]
    fn query_patterns_aggregates_dimensions() {
        let mut log = UsageLog::new();
        let ctx = EventContext {
            time: Some(t0()),
            location: Some("Home".to_string()),
            transaction_type: Some("groceries".to_string()),
            device_type: Some(DeviceType::Ios),
            network_type: None,
        };
        log.append("card-a", UsageAction::Selected, ctx.clone(), t0());
        log.append("card-a", UsageAction::Rejected, ctx.clone(), t0());
        log.append("card-b", UsageAction::Selected, ctx, t0());

        let all = log.query_patterns(None, tz());
        assert_eq!(all.total, 3);
        assert_eq!(all.by_action[&UsageAction::Selected], 2);
        assert_eq!(all.by_location["Home"], 3);
        assert_eq!(all.by_device[&DeviceType::Ios], 3);
        // 15:00 UTC in March (CST) is 09:00 local.
        assert_eq!(all.by_hour[&9], 3);

        let only_a = log.query_patterns(Some("card-a"), tz());
        assert_eq!(only_a.total, 2);
    }

    #[test]
    fn load_save_roundtrip_preserves_ids() {
        let mut storage = MemoryStorage::new();
        let mut log = UsageLog::new();
        log.append("card-a", UsageAction::Selected, home_ctx(), t0());
        log.append("card-b", UsageAction::Viewed, home_ctx(), t0());
        log.save(&mut storage);

        let reloaded = UsageLog::load(&storage, DEFAULT_LOG_CAP);
        assert_eq!(reloaded.len(), 2);
        let mut relog = reloaded;
        let next = relog.append("card-c", UsageAction::Selected, home_ctx(), t0());
        assert_eq!(next.id, 3);
    }

    #[test]
    fn corrupt_persisted_log_loads_empty() {
        let mut storage = MemoryStorage::new();
        storage.set(USAGE_LOG_KEY, b"][ nope").unwrap();
        let log = UsageLog::load(&storage, DEFAULT_LOG_CAP);
        assert!(log.is_empty());
    }

    #[test]
    fn load_respects_smaller_cap() {
        let mut storage = MemoryStorage::new();
        let mut log = UsageLog::new();
        for i in 0..10 {
            log.append(format!("card-{i}"), UsageAction::Viewed, home_ctx(), t0());
        }
        log.save(&mut storage);

        let reloaded = UsageLog::load(&storage, 4);
        assert_eq!(reloaded.len(), 4);
        // Most recent retained.
        assert_eq!(reloaded.latest().unwrap().card_id, "card-9");
    }
}
