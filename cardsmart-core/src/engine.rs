//! Ranking engine — wires the context provider, usage log, preference
//! store, and personalization model behind one explicitly constructed
//! object.
//!
//! No global state: embedders (and tests) build isolated engines around any
//! `Storage` implementation. Persisted state is loaded at construction and
//! written back best-effort after every mutation; scoring itself stays
//! synchronous and pure over the engine's current state.

use crate::card::Card;
use crate::context::{ContextProvider, ContextSnapshot, DeviceType, EventContext, LocationSource};
use crate::model::{AdaptationConfig, PersonalizationModel};
use crate::preferences::{PreferenceEntry, PreferencePatch, PreferenceStore, PREFERENCES_KEY};
use crate::scoring::{self, RankedCards};
use crate::storage::Storage;
use crate::usage_log::{UsageAction, UsageEvent, UsageLog, UsagePatterns, DEFAULT_LOG_CAP, USAGE_LOG_KEY};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub log_cap: usize,
    pub adaptation: AdaptationConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_cap: DEFAULT_LOG_CAP,
            adaptation: AdaptationConfig::default(),
        }
    }
}

/// Snapshot of all learned state, for offline inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningExport {
    pub preferences: HashMap<String, PreferenceEntry>,
    pub model: PersonalizationModel,
    pub log_len: usize,
    pub exported_at: DateTime<Utc>,
}

pub struct CardRankingEngine<S: Storage> {
    storage: S,
    tz: Tz,
    config: EngineConfig,
    context: ContextProvider,
    log: UsageLog,
    preferences: PreferenceStore,
    model: PersonalizationModel,
    revision: u64,
}

impl<S: Storage> CardRankingEngine<S> {
    pub fn new(storage: S, tz: Tz, device_type: DeviceType, now: DateTime<Utc>) -> Self {
        Self::with_config(storage, tz, device_type, now, EngineConfig::default())
    }

    pub fn with_config(
        storage: S,
        tz: Tz,
        device_type: DeviceType,
        now: DateTime<Utc>,
        config: EngineConfig,
    ) -> Self {
        let log = UsageLog::load(&storage, config.log_cap);
        let preferences = PreferenceStore::load(&storage);
        let model = PersonalizationModel::load(&storage);

        Self {
            storage,
            tz,
            config,
            context: ContextProvider::new(device_type, now),
            log,
            preferences,
            model,
            revision: 0,
        }
    }

    // --- accessors -------------------------------------------------------

    pub fn snapshot(&self) -> &ContextSnapshot {
        self.context.snapshot()
    }

    pub fn model(&self) -> &PersonalizationModel {
        &self.model
    }

    pub fn log(&self) -> &UsageLog {
        &self.log
    }

    pub fn preference(&self, card_id: &str) -> Option<&PreferenceEntry> {
        self.preferences.get(card_id)
    }

    /// Meaningful-change counter: bumps on log, preference, model, and
    /// non-tick context changes. A reactive wrapper re-ranks when this
    /// moves; the periodic time tick alone never moves it.
    pub fn revision(&self) -> u64 {
        self.revision + self.context.revision()
    }

    // --- context ---------------------------------------------------------

    pub fn tick(&mut self, now: DateTime<Utc>) {
        self.context.tick(now);
    }

    pub fn set_transaction_context(&mut self, transaction_type: Option<String>) {
        self.context.set_transaction_context(transaction_type);
    }

    pub fn set_network_type(&mut self, network_type: Option<String>) {
        self.context.set_network_type(network_type);
    }

    pub fn capture_location(&mut self, source: &mut dyn LocationSource, now: DateTime<Utc>) {
        self.context.capture_location(source, now);
    }

    // --- scoring ---------------------------------------------------------

    /// Rank the given card set against the engine's current state.
    /// Synchronous and deterministic; an empty set yields empty buckets.
    pub fn rank(&self, cards: &[Card], now: DateTime<Utc>) -> RankedCards {
        scoring::rank(
            cards,
            &self.log,
            &self.model,
            self.context.snapshot(),
            self.tz,
            now,
        )
    }

    /// Personalized score for a single card outside full ranking: learned
    /// base score plus pattern-table and pin/priority bonuses.
    pub fn personalized_score(&self, card_id: &str, context: &EventContext) -> f64 {
        self.model
            .personalized_score(card_id, context, self.preferences.get(card_id), self.tz)
    }

    /// Re-read persisted state, picking up writes from other processes
    /// sharing the same backing store. The revision moves only when
    /// something actually changed.
    pub fn refresh_from_storage(&mut self) {
        let log = UsageLog::load(&self.storage, self.config.log_cap);
        let preferences = PreferenceStore::load(&self.storage);
        let model = PersonalizationModel::load(&self.storage);

        if log != self.log || preferences != self.preferences || model != self.model {
            self.log = log;
            self.preferences = preferences;
            self.model = model;
            self.revision += 1;
        }
    }

    // --- usage + learning ------------------------------------------------

    /// Record a card interaction: freeze the live snapshot (caller
    /// overrides win), append to the log, feed the behavior learner, and
    /// persist. Returns the created event.
    pub fn log_card_usage(
        &mut self,
        card_id: &str,
        action: UsageAction,
        overrides: EventContext,
        now: DateTime<Utc>,
    ) -> UsageEvent {
        let context = self.context.event_context().merged(overrides);
        let event = self.log.append(card_id, action, context, now);

        self.model
            .learn_from_behavior(card_id, action, &event.context, self.tz);

        self.log.save(&mut self.storage);
        self.model.save(&mut self.storage);
        self.revision += 1;
        event
    }

    /// Ranking feedback: the suggested card was taken.
    pub fn learn_from_selection(&mut self, card_id: &str, context: &EventContext) {
        debug!(card_id, "suggestion accepted");
        self.model
            .apply_feedback(true, context, &self.config.adaptation);
        self.model.save(&mut self.storage);
        self.revision += 1;
    }

    /// Ranking feedback: the suggested card was dismissed.
    pub fn learn_from_rejection(&mut self, card_id: &str, context: &EventContext) {
        debug!(card_id, "suggestion rejected");
        self.model
            .apply_feedback(false, context, &self.config.adaptation);
        self.model.save(&mut self.storage);
        self.revision += 1;
    }

    // --- preferences -----------------------------------------------------

    /// Merge an explicit preference change and append a `preference_change`
    /// audit record to the usage log. Pinning also feeds the behavior
    /// learner so the learned preference score reflects it immediately.
    pub fn set_card_preference(
        &mut self,
        card_id: &str,
        patch: PreferencePatch,
        now: DateTime<Utc>,
    ) -> PreferenceEntry {
        debug!(card_id, change = %patch.describe(), "preference change");
        let entry = self.preferences.apply(card_id, &patch, now).clone();

        let context = self.context.event_context();
        self.log
            .append(card_id, UsageAction::PreferenceChange, context.clone(), now);

        if patch.pinned == Some(true) {
            self.model
                .learn_from_behavior(card_id, UsageAction::Pinned, &context, self.tz);
            self.model.save(&mut self.storage);
        }

        self.preferences.save(&mut self.storage);
        self.log.save(&mut self.storage);
        self.revision += 1;
        entry
    }

    pub fn pin_card(&mut self, card_id: &str, now: DateTime<Utc>) -> PreferenceEntry {
        self.set_card_preference(card_id, PreferencePatch::pin(), now)
    }

    pub fn unpin_card(&mut self, card_id: &str, now: DateTime<Utc>) -> PreferenceEntry {
        self.set_card_preference(card_id, PreferencePatch::unpin(), now)
    }

    pub fn tag_card(
        &mut self,
        card_id: &str,
        tags: impl IntoIterator<Item = String>,
        now: DateTime<Utc>,
    ) -> PreferenceEntry {
        self.set_card_preference(card_id, PreferencePatch::tags(tags), now)
    }

    pub fn remove_tag(
        &mut self,
        card_id: &str,
        tag: impl Into<String>,
        now: DateTime<Utc>,
    ) -> PreferenceEntry {
        self.set_card_preference(card_id, PreferencePatch::untag(tag), now)
    }

    // --- analytics + lifecycle -------------------------------------------

    pub fn usage_patterns(&self, card_id: Option<&str>) -> UsagePatterns {
        self.log.query_patterns(card_id, self.tz)
    }

    pub fn export_learning_data(&self, now: DateTime<Utc>) -> LearningExport {
        LearningExport {
            preferences: self.preferences.entries().clone(),
            model: self.model.clone(),
            log_len: self.log.len(),
            exported_at: now,
        }
    }

    /// Clear preferences, model, and log together. Irreversible; callers
    /// are expected to gate this behind their own confirmation.
    pub fn reset_learning(&mut self) {
        self.log.clear();
        self.preferences.clear();
        self.model = PersonalizationModel::default();

        for key in [USAGE_LOG_KEY, PREFERENCES_KEY, crate::model::MODEL_KEY] {
            if let Err(e) = self.storage.remove(key) {
                warn!(key, error = %e, "failed to clear persisted state");
            }
        }
        self.revision += 1;
    }
}
