//! Personalization model — adaptive scoring weights plus learned per-card
//! preference scores and usage pattern tables.
//!
//! Two independent learning paths live here:
//! - `apply_feedback`: ranking feedback (suggestion accepted/dismissed)
//!   nudges the six scoring weights, then renormalizes them to sum 1.
//! - `learn_from_behavior`: raw usage nudges a card's preference score and
//!   the location/time pattern tables.
//!
//! This is an online heuristic, not a trained model. Downstream scoring
//! relies on the weights summing to 1 and staying strictly positive.

use crate::context::EventContext;
use crate::preferences::PreferenceEntry;
use crate::storage::{Storage, load_json, save_json};
use crate::time::local_hour;
use crate::usage_log::UsageAction;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Storage key for the persisted model.
pub const MODEL_KEY: &str = "personalization_model";

/// Per-use bonus contributed by a location/time pattern table hit.
const PATTERN_BONUS_STEP: f64 = 0.05;
/// Cap on each pattern table's total bonus.
const PATTERN_BONUS_CAP: f64 = 0.2;
/// Flat bonus for an explicitly pinned card.
const PINNED_BONUS: f64 = 0.3;
/// Scale applied to the explicit priority when added as a bonus.
const PRIORITY_BONUS_SCALE: f64 = 0.2;

/// Tuning constants for weight adaptation. Heuristic values with no
/// documented derivation; kept configurable rather than hard-coded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptationConfig {
    /// Weight bump applied per present context feature on acceptance.
    pub adaptation_rate: f64,
    /// Fraction of the rate subtracted from every weight on rejection.
    pub rejection_penalty: f64,
    /// Floor per weight; no feature may be starved to zero.
    pub min_weight: f64,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            adaptation_rate: 0.1,
            rejection_penalty: 0.1,
            min_weight: 0.01,
        }
    }
}

/// The six scoring-feature weights. Invariant: non-negative and summing to 1
/// after every update (`normalize` is called by all mutation paths).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureWeights {
    pub frequency: f64,
    pub recency: f64,
    pub context_match: f64,
    pub user_preference: f64,
    pub time_of_day: f64,
    pub location: f64,
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self {
            frequency: 0.3,
            recency: 0.25,
            context_match: 0.2,
            user_preference: 0.15,
            time_of_day: 0.05,
            location: 0.05,
        }
    }
}

impl FeatureWeights {
    pub fn sum(&self) -> f64 {
        self.frequency
            + self.recency
            + self.context_match
            + self.user_preference
            + self.time_of_day
            + self.location
    }

    pub fn min(&self) -> f64 {
        [
            self.frequency,
            self.recency,
            self.context_match,
            self.user_preference,
            self.time_of_day,
            self.location,
        ]
        .into_iter()
        .fold(f64::INFINITY, f64::min)
    }

    fn for_each_mut(&mut self, mut f: impl FnMut(&mut f64)) {
        f(&mut self.frequency);
        f(&mut self.recency);
        f(&mut self.context_match);
        f(&mut self.user_preference);
        f(&mut self.time_of_day);
        f(&mut self.location);
    }

    /// Rescale so the weights sum to exactly 1.
    pub fn normalize(&mut self) {
        let total = self.sum();
        if total > 0.0 {
            self.for_each_mut(|w| *w /= total);
        } else {
            *self = Self::default();
        }
    }
}

/// Learned per-card preference, distinct from the explicit preference store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CardPreferenceScore {
    /// In [0, 1]; 0.5 for an unseen card.
    pub score: f64,
    pub interactions: u32,
}

impl Default for CardPreferenceScore {
    fn default() -> Self {
        Self {
            score: 0.5,
            interactions: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalizationModel {
    pub weights: FeatureWeights,
    pub card_preferences: HashMap<String, CardPreferenceScore>,
    /// location label -> card id -> touch count
    pub location_patterns: HashMap<String, HashMap<String, u32>>,
    /// hour of day (0-23) -> card id -> touch count
    pub time_patterns: HashMap<u32, HashMap<String, u32>>,
    /// Informational only; never used in scoring. Capped at 0.9.
    pub confidence: f64,
}

impl Default for PersonalizationModel {
    fn default() -> Self {
        Self {
            weights: FeatureWeights::default(),
            card_preferences: HashMap::new(),
            location_patterns: HashMap::new(),
            time_patterns: HashMap::new(),
            confidence: 0.5,
        }
    }
}

impl PersonalizationModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Learned preference score for a card; 0.5 when unseen.
    pub fn preference_score(&self, card_id: &str) -> f64 {
        self.card_preferences
            .get(card_id)
            .map(|p| p.score)
            .unwrap_or(0.5)
    }

    /// Single-card personalized score: the learned base score plus capped
    /// bonuses from the location/time pattern tables, plus the explicit
    /// pin/priority bonus. Capped at 1.0.
    ///
    /// This is the per-card lookup surface; full ranking goes through the
    /// scoring module, which uses the learned base score as its preference
    /// component.
    pub fn personalized_score(
        &self,
        card_id: &str,
        context: &EventContext,
        preference: Option<&PreferenceEntry>,
        tz: Tz,
    ) -> f64 {
        let mut score = self.preference_score(card_id);

        if let Some(location) = &context.location {
            let uses = self
                .location_patterns
                .get(location)
                .and_then(|cards| cards.get(card_id))
                .copied()
                .unwrap_or(0);
            score += (f64::from(uses) * PATTERN_BONUS_STEP).min(PATTERN_BONUS_CAP);
        }

        if let Some(time) = context.time {
            let hour = local_hour(time, tz);
            let uses = self
                .time_patterns
                .get(&hour)
                .and_then(|cards| cards.get(card_id))
                .copied()
                .unwrap_or(0);
            score += (f64::from(uses) * PATTERN_BONUS_STEP).min(PATTERN_BONUS_CAP);
        }

        if let Some(pref) = preference {
            if pref.pinned {
                score += PINNED_BONUS;
            }
            score += pref.priority * PRIORITY_BONUS_SCALE;
        }

        score.min(1.0)
    }

    /// Adapt the scoring weights from explicit ranking feedback.
    ///
    /// Acceptance bumps the weight of each context feature that was present
    /// when the suggestion was taken. Rejection shaves every weight by
    /// `rate * penalty`, floored at `min_weight`. Either way the weights are
    /// renormalized to sum 1 afterwards.
    pub fn apply_feedback(
        &mut self,
        was_selected: bool,
        context: &EventContext,
        config: &AdaptationConfig,
    ) {
        if was_selected {
            if context.time.is_some() {
                self.weights.time_of_day += config.adaptation_rate;
            }
            if context.location.is_some() {
                self.weights.location += config.adaptation_rate;
            }
            if context.transaction_type.is_some() {
                self.weights.context_match += config.adaptation_rate;
            }
        } else {
            let penalty = config.adaptation_rate * config.rejection_penalty;
            let floor = config.min_weight;
            self.weights.for_each_mut(|w| *w = (*w - penalty).max(floor));
        }

        self.weights.normalize();
        debug!(selected = was_selected, weights = ?self.weights, "adapted scoring weights");
    }

    /// Learn from a raw usage event (not just ranking feedback): adjust the
    /// card's preference score, increment the pattern tables, and nudge
    /// confidence.
    pub fn learn_from_behavior(
        &mut self,
        card_id: &str,
        action: UsageAction,
        context: &EventContext,
        tz: Tz,
    ) {
        let pref = self
            .card_preferences
            .entry(card_id.to_string())
            .or_default();
        pref.interactions += 1;

        match action {
            UsageAction::Selected => pref.score = (pref.score + 0.1).min(1.0),
            UsageAction::Rejected => pref.score = (pref.score - 0.05).max(0.0),
            UsageAction::Pinned => pref.score = 1.0,
            UsageAction::Viewed | UsageAction::PreferenceChange => {}
        }

        if let Some(location) = &context.location {
            *self
                .location_patterns
                .entry(location.clone())
                .or_default()
                .entry(card_id.to_string())
                .or_insert(0) += 1;
        }

        if let Some(time) = context.time {
            let hour = local_hour(time, tz);
            *self
                .time_patterns
                .entry(hour)
                .or_default()
                .entry(card_id.to_string())
                .or_insert(0) += 1;
        }

        self.confidence = (self.confidence + 0.01).min(0.9);
    }

    pub fn load(storage: &dyn Storage) -> Self {
        load_json(storage, MODEL_KEY).unwrap_or_default()
    }

    pub fn save(&self, storage: &mut dyn Storage) {
        save_json(storage, MODEL_KEY, self);
    }
}
