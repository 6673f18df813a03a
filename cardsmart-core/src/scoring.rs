//! Scoring engine — weighted multi-factor card ranking with declutter
//! bucketing.
//!
//! Pure functions over plain inputs: a card set, the usage log, the live
//! context snapshot, and the personalization model. Deterministic given
//! identical inputs; ties keep input order.
//!
//! Per-card score = weighted sum of six component scores, each in [0, 1],
//! with the weights drawn from the model (sum 1), so the total stays in
//! [0, 1].

use crate::card::Card;
use crate::context::ContextSnapshot;
use crate::model::PersonalizationModel;
use crate::time::local_hour;
use crate::usage_log::{UsageEvent, UsageLog};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Declutter thresholds. Fixed by design, not configurable.
pub const PRIMARY_THRESHOLD: f64 = 0.7;
pub const SECONDARY_THRESHOLD: f64 = 0.3;

/// Linear recency decay window in days.
const RECENCY_WINDOW_DAYS: f64 = 30.0;

/// Usage count at which the frequency component saturates.
const FREQUENCY_SATURATION: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub frequency: f64,
    pub recency: f64,
    pub context: f64,
    pub preference: f64,
    pub time_of_day: f64,
    pub location: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCard {
    pub card: Card,
    pub score: f64,
    pub components: ScoreComponents,
}

/// Ranked output: the full ordering plus the three declutter tiers.
/// Transient; recomputed on every input change and never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankedCards {
    pub all: Vec<ScoredCard>,
    pub primary: Vec<ScoredCard>,
    pub secondary: Vec<ScoredCard>,
    pub hidden: Vec<ScoredCard>,
}

/// How often the card was touched, saturating at 100 events.
pub fn frequency_score(usage_count: usize) -> f64 {
    (usage_count as f64 / FREQUENCY_SATURATION).min(1.0)
}

/// Linear decay from 1 (used now) to 0 (30+ days ago); 0 if never used.
pub fn recency_score(last_used: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(last) = last_used else {
        return 0.0;
    };
    let days = (now - last).num_milliseconds() as f64 / 86_400_000.0;
    (1.0 - days / RECENCY_WINDOW_DAYS).max(0.0)
}

/// Blend of same-hour, same-location, and same-transaction-type usage
/// ratios against the live context, each over the card's own events.
/// Components whose context field is absent contribute nothing.
pub fn context_match_score(
    card_events: &[&UsageEvent],
    context: &ContextSnapshot,
    tz: Tz,
) -> f64 {
    let total = card_events.len().max(1) as f64;
    let mut score = 0.0;

    let current_hour = local_hour(context.time, tz);
    let same_hour = card_events
        .iter()
        .filter(|e| local_hour(e.timestamp, tz) == current_hour)
        .count();
    score += (same_hour as f64 / total) * 0.3;

    if let Some(fix) = &context.location {
        let same_location = card_events
            .iter()
            .filter(|e| e.context.location.as_deref() == Some(fix.name.as_str()))
            .count();
        score += (same_location as f64 / total) * 0.4;
    }

    if let Some(txn) = &context.transaction_type {
        let same_type = card_events
            .iter()
            .filter(|e| e.context.transaction_type.as_deref() == Some(txn.as_str()))
            .count();
        score += (same_type as f64 / total) * 0.3;
    }

    score.min(1.0)
}

/// Smooth day-cycle prior, independent of usage history.
pub fn time_of_day_score(hour: u32) -> f64 {
    (hour as f64 / 24.0 * 2.0 * PI).sin() * 0.5 + 0.5
}

/// Share of the card's own events at the current location label; 0.5 when
/// there is no current location to compare against.
pub fn location_score(card_events: &[&UsageEvent], current_location: Option<&str>) -> f64 {
    let Some(location) = current_location else {
        return 0.5;
    };
    let matches = card_events
        .iter()
        .filter(|e| e.context.location.as_deref() == Some(location))
        .count();
    matches as f64 / card_events.len().max(1) as f64
}

fn score_card(
    card: &Card,
    log: &UsageLog,
    model: &PersonalizationModel,
    context: &ContextSnapshot,
    tz: Tz,
    now: DateTime<Utc>,
) -> ScoredCard {
    let card_events: Vec<&UsageEvent> =
        log.events().filter(|e| e.card_id == card.id).collect();

    let last_used = card_events.iter().map(|e| e.timestamp).max();
    let current_location = context.location.as_ref().map(|f| f.name.as_str());

    let components = ScoreComponents {
        frequency: frequency_score(card_events.len()),
        recency: recency_score(last_used, now),
        context: context_match_score(&card_events, context, tz),
        preference: model.preference_score(&card.id),
        time_of_day: time_of_day_score(local_hour(context.time, tz)),
        location: location_score(&card_events, current_location),
    };

    let w = &model.weights;
    let score = components.frequency * w.frequency
        + components.recency * w.recency
        + components.context * w.context_match
        + components.preference * w.user_preference
        + components.time_of_day * w.time_of_day
        + components.location * w.location;

    ScoredCard {
        card: card.clone(),
        score,
        components,
    }
}

/// Partition an already-sorted scoring into the three declutter tiers.
pub fn apply_declutter(sorted: Vec<ScoredCard>) -> RankedCards {
    let mut ranked = RankedCards {
        all: sorted,
        ..RankedCards::default()
    };

    for card in &ranked.all {
        if card.score > PRIMARY_THRESHOLD {
            ranked.primary.push(card.clone());
        } else if card.score > SECONDARY_THRESHOLD {
            ranked.secondary.push(card.clone());
        } else {
            ranked.hidden.push(card.clone());
        }
    }

    ranked
}

/// Score, sort, and bucket the card set. Stable descending sort: equal
/// scores keep their input order. An empty card set yields empty buckets.
pub fn rank(
    cards: &[Card],
    log: &UsageLog,
    model: &PersonalizationModel,
    context: &ContextSnapshot,
    tz: Tz,
    now: DateTime<Utc>,
) -> RankedCards {
    if cards.is_empty() {
        return RankedCards::default();
    }

    let mut scored: Vec<ScoredCard> = cards
        .iter()
        .map(|c| score_card(c, log, model, context, tz, now))
        .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score));

    apply_declutter(scored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextSnapshot, DeviceType, EventContext, GeoFix};
    use crate::usage_log::UsageAction;
    use chrono::{Duration, TimeZone};

    fn tz() -> Tz {
        "America/Chicago".parse().unwrap()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 15, 0, 0).unwrap()
    }

    fn snapshot_at(now: DateTime<Utc>, location: Option<&str>) -> ContextSnapshot {
        ContextSnapshot {
            location: location.map(|n| GeoFix::new(30.0, -97.0, n)),
            time: now,
            transaction_type: None,
            device_type: DeviceType::Desktop,
            network_type: None,
        }
    }

    fn log_with_home_usage(card_id: &str, n: usize, at: DateTime<Utc>) -> UsageLog {
        let mut log = UsageLog::new();
        for _ in 0..n {
            log.append(
                card_id,
                UsageAction::Selected,
                EventContext::default().with_location("Home").with_time(at),
                at,
            );
        }
        log
    }

    #[test]
    fn empty_card_set_yields_empty_buckets() {
        let ranked = rank(
            &[],
            &UsageLog::new(),
            &PersonalizationModel::new(),
            &snapshot_at(t0(), None),
            tz(),
            t0(),
        );
        assert!(ranked.all.is_empty());
        assert!(ranked.primary.is_empty());
        assert!(ranked.secondary.is_empty());
        assert!(ranked.hidden.is_empty());
    }

    #[test]
    fn scores_are_bounded() {
        let cards = vec![Card::new("a", "A"), Card::new("b", "B")];
        let log = log_with_home_usage("a", 200, t0());
        let ranked = rank(
            &cards,
            &log,
            &PersonalizationModel::new(),
            &snapshot_at(t0(), Some("Home")),
            tz(),
            t0(),
        );
        for sc in &ranked.all {
            assert!((0.0..=1.0).contains(&sc.score), "score {}", sc.score);
        }
    }

    #[test]
    fn recency_boundaries() {
        let now = t0();
        assert_eq!(recency_score(Some(now), now), 1.0);
        assert_eq!(recency_score(Some(now - Duration::days(30)), now), 0.0);
        assert_eq!(recency_score(None, now), 0.0);
        let half = recency_score(Some(now - Duration::days(15)), now);
        assert!((half - 0.5).abs() < 1e-9);
    }

    #[test]
    fn frequency_saturates_at_hundred() {
        assert_eq!(frequency_score(0), 0.0);
        assert!((frequency_score(50) - 0.5).abs() < 1e-9);
        assert_eq!(frequency_score(100), 1.0);
        assert_eq!(frequency_score(1000), 1.0);
    }

    #[test]
    fn time_of_day_is_a_bounded_prior() {
        for hour in 0..24 {
            let s = time_of_day_score(hour);
            assert!((0.0..=1.0).contains(&s));
        }
        assert!((time_of_day_score(6) - 1.0).abs() < 1e-9);
        assert!((time_of_day_score(0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn location_score_defaults_without_current_location() {
        assert_eq!(location_score(&[], None), 0.5);
        assert_eq!(location_score(&[], Some("Home")), 0.0);
    }

    #[test]
    fn used_card_outranks_unused_card_at_its_location() {
        let cards = vec![Card::new("b", "B"), Card::new("a", "A")];
        let log = log_with_home_usage("a", 10, t0());
        let ranked = rank(
            &cards,
            &log,
            &PersonalizationModel::new(),
            &snapshot_at(t0(), Some("Home")),
            tz(),
            t0(),
        );

        assert_eq!(ranked.all[0].card.id, "a");
        assert!(ranked.all[0].score > ranked.all[1].score);
    }

    #[test]
    fn buckets_partition_all_exactly() {
        let mut model = PersonalizationModel::new();
        // Drive card scores apart through learned preferences.
        for _ in 0..10 {
            model.learn_from_behavior(
                "hot",
                UsageAction::Selected,
                &EventContext::default().with_location("Home").with_time(t0()),
                tz(),
            );
        }
        for _ in 0..20 {
            model.learn_from_behavior(
                "cold",
                UsageAction::Rejected,
                &EventContext::default(),
                tz(),
            );
        }

        let cards = vec![Card::new("hot", "Hot"), Card::new("mid", "Mid"), Card::new("cold", "Cold")];
        let log = log_with_home_usage("hot", 90, t0());
        let ranked = rank(
            &cards,
            &log,
            &model,
            &snapshot_at(t0(), Some("Home")),
            tz(),
            t0(),
        );

        let partitioned = ranked.primary.len() + ranked.secondary.len() + ranked.hidden.len();
        assert_eq!(partitioned, ranked.all.len());
        for sc in &ranked.primary {
            assert!(sc.score > PRIMARY_THRESHOLD);
        }
        for sc in &ranked.secondary {
            assert!(sc.score > SECONDARY_THRESHOLD && sc.score <= PRIMARY_THRESHOLD);
        }
        for sc in &ranked.hidden {
            assert!(sc.score <= SECONDARY_THRESHOLD);
        }
    }

    #[test]
    fn ranking_is_deterministic_with_stable_ties() {
        // Two cards with zero history score identically; input order holds.
        let cards = vec![Card::new("first", "F"), Card::new("second", "S")];
        let ctx = snapshot_at(t0(), None);
        let model = PersonalizationModel::new();
        let log = UsageLog::new();

        let r1 = rank(&cards, &log, &model, &ctx, tz(), t0());
        let r2 = rank(&cards, &log, &model, &ctx, tz(), t0());
        assert_eq!(r1, r2);
        assert_eq!(r1.all[0].card.id, "first");
        assert_eq!(r1.all[1].card.id, "second");
    }

    #[test]
    fn declutter_threshold_edges() {
        let mk = |id: &str, score: f64| ScoredCard {
            card: Card::new(id, id),
            score,
            components: ScoreComponents {
                frequency: 0.0,
                recency: 0.0,
                context: 0.0,
                preference: 0.0,
                time_of_day: 0.0,
                location: 0.0,
            },
        };
        // Exactly 0.7 is secondary, exactly 0.3 is hidden.
        let ranked = apply_declutter(vec![
            mk("p", 0.71),
            mk("s-hi", 0.7),
            mk("s-lo", 0.31),
            mk("h-hi", 0.3),
            mk("h-lo", 0.0),
        ]);
        assert_eq!(ranked.primary.len(), 1);
        assert_eq!(ranked.secondary.len(), 2);
        assert_eq!(ranked.hidden.len(), 2);
    }
}
