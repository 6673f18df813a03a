//! cardsmart-core: contextual card ranking and adaptive learning.
//!
//! The engine consumes a card list, a usage event log, and a context
//! snapshot, and produces a ranked, bucketed card list. Everything else —
//! card CRUD, auth, rendering — lives outside and talks to this crate
//! through plain data.

pub mod card;
pub mod categorize;
pub mod context;
pub mod engine;
pub mod model;
pub mod preferences;
pub mod scoring;
pub mod storage;
pub mod time;
pub mod usage_log;

pub use card::Card;
pub use categorize::{SpendingCategory, infer_category};
pub use context::{
    ContextProvider, ContextSnapshot, DeviceType, EventContext, GeoFix, LocationSource,
    detect_device_type,
};
pub use engine::{CardRankingEngine, EngineConfig, LearningExport};
pub use model::{AdaptationConfig, CardPreferenceScore, FeatureWeights, PersonalizationModel};
pub use preferences::{PreferenceEntry, PreferencePatch, PreferenceStore};
pub use scoring::{RankedCards, ScoreComponents, ScoredCard, rank};
pub use storage::{MemoryStorage, Storage};
pub use usage_log::{UsageAction, UsageEvent, UsageLog, UsagePatterns};
