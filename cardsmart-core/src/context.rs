//! Context snapshot provider — the environmental signal bundle behind
//! context-aware ranking.
//!
//! One live snapshot per provider. The time field is refreshed by `tick`,
//! the location by an explicit `capture_location`, and the transaction type
//! by the app when it enters a payment flow. Every logged usage event
//! freezes a copy of the snapshot; history is never kept here.

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Sources must give up within this bound rather than block a caller.
pub const LOCATION_TIMEOUT_SECS: u64 = 5;

/// A fix younger than this is reused instead of hitting the source again.
pub const LOCATION_CACHE_WINDOW_SECS: i64 = 300;

pub const UNKNOWN_LOCATION: &str = "Unknown Location";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Desktop,
    Ios,
    Android,
}

/// A geolocation fix. Coordinates are absent on the fallback fix, which
/// carries only the sentinel name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoFix {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub name: String,
    pub accuracy: Option<f64>,
}

impl GeoFix {
    pub fn new(latitude: f64, longitude: f64, name: impl Into<String>) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            name: name.into(),
            accuracy: None,
        }
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    /// Fallback fix used when the source fails or is unavailable.
    pub fn unknown() -> Self {
        Self {
            latitude: None,
            longitude: None,
            name: UNKNOWN_LOCATION.to_string(),
            accuracy: None,
        }
    }
}

/// The live environmental signal bundle. Immutable per tick from the
/// scoring engine's point of view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub location: Option<GeoFix>,
    pub time: DateTime<Utc>,
    pub transaction_type: Option<String>,
    pub device_type: DeviceType,
    pub network_type: Option<String>,
}

/// Point-in-time copy of the snapshot frozen into a usage event or passed
/// with ranking feedback. All fields optional: feedback callers may supply
/// only the signals that were actually present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventContext {
    pub time: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub transaction_type: Option<String>,
    pub device_type: Option<DeviceType>,
    pub network_type: Option<String>,
}

impl EventContext {
    pub fn with_location(mut self, name: impl Into<String>) -> Self {
        self.location = Some(name.into());
        self
    }

    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_transaction_type(mut self, t: impl Into<String>) -> Self {
        self.transaction_type = Some(t.into());
        self
    }

    /// Merge caller-supplied overrides over this context. Present fields in
    /// `overrides` win.
    pub fn merged(mut self, overrides: EventContext) -> Self {
        if overrides.time.is_some() {
            self.time = overrides.time;
        }
        if overrides.location.is_some() {
            self.location = overrides.location;
        }
        if overrides.transaction_type.is_some() {
            self.transaction_type = overrides.transaction_type;
        }
        if overrides.device_type.is_some() {
            self.device_type = overrides.device_type;
        }
        if overrides.network_type.is_some() {
            self.network_type = overrides.network_type;
        }
        self
    }
}

impl From<&ContextSnapshot> for EventContext {
    fn from(s: &ContextSnapshot) -> Self {
        Self {
            time: Some(s.time),
            location: s.location.as_ref().map(|f| f.name.clone()),
            transaction_type: s.transaction_type.clone(),
            device_type: Some(s.device_type),
            network_type: s.network_type.clone(),
        }
    }
}

fn mobile_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)Android|webOS|iPhone|iPad|iPod|BlackBerry|IEMobile|Opera Mini")
            .expect("device regex is valid")
    })
}

fn apple_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"iPad|iPhone|iPod").expect("device regex is valid"))
}

/// Classify a user-agent-like descriptor string. Pure and side-effect-free;
/// anything unrecognized is desktop.
pub fn detect_device_type(user_agent: &str) -> DeviceType {
    if mobile_re().is_match(user_agent) {
        if apple_re().is_match(user_agent) {
            DeviceType::Ios
        } else {
            DeviceType::Android
        }
    } else {
        DeviceType::Desktop
    }
}

/// Capability seam for geolocation reads.
///
/// Implementations must enforce [`LOCATION_TIMEOUT_SECS`] themselves and
/// return an error on expiry or permission denial; the provider turns any
/// error into the sentinel fix rather than surfacing it.
pub trait LocationSource {
    fn current_fix(&mut self) -> anyhow::Result<GeoFix>;
}

/// Owns the live snapshot and the cached location fix.
#[derive(Debug, Clone)]
pub struct ContextProvider {
    snapshot: ContextSnapshot,
    cached_fix: Option<(GeoFix, DateTime<Utc>)>,
    revision: u64,
}

impl ContextProvider {
    pub fn new(device_type: DeviceType, now: DateTime<Utc>) -> Self {
        Self {
            snapshot: ContextSnapshot {
                location: None,
                time: now,
                transaction_type: None,
                device_type,
                network_type: None,
            },
            cached_fix: None,
            revision: 0,
        }
    }

    /// Construct with the device type classified from a descriptor string.
    pub fn from_user_agent(user_agent: &str, now: DateTime<Utc>) -> Self {
        Self::new(detect_device_type(user_agent), now)
    }

    pub fn snapshot(&self) -> &ContextSnapshot {
        &self.snapshot
    }

    /// Freeze the live snapshot into an event-context copy.
    pub fn event_context(&self) -> EventContext {
        EventContext::from(&self.snapshot)
    }

    /// Counter bumped on every meaningful context change (location,
    /// transaction type, network). The periodic time tick does not bump it,
    /// so reactive wrappers can debounce recomputation on this value.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Refresh the time field. The only periodic behavior in the subsystem.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        self.snapshot.time = now;
    }

    pub fn set_transaction_context(&mut self, transaction_type: Option<String>) {
        if self.snapshot.transaction_type != transaction_type {
            self.snapshot.transaction_type = transaction_type;
            self.revision += 1;
        }
    }

    pub fn set_network_type(&mut self, network_type: Option<String>) {
        if self.snapshot.network_type != network_type {
            self.snapshot.network_type = network_type;
            self.revision += 1;
        }
    }

    /// Read a location fix, reusing a cached one inside the cache window.
    /// Source failure falls back to the sentinel fix; never an error.
    pub fn capture_location(&mut self, source: &mut dyn LocationSource, now: DateTime<Utc>) {
        if let Some((fix, at)) = &self.cached_fix {
            if now - *at < Duration::seconds(LOCATION_CACHE_WINDOW_SECS) {
                let fix = fix.clone();
                self.apply_fix(fix);
                return;
            }
        }

        let fix = match source.current_fix() {
            Ok(fix) => {
                self.cached_fix = Some((fix.clone(), now));
                fix
            }
            Err(e) => {
                tracing::warn!(error = %e, "location capture failed; using fallback");
                GeoFix::unknown()
            }
        };
        self.apply_fix(fix);
    }

    fn apply_fix(&mut self, fix: GeoFix) {
        let changed = self
            .snapshot
            .location
            .as_ref()
            .map(|cur| cur.name != fix.name)
            .unwrap_or(true);
        self.snapshot.location = Some(fix);
        if changed {
            self.revision += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct FixedSource(GeoFix);
    impl LocationSource for FixedSource {
        fn current_fix(&mut self) -> anyhow::Result<GeoFix> {
            Ok(self.0.clone())
        }
    }

    struct FailingSource;
    impl LocationSource for FailingSource {
        fn current_fix(&mut self) -> anyhow::Result<GeoFix> {
            anyhow::bail!("permission denied")
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_detect_device_type() {
        assert_eq!(
            detect_device_type("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X)"),
            DeviceType::Ios
        );
        assert_eq!(
            detect_device_type("Mozilla/5.0 (Linux; Android 14; Pixel 8)"),
            DeviceType::Android
        );
        assert_eq!(
            detect_device_type("Mozilla/5.0 (X11; Linux x86_64)"),
            DeviceType::Desktop
        );
    }

    #[test]
    fn tick_does_not_bump_revision() {
        let mut p = ContextProvider::new(DeviceType::Desktop, t0());
        let r = p.revision();
        p.tick(t0() + Duration::seconds(60));
        assert_eq!(p.revision(), r);
        assert_eq!(p.snapshot().time, t0() + Duration::seconds(60));
    }

    #[test]
    fn location_failure_falls_back_to_sentinel() {
        let mut p = ContextProvider::new(DeviceType::Desktop, t0());
        p.capture_location(&mut FailingSource, t0());
        let loc = p.snapshot().location.clone().unwrap();
        assert_eq!(loc.name, UNKNOWN_LOCATION);
        assert_eq!(loc.latitude, None);
    }

    #[test]
    fn cached_fix_is_reused_inside_window() {
        let mut p = ContextProvider::new(DeviceType::Desktop, t0());
        p.capture_location(&mut FixedSource(GeoFix::new(30.0, -97.0, "Home")), t0());

        // A failing source inside the window still yields the cached fix.
        p.capture_location(&mut FailingSource, t0() + Duration::seconds(60));
        assert_eq!(p.snapshot().location.as_ref().unwrap().name, "Home");

        // Past the window the failing source wins.
        p.capture_location(&mut FailingSource, t0() + Duration::seconds(400));
        assert_eq!(
            p.snapshot().location.as_ref().unwrap().name,
            UNKNOWN_LOCATION
        );
    }

    #[test]
    fn transaction_context_bumps_revision_once_per_change() {
        let mut p = ContextProvider::new(DeviceType::Desktop, t0());
        let r = p.revision();
        p.set_transaction_context(Some("groceries".to_string()));
        assert_eq!(p.revision(), r + 1);
        // Same value again is a no-op.
        p.set_transaction_context(Some("groceries".to_string()));
        assert_eq!(p.revision(), r + 1);
    }

    #[test]
    fn event_context_freezes_snapshot_fields() {
        let mut p = ContextProvider::new(DeviceType::Ios, t0());
        p.set_transaction_context(Some("dining".to_string()));
        p.capture_location(&mut FixedSource(GeoFix::new(30.0, -97.0, "Home")), t0());

        let ctx = p.event_context();
        assert_eq!(ctx.time, Some(t0()));
        assert_eq!(ctx.location.as_deref(), Some("Home"));
        assert_eq!(ctx.transaction_type.as_deref(), Some("dining"));
        assert_eq!(ctx.device_type, Some(DeviceType::Ios));
    }

    #[test]
    fn merged_overrides_win() {
        let base = EventContext::default()
            .with_location("Home")
            .with_transaction_type("dining");
        let merged = base.merged(EventContext::default().with_location("Office"));
        assert_eq!(merged.location.as_deref(), Some("Office"));
        assert_eq!(merged.transaction_type.as_deref(), Some("dining"));
    }
}
