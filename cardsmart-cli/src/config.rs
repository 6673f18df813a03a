use anyhow::{Context, Result};
use cardsmart_core::AdaptationConfig;
use cardsmart_store::ensure_cardsmart_home;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// IANA timezone used for hour-of-day bucketing.
    pub timezone: String,

    /// Usage log eviction cap.
    pub log_cap: usize,

    /// Descriptor string classified into a device type at startup.
    pub user_agent: String,

    pub location: LocationSection,
    pub adaptation: AdaptationSection,
}

/// Static location stand-in for the CLI. A desktop process has no
/// geolocation API; the configured fix plays that role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationSection {
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptationSection {
    pub rate: f64,
    pub rejection_penalty: f64,
    pub min_weight: f64,
}

impl Default for AdaptationSection {
    fn default() -> Self {
        let d = AdaptationConfig::default();
        Self {
            rate: d.adaptation_rate,
            rejection_penalty: d.rejection_penalty,
            min_weight: d.min_weight,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timezone: "America/Chicago".to_string(),
            log_cap: 1000,
            user_agent: "cardsmart-cli (desktop)".to_string(),
            location: LocationSection::default(),
            adaptation: AdaptationSection::default(),
        }
    }
}

impl Config {
    pub fn adaptation_config(&self) -> AdaptationConfig {
        AdaptationConfig {
            adaptation_rate: self.adaptation.rate,
            rejection_penalty: self.adaptation.rejection_penalty,
            min_weight: self.adaptation.min_weight,
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_cardsmart_home()?.join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    let p = config_path()?;
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    toml::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_adaptation() {
        let c = Config::default();
        let a = c.adaptation_config();
        assert_eq!(a.adaptation_rate, 0.1);
        assert_eq!(a.min_weight, 0.01);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let c: Config = toml::from_str("timezone = \"UTC\"").unwrap();
        assert_eq!(c.timezone, "UTC");
        assert_eq!(c.log_cap, 1000);
        assert!(c.location.name.is_none());
    }
}
