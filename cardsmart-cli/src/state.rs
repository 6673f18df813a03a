//! Card list persistence for the CLI.
//!
//! This stands in for the out-of-scope card CRUD layer: the engine only
//! ever asks "what are the current cards", and here that answer comes from
//! `~/.cardsmart/cards.json`.

use anyhow::{Context, Result};
use cardsmart_core::Card;
use cardsmart_store::ensure_cardsmart_home;
use std::fs;
use std::path::{Path, PathBuf};

pub fn cards_path() -> Result<PathBuf> {
    Ok(ensure_cardsmart_home()?.join("cards.json"))
}

/// The live context fields that must survive between CLI invocations (the
/// dashboard held these in a long-lived session; the CLI has none).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct LiveContext {
    pub transaction_type: Option<String>,
    pub network_type: Option<String>,
}

pub fn context_path() -> Result<PathBuf> {
    Ok(ensure_cardsmart_home()?.join("context.json"))
}

pub fn read_live_context(path: &Path) -> Result<LiveContext> {
    if !path.exists() {
        return Ok(LiveContext::default());
    }
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(serde_json::from_str(&s)?)
}

pub fn write_live_context(path: &Path, ctx: &LiveContext) -> Result<()> {
    let json = serde_json::to_string_pretty(ctx)?;
    fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub fn read_cards(path: &Path) -> Result<Vec<Card>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(serde_json::from_str(&s)?)
}

pub fn write_cards(path: &Path, cards: &[Card]) -> Result<()> {
    let json = serde_json::to_string_pretty(cards)?;
    fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
