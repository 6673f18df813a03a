//! Card model as seen by the ranking engine.
//!
//! The surrounding application owns the real card records (numbers, limits,
//! balances). The engine only needs a stable id plus display metadata, and
//! never mutates a card.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub name: String,

    /// Issuer-facing card kind, e.g. "Credit" or "Debit".
    pub kind: String,

    /// Free-form category label, e.g. "travel", "everyday".
    pub category: String,
}

impl Card {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: "Credit".to_string(),
            category: "general".to_string(),
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }
}
