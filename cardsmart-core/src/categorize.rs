//! Transaction category inference from merchant/transaction descriptions.
//!
//! The single canonical keyword table. Earlier iterations of the dashboard
//! grew two slightly different copies of this heuristic; anything that needs
//! a spending category derives it here.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpendingCategory {
    Food,
    Groceries,
    Shopping,
    Travel,
    Transport,
    Entertainment,
    Bills,
    Subscriptions,
    Income,
    General,
}

impl SpendingCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpendingCategory::Food => "food",
            SpendingCategory::Groceries => "groceries",
            SpendingCategory::Shopping => "shopping",
            SpendingCategory::Travel => "travel",
            SpendingCategory::Transport => "transport",
            SpendingCategory::Entertainment => "entertainment",
            SpendingCategory::Bills => "bills",
            SpendingCategory::Subscriptions => "subscriptions",
            SpendingCategory::Income => "income",
            SpendingCategory::General => "general",
        }
    }
}

const KEYWORD_TABLE: &[(SpendingCategory, &[&str])] = &[
    (
        SpendingCategory::Groceries,
        &["grocery", "groceries", "supermarket", "market", "wholesale"],
    ),
    (
        SpendingCategory::Food,
        &[
            "restaurant", "cafe", "coffee", "dining", "doordash", "uber eats", "grubhub",
            "food", "pizza", "bakery",
        ],
    ),
    (
        SpendingCategory::Travel,
        &["airline", "flight", "hotel", "lodging", "airbnb", "travel"],
    ),
    (
        SpendingCategory::Transport,
        &["uber", "lyft", "taxi", "transit", "fuel", "gas station", "parking", "rail"],
    ),
    (
        SpendingCategory::Subscriptions,
        &[
            "netflix", "spotify", "hulu", "youtube", "subscription", "icloud", "prime",
        ],
    ),
    (
        SpendingCategory::Entertainment,
        &["cinema", "movie", "theater", "concert", "game", "entertainment"],
    ),
    (
        SpendingCategory::Bills,
        &[
            "electric", "utility", "utilities", "water bill", "internet", "phone bill",
            "insurance", "rent", "lease",
        ],
    ),
    (
        SpendingCategory::Income,
        &["payroll", "salary", "direct deposit", "stipend", "refund", "income"],
    ),
    (
        SpendingCategory::Shopping,
        &["amazon", "store", "mall", "retail", "shopping", "clothing"],
    ),
];

/// Infer a spending category from a description. First matching keyword
/// wins, in table order; no match falls through to `General`.
pub fn infer_category(description: &str) -> SpendingCategory {
    let desc = description.to_lowercase();
    for (category, keywords) in KEYWORD_TABLE {
        if keywords.iter().any(|kw| desc.contains(kw)) {
            return *category;
        }
    }
    SpendingCategory::General
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groceries_beats_food_for_supermarkets() {
        assert_eq!(
            infer_category("H-E-B SUPERMARKET #612"),
            SpendingCategory::Groceries
        );
    }

    #[test]
    fn test_dining() {
        assert_eq!(
            infer_category("Blue Bottle Coffee SF"),
            SpendingCategory::Food
        );
    }

    #[test]
    fn test_transport() {
        assert_eq!(infer_category("UBER *TRIP HELP.UBER.COM"), SpendingCategory::Transport);
    }

    #[test]
    fn test_subscriptions() {
        assert_eq!(infer_category("Netflix.com monthly"), SpendingCategory::Subscriptions);
    }

    #[test]
    fn test_income() {
        assert_eq!(infer_category("ACME CORP DIRECT DEPOSIT"), SpendingCategory::Income);
    }

    #[test]
    fn test_unknown_is_general() {
        assert_eq!(infer_category("XYZZY 42"), SpendingCategory::General);
    }
}
