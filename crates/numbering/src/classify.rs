use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::domain::ItemKind;

static PROJECT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{3}$").expect("valid project regex"));
static AREA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d)0-(\d)9$").expect("valid area regex"));
static CATEGORY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2}$").expect("valid category regex"));
static ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{2})\.\d{2}$").expect("valid id regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberKind {
    Project,
    Area,
    Category,
    Id,
    Invalid,
}

impl NumberKind {
    pub fn item_kind(self) -> Option<ItemKind> {
        match self {
            NumberKind::Project => Some(ItemKind::Project),
            NumberKind::Area => Some(ItemKind::Area),
            NumberKind::Category => Some(ItemKind::Category),
            NumberKind::Id => Some(ItemKind::Id),
            NumberKind::Invalid => None,
        }
    }

    pub fn matches(self, kind: ItemKind) -> bool {
        self.item_kind() == Some(kind)
    }
}

pub fn classify(input: &str) -> NumberKind {
    // `\d` is Unicode-aware in `regex`; canonical numbers are ASCII only.
    if !input.is_ascii() {
        return NumberKind::Invalid;
    }
    if PROJECT_RE.is_match(input) {
        return NumberKind::Project;
    }
    if let Some(caps) = AREA_RE.captures(input) {
        return if caps[1] == caps[2] {
            NumberKind::Area
        } else {
            NumberKind::Invalid
        };
    }
    if CATEGORY_RE.is_match(input) {
        return NumberKind::Category;
    }
    if ID_RE.is_match(input) {
        return NumberKind::Id;
    }
    NumberKind::Invalid
}

/// Classifies an untyped value; anything that is not a JSON string is invalid.
pub fn classify_value(input: &Value) -> NumberKind {
    match input {
        Value::String(raw) => classify(raw),
        _ => NumberKind::Invalid,
    }
}

/// Returns the area owning `category` ("45" -> "40-49").
///
/// Only meaningful for valid category numbers; other input yields a
/// best-effort string.
pub fn area_owner_of(category: &str) -> String {
    let decade = category.chars().next().unwrap_or('0');
    format!("{decade}0-{decade}9")
}

/// Returns the category owning `id` ("23.07" -> "23").
///
/// Only meaningful for valid ID numbers.
pub fn category_owner_of(id: &str) -> String {
    id.split('.').next().unwrap_or_default().to_string()
}

#[cfg(test)]
#[path = "tests/classify_tests.rs"]
mod tests;
