use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form metadata attached to any record or tree node.
pub type Meta = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Project,
    Area,
    Category,
    Id,
}

impl ItemKind {
    /// Lowercase noun used inside sentences ("the area already exists").
    pub fn noun(self) -> &'static str {
        match self {
            ItemKind::Project => "project",
            ItemKind::Area => "area",
            ItemKind::Category => "category",
            ItemKind::Id => "ID",
        }
    }

    /// Capitalized noun used at the start of sentences.
    pub fn title_noun(self) -> &'static str {
        match self {
            ItemKind::Project => "Project",
            ItemKind::Area => "Area",
            ItemKind::Category => "Category",
            ItemKind::Id => "ID",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Project => "project",
            ItemKind::Area => "area",
            ItemKind::Category => "category",
            ItemKind::Id => "id",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "project" => Some(ItemKind::Project),
            "area" => Some(ItemKind::Area),
            "category" => Some(ItemKind::Category),
            "id" => Some(ItemKind::Id),
            _ => None,
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tagged unit as persisted by the item store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatRecord {
    pub kind: ItemKind,
    pub number: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl FlatRecord {
    pub fn new(kind: ItemKind, number: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind,
            number: number.into(),
            title: title.into(),
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// A project database as advertised by the item store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatabaseHandle {
    pub project: String,
    pub title: String,
}

impl DatabaseHandle {
    pub fn new(project: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            title: title.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user: String,
}
