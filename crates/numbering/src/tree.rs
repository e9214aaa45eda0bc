use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shared::domain::{FlatRecord, ItemKind, Meta};

use crate::classify::{area_owner_of, category_owner_of, classify};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdNode {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryNode {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
    pub ids: BTreeMap<String, IdNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AreaNode {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
    pub categories: BTreeMap<String, CategoryNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectNode {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
    pub areas: BTreeMap<String, AreaNode>,
}

/// Tree projection of one project's flat records.
///
/// Always rebuilt from scratch with [`build`]; nothing mutates an existing
/// instance, so it can be shared behind an `Arc` by any number of readers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HierarchicalSystem {
    pub projects: BTreeMap<String, ProjectNode>,
}

impl HierarchicalSystem {
    pub fn project(&self, project: &str) -> Option<&ProjectNode> {
        self.projects.get(project)
    }

    pub fn area(&self, project: &str, area: &str) -> Option<&AreaNode> {
        self.project(project)?.areas.get(area)
    }

    /// Looks a category up under its owning area.
    pub fn category(&self, project: &str, category: &str) -> Option<&CategoryNode> {
        self.area(project, &area_owner_of(category))?
            .categories
            .get(category)
    }

    /// Looks an ID up under its owning category.
    pub fn id(&self, project: &str, id: &str) -> Option<&IdNode> {
        self.category(project, &category_owner_of(id))?.ids.get(id)
    }

    /// True when an item of `kind` numbered `number` is present in `project`.
    pub fn contains(&self, project: &str, kind: ItemKind, number: &str) -> bool {
        match kind {
            ItemKind::Project => self.project(number).is_some(),
            ItemKind::Area => self.area(project, number).is_some(),
            ItemKind::Category => self.category(project, number).is_some(),
            ItemKind::Id => self.id(project, number).is_some(),
        }
    }

    pub fn id_count(&self) -> usize {
        self.projects
            .values()
            .flat_map(|p| p.areas.values())
            .flat_map(|a| a.categories.values())
            .map(|c| c.ids.len())
            .sum()
    }
}

/// Projects `records` into a tree rooted at `project_number`.
///
/// Runs one pass per level (areas, then categories, then IDs) so the input
/// order does not matter. Records whose owner is missing, or whose number
/// does not classify as their declared kind, are left out. Project records
/// are ignored: the root comes from the arguments.
pub fn build(
    project_number: &str,
    project_title: &str,
    records: &[FlatRecord],
) -> HierarchicalSystem {
    let mut project = ProjectNode {
        title: project_title.to_string(),
        meta: None,
        areas: BTreeMap::new(),
    };

    for record in records_of(records, ItemKind::Area) {
        project.areas.insert(
            record.number.clone(),
            AreaNode {
                title: record.title.clone(),
                meta: record.meta.clone(),
                categories: BTreeMap::new(),
            },
        );
    }

    for record in records_of(records, ItemKind::Category) {
        let Some(area) = project.areas.get_mut(&area_owner_of(&record.number)) else {
            continue;
        };
        area.categories.insert(
            record.number.clone(),
            CategoryNode {
                title: record.title.clone(),
                meta: record.meta.clone(),
                ids: BTreeMap::new(),
            },
        );
    }

    for record in records_of(records, ItemKind::Id) {
        let category_number = category_owner_of(&record.number);
        let Some(category) = project
            .areas
            .get_mut(&area_owner_of(&category_number))
            .and_then(|area| area.categories.get_mut(&category_number))
        else {
            continue;
        };
        category.ids.insert(
            record.number.clone(),
            IdNode {
                title: record.title.clone(),
                meta: record.meta.clone(),
            },
        );
    }

    let mut projects = BTreeMap::new();
    projects.insert(project_number.to_string(), project);
    HierarchicalSystem { projects }
}

fn records_of(records: &[FlatRecord], kind: ItemKind) -> impl Iterator<Item = &FlatRecord> {
    records
        .iter()
        .filter(move |record| record.kind == kind && classify(&record.number).matches(kind))
}

#[cfg(test)]
#[path = "tests/tree_tests.rs"]
mod tests;
