use shared::{
    domain::{FlatRecord, ItemKind},
    protocol::CheckOutcome,
};

use crate::{
    classify::{area_owner_of, category_owner_of, classify},
    tree::HierarchicalSystem,
};

/// Decides whether inserting `candidate` into `project` is admissible.
///
/// Checks run in a fixed order and the first failure wins: number shape,
/// title, parent presence, duplicate.
pub fn check(
    system: &HierarchicalSystem,
    project: &str,
    candidate: &FlatRecord,
) -> CheckOutcome {
    let kind = candidate.kind;
    if let Some(rejection) = shape_and_title(candidate) {
        return rejection;
    }

    match kind {
        ItemKind::Category => {
            if system.area(project, &area_owner_of(&candidate.number)).is_none() {
                return CheckOutcome::rejected("Parent area does not exist for this category.");
            }
        }
        ItemKind::Id => {
            if system
                .category(project, &category_owner_of(&candidate.number))
                .is_none()
            {
                return CheckOutcome::rejected("Parent category does not exist for this ID.");
            }
        }
        ItemKind::Project | ItemKind::Area => {}
    }

    if system.contains(project, kind, &candidate.number) {
        return CheckOutcome::rejected(format!("The {} already exists.", kind.noun()));
    }

    CheckOutcome::ok()
}

/// Checks a new project against the databases the store already lists.
pub fn check_project<'a>(
    known_projects: impl IntoIterator<Item = &'a str>,
    candidate: &FlatRecord,
) -> CheckOutcome {
    if candidate.kind != ItemKind::Project {
        return invalid_number(candidate.kind);
    }
    if let Some(rejection) = shape_and_title(candidate) {
        return rejection;
    }
    if known_projects
        .into_iter()
        .any(|known| known == candidate.number)
    {
        return CheckOutcome::rejected("The project already exists.");
    }
    CheckOutcome::ok()
}

/// Checks a title/meta change. The item must already exist at its level.
pub fn check_update(
    system: &HierarchicalSystem,
    project: &str,
    candidate: &FlatRecord,
) -> CheckOutcome {
    if let Some(rejection) = shape_and_title(candidate) {
        return rejection;
    }
    if !system.contains(project, candidate.kind, &candidate.number) {
        return missing(candidate.kind);
    }
    CheckOutcome::ok()
}

/// Checks a removal. The item must exist and must not own any children.
pub fn check_delete(
    system: &HierarchicalSystem,
    project: &str,
    kind: ItemKind,
    number: &str,
) -> CheckOutcome {
    if !classify(number).matches(kind) {
        return invalid_number(kind);
    }
    if !system.contains(project, kind, number) {
        return missing(kind);
    }

    let has_children = match kind {
        ItemKind::Project => system
            .project(number)
            .is_some_and(|node| !node.areas.is_empty()),
        ItemKind::Area => system
            .area(project, number)
            .is_some_and(|node| !node.categories.is_empty()),
        ItemKind::Category => system
            .category(project, number)
            .is_some_and(|node| !node.ids.is_empty()),
        ItemKind::Id => false,
    };
    if has_children {
        return CheckOutcome::rejected(format!("The {} still has children.", kind.noun()));
    }

    CheckOutcome::ok()
}

fn shape_and_title(candidate: &FlatRecord) -> Option<CheckOutcome> {
    if !classify(&candidate.number).matches(candidate.kind) {
        return Some(invalid_number(candidate.kind));
    }
    if candidate.title.is_empty() {
        return Some(CheckOutcome::rejected(format!(
            "{} must have a title.",
            candidate.kind.title_noun()
        )));
    }
    None
}

fn invalid_number(kind: ItemKind) -> CheckOutcome {
    CheckOutcome::rejected(format!("Invalid {} number.", kind.noun()))
}

fn missing(kind: ItemKind) -> CheckOutcome {
    CheckOutcome::rejected(format!("The {} does not exist.", kind.noun()))
}

#[cfg(test)]
#[path = "tests/validate_tests.rs"]
mod tests;
