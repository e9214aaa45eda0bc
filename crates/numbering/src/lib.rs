//! PROACID numbering engine.
//!
//! Everything in this crate is synchronous and side-effect free: numbers are
//! classified, flat record collections are projected into a tree, and
//! candidate mutations are checked against that tree. No function here
//! returns an error or panics on malformed input; every outcome is a value.

pub mod classify;
pub mod tree;
pub mod validate;

pub use classify::{area_owner_of, category_owner_of, classify, classify_value, NumberKind};
pub use tree::{build, AreaNode, CategoryNode, HierarchicalSystem, IdNode, ProjectNode};
pub use validate::{check, check_delete, check_project, check_update};
