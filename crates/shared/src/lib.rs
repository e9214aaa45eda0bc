//! Types shared by the numbering engine, the local store and the client core.

pub mod domain;
pub mod error;
pub mod protocol;
