//! In-memory data model: normalized types, database structure tree, cells.

pub mod cell;
pub mod structure;
pub mod types;
