//! Structural metadata document: serialization of [`DatabaseStructure`]
//! to and from the archive's header.
//!
//! [`DatabaseStructure`]: crate::model::structure::DatabaseStructure

pub mod reader;
pub mod writer;

pub use reader::read_metadata;
pub use writer::write_metadata;
