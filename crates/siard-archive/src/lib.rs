//! # siard-archive
//!
//! Streaming codec between relational database structures and SIARD-style
//! archive containers.
//!
//! This library provides the core functionality for exporting a relational
//! database (structure, metadata and row data) into a durable,
//! self-describing archive and reading it back, with support for:
//!
//! - **Normalized SQL types** with SQL:1999/SQL:2008 spelling fallback
//! - **Interchangeable containers**: folder tree, zip, or zip plus an
//!   external large-object tree
//! - **Streaming row codec** with per-table schema generation and a
//!   reversible cell escape transform
//! - **Large-object externalization** with folder count/size rotation
//! - **Per-file checksums** and an end-of-run file index
//!
//! ## Example
//!
//! ```rust,no_run
//! use siard_archive::{DatabaseSource, ExportOptions, ExportOrchestrator};
//!
//! fn export(source: &mut dyn DatabaseSource) -> siard_archive::Result<()> {
//!     let options = ExportOptions::load("export.yaml")?;
//!     let result = ExportOrchestrator::new(options)?.run(source)?;
//!     println!("Exported {} rows", result.rows_exported);
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod config;
pub mod content;
pub mod error;
pub mod lob;
pub mod metadata;
pub mod model;
pub mod orchestrator;
pub mod path;
pub mod read;
pub mod typemap;
pub mod write;

// Re-exports for convenient access
pub use config::{Compression, ExportOptions, ImportOptions};
pub use error::{ArchiveError, Result};
pub use lob::{LobPlacement, LobTracker};
pub use model::cell::{Cell, LobProvider, Row};
pub use model::structure::{
    ColumnStructure, DatabaseStructure, SchemaStructure, TableStructure,
};
pub use model::types::{NormalizedType, TypeDescriptor};
pub use orchestrator::{
    DatabaseSink, DatabaseSource, ExportOrchestrator, ExportResult, ImportOrchestrator,
    ImportResult,
};
pub use write::{ArchiveContainer, ContainerRole, WriteStrategy};
