//! Option structs for export and import runs.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How the main archive container is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Zip container, deflate-compressed entries.
    #[default]
    Deflate,
    /// Zip container, stored entries.
    Store,
    /// Plain folder tree, no container.
    None,
}

/// Everything one export run consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportOptions {
    /// Output root: the zip file path, or the folder root when
    /// `compression` is `none`.
    pub output: PathBuf,

    #[serde(default)]
    pub compression: Compression,

    /// Root of the external LOB tree. When set, LOB payloads leave the
    /// main container and the zip holds only structural files.
    #[serde(default)]
    pub lob_root: Option<PathBuf>,

    /// Maximum number of objects per LOB folder.
    #[serde(default = "default_lobs_per_folder")]
    pub lobs_per_folder: u32,

    /// Maximum cumulative bytes per LOB folder.
    #[serde(default = "default_lob_folder_size")]
    pub lob_folder_size: u64,

    /// Binary payloads up to this size are inlined as hex.
    #[serde(default = "default_blob_inline_threshold")]
    pub blob_inline_threshold: u64,

    /// Character large objects up to this size are inlined.
    #[serde(default = "default_clob_inline_threshold")]
    pub clob_inline_threshold: u64,

    /// Indent the archive documents for human inspection.
    #[serde(default = "default_true")]
    pub pretty_xml: bool,

    /// Require a primary key on every table (the DK variant mandates it).
    #[serde(default)]
    pub require_primary_keys: bool,
}

/// Everything one import run consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Archive to read: a zip file or a folder root.
    pub input: PathBuf,

    /// Root of the external LOB tree, when the archive was exported with
    /// one.
    #[serde(default)]
    pub lob_root: Option<PathBuf>,

    /// Recompute file digests against the file index after reading.
    #[serde(default = "default_true")]
    pub verify_checksums: bool,
}

pub(crate) fn default_lobs_per_folder() -> u32 {
    10_000
}

pub(crate) fn default_lob_folder_size() -> u64 {
    1024 * 1024 * 1024
}

pub(crate) fn default_blob_inline_threshold() -> u64 {
    2000
}

pub(crate) fn default_clob_inline_threshold() -> u64 {
    4000
}

pub(crate) fn default_true() -> bool {
    true
}
