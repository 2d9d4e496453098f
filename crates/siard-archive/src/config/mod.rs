//! Run configuration: YAML-loadable option structs plus validation.

mod types;
mod validation;

pub use types::{Compression, ExportOptions, ImportOptions};
pub use validation::{validate_export, validate_import};

use std::path::Path;

use crate::error::{ArchiveError, Result};

impl ExportOptions {
    /// Load and validate options from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ArchiveError::file(path.display().to_string(), e))?;
        Self::from_yaml(&content)
    }

    /// Parse and validate options from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let options: Self = serde_yaml::from_str(yaml)?;
        validate_export(&options)?;
        Ok(options)
    }

    /// Base name of the archive, used as the file index path prefix.
    pub fn archive_base_name(&self) -> String {
        self.output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl ImportOptions {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ArchiveError::file(path.display().to_string(), e))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let options: Self = serde_yaml::from_str(yaml)?;
        validate_import(&options)?;
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_yaml_gets_defaults() {
        let options = ExportOptions::from_yaml("output: /tmp/db.zip\n").unwrap();
        assert_eq!(options.compression, Compression::Deflate);
        assert_eq!(options.lobs_per_folder, 10_000);
        assert_eq!(options.lob_folder_size, 1024 * 1024 * 1024);
        assert_eq!(options.blob_inline_threshold, 2000);
        assert_eq!(options.clob_inline_threshold, 4000);
        assert!(options.pretty_xml);
        assert!(!options.require_primary_keys);
        assert_eq!(options.archive_base_name(), "db");
    }

    #[test]
    fn test_full_yaml() {
        let yaml = "\
output: /tmp/db.zip
compression: store
lob_root: /tmp/lobs
lobs_per_folder: 100
lob_folder_size: 1000000
blob_inline_threshold: 64
clob_inline_threshold: 128
pretty_xml: false
require_primary_keys: true
";
        let options = ExportOptions::from_yaml(yaml).unwrap();
        assert_eq!(options.compression, Compression::Store);
        assert_eq!(options.lobs_per_folder, 100);
        assert!(options.require_primary_keys);
    }

    #[test]
    fn test_invalid_yaml_rejected() {
        assert!(ExportOptions::from_yaml("output: /tmp/x.zip\nlobs_per_folder: 0\n").is_err());
        assert!(ExportOptions::from_yaml("not yaml at all: [").is_err());
    }
}
