//! Option validation, run before any bytes are written.

use crate::config::types::{Compression, ExportOptions, ImportOptions};
use crate::error::{ArchiveError, Result};

/// Reject option combinations the export pipeline cannot honor.
pub fn validate_export(options: &ExportOptions) -> Result<()> {
    if options.output.as_os_str().is_empty() {
        return Err(ArchiveError::Config("output path is empty".to_string()));
    }
    if options.lobs_per_folder == 0 {
        return Err(ArchiveError::Config(
            "lobs_per_folder must be at least 1".to_string(),
        ));
    }
    if options.lob_folder_size == 0 {
        return Err(ArchiveError::Config(
            "lob_folder_size must be at least 1 byte".to_string(),
        ));
    }
    if options.blob_inline_threshold > options.lob_folder_size
        || options.clob_inline_threshold > options.lob_folder_size
    {
        return Err(ArchiveError::Config(format!(
            "inline thresholds ({}/{}) exceed lob_folder_size ({})",
            options.blob_inline_threshold,
            options.clob_inline_threshold,
            options.lob_folder_size
        )));
    }
    if options.lob_root.is_some() && options.compression == Compression::None {
        return Err(ArchiveError::Config(
            "an external LOB tree requires a zip archive; with a folder \
             archive the LOBs already live on the filesystem"
                .to_string(),
        ));
    }
    Ok(())
}

pub fn validate_import(options: &ImportOptions) -> Result<()> {
    if options.input.as_os_str().is_empty() {
        return Err(ArchiveError::Config("input path is empty".to_string()));
    }
    if !options.input.exists() {
        return Err(ArchiveError::Config(format!(
            "input path {} does not exist",
            options.input.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn base_options() -> ExportOptions {
        ExportOptions {
            output: PathBuf::from("/tmp/out.zip"),
            compression: Compression::Deflate,
            lob_root: None,
            lobs_per_folder: 10_000,
            lob_folder_size: 1024 * 1024,
            blob_inline_threshold: 2000,
            clob_inline_threshold: 4000,
            pretty_xml: true,
            require_primary_keys: false,
        }
    }

    #[test]
    fn test_defaults_valid() {
        assert!(validate_export(&base_options()).is_ok());
    }

    #[test]
    fn test_zero_limits_rejected() {
        let mut o = base_options();
        o.lobs_per_folder = 0;
        assert!(validate_export(&o).is_err());

        let mut o = base_options();
        o.lob_folder_size = 0;
        assert!(validate_export(&o).is_err());
    }

    #[test]
    fn test_threshold_above_folder_size_rejected() {
        let mut o = base_options();
        o.lob_folder_size = 1000;
        o.clob_inline_threshold = 4000;
        assert!(validate_export(&o).is_err());
    }

    #[test]
    fn test_external_lobs_require_zip() {
        let mut o = base_options();
        o.lob_root = Some(PathBuf::from("/tmp/lobs"));
        assert!(validate_export(&o).is_ok());
        o.compression = Compression::None;
        assert!(validate_export(&o).is_err());
    }
}
