//! Read-side container access.
//!
//! Mirrors the write strategies: a folder tree or a zip container, behind
//! one capability interface that opens a readable stream per logical path.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{ArchiveError, Result};

/// Capability interface of a read source.
pub trait ReadStrategy {
    /// Open a readable stream for one logical path.
    fn create_input(&mut self, logical_path: &str) -> Result<Box<dyn Read>>;

    /// Whether a logical path exists in the container.
    fn exists(&mut self, logical_path: &str) -> bool;
}

/// Reads logical paths from a folder tree.
pub struct FolderReadStrategy {
    root: PathBuf,
}

impl FolderReadStrategy {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ReadStrategy for FolderReadStrategy {
    fn create_input(&mut self, logical_path: &str) -> Result<Box<dyn Read>> {
        let target = self.root.join(logical_path);
        let file = File::open(&target)
            .map_err(|e| ArchiveError::file(target.display().to_string(), e))?;
        Ok(Box::new(std::io::BufReader::new(file)))
    }

    fn exists(&mut self, logical_path: &str) -> bool {
        self.root.join(logical_path).is_file()
    }
}

/// Reads logical paths as entries of one zip container.
///
/// Entries are spilled to an unnamed temporary file so the returned
/// stream does not borrow the archive; memory stays bounded regardless of
/// entry size.
pub struct ZipReadStrategy {
    archive: zip::ZipArchive<File>,
}

impl ZipReadStrategy {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| ArchiveError::file(path.display().to_string(), e))?;
        Ok(Self {
            archive: zip::ZipArchive::new(file)?,
        })
    }
}

impl ReadStrategy for ZipReadStrategy {
    fn create_input(&mut self, logical_path: &str) -> Result<Box<dyn Read>> {
        let mut entry = self.archive.by_name(logical_path)?;
        let mut spill = tempfile::tempfile()?;
        std::io::copy(&mut entry, &mut spill)
            .map_err(|e| ArchiveError::file(logical_path.to_string(), e))?;
        spill.seek(SeekFrom::Start(0))?;
        Ok(Box::new(spill))
    }

    fn exists(&mut self, logical_path: &str) -> bool {
        self.archive.by_name(logical_path).is_ok()
    }
}

/// Open the right strategy for a path: a directory is read as a folder
/// archive, anything else as a zip container.
pub fn open_archive(path: impl AsRef<Path>) -> Result<Box<dyn ReadStrategy>> {
    let path = path.as_ref();
    if path.is_dir() {
        Ok(Box::new(FolderReadStrategy::new(path)))
    } else {
        Ok(Box::new(ZipReadStrategy::open(path)?))
    }
}
