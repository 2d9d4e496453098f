//! Cells, rows and large-object stream providers.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use crate::error::{ArchiveError, Result};

/// A provider of a large-object byte stream.
///
/// The provider, not the cell, decides how the stream is produced and
/// released. `open` may be called more than once because the payload size
/// has to be known before the bytes are read; each call returns a fresh
/// reader positioned at the start.
pub trait LobProvider {
    /// Payload size in bytes.
    fn size(&self) -> u64;

    /// Open a fresh reader over the payload.
    fn open(&self) -> Result<Box<dyn Read>>;
}

/// In-memory provider for small payloads and tests.
pub struct MemoryLob(pub Vec<u8>);

impl LobProvider for MemoryLob {
    fn size(&self) -> u64 {
        self.0.len() as u64
    }

    fn open(&self) -> Result<Box<dyn Read>> {
        Ok(Box::new(std::io::Cursor::new(self.0.clone())))
    }
}

/// Filesystem-backed provider. The file is opened lazily at encode time.
pub struct FileLob {
    path: PathBuf,
    size: u64,
}

impl FileLob {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let size = std::fs::metadata(&path)
            .map_err(|e| ArchiveError::file(path.display().to_string(), e))?
            .len();
        Ok(Self { path, size })
    }
}

impl LobProvider for FileLob {
    fn size(&self) -> u64 {
        self.size
    }

    fn open(&self) -> Result<Box<dyn Read>> {
        let file = File::open(&self.path)
            .map_err(|e| ArchiveError::file(self.path.display().to_string(), e))?;
        Ok(Box::new(file))
    }
}

/// One cell value. Closed set, matched exhaustively by the codec.
pub enum Cell {
    /// Text value; `None` is SQL null.
    Simple(Option<String>),
    /// Binary value backed by a reopenable stream provider.
    Binary(Box<dyn LobProvider>),
    /// Structured value; children in the order of the flattened leaf list.
    Composed(Vec<Cell>),
}

impl Cell {
    /// Convenience constructor for a non-null text cell.
    pub fn text(s: impl Into<String>) -> Self {
        Cell::Simple(Some(s.into()))
    }

    /// SQL null.
    pub fn null() -> Self {
        Cell::Simple(None)
    }

    /// In-memory binary cell.
    pub fn bytes(data: Vec<u8>) -> Self {
        Cell::Binary(Box::new(MemoryLob(data)))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Simple(None))
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Simple(v) => f.debug_tuple("Simple").field(v).finish(),
            Cell::Binary(p) => f.debug_tuple("Binary").field(&p.size()).finish(),
            Cell::Composed(cells) => f.debug_tuple("Composed").field(cells).finish(),
        }
    }
}

/// One table row: ordered cells plus a 1-based index.
#[derive(Debug)]
pub struct Row {
    pub index: u64,
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn new(index: u64, cells: Vec<Cell>) -> Self {
        Self { index, cells }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_memory_lob_reopenable() {
        let lob = MemoryLob(b"abc".to_vec());
        assert_eq!(lob.size(), 3);
        for _ in 0..2 {
            let mut buf = Vec::new();
            lob.open().unwrap().read_to_end(&mut buf).unwrap();
            assert_eq!(buf, b"abc");
        }
    }

    #[test]
    fn test_file_lob_size_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.bin");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&[1, 2, 3, 4])
            .unwrap();

        let lob = FileLob::new(&path).unwrap();
        assert_eq!(lob.size(), 4);
        let mut buf = Vec::new();
        lob.open().unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_cell_null() {
        assert!(Cell::null().is_null());
        assert!(!Cell::text("x").is_null());
    }
}
