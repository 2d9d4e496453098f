//! Zip container write strategy.
//!
//! Entries in a zip file are written strictly sequentially: opening a new
//! entry while the previous one is still open would interleave bytes, so
//! the strategy enforces one open entry at a time and a single `finish`
//! that flushes the central directory.

use std::cell::RefCell;
use std::fs::File;
use std::io::Write;
use std::rc::Rc;

use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{ArchiveError, Result};
use crate::write::{ArchiveContainer, WriteStrategy};

struct ZipInner {
    writer: Option<ZipWriter<File>>,
    entry_open: bool,
}

/// Writes all logical paths as entries of one zip file.
pub struct ZipWriteStrategy {
    inner: Rc<RefCell<ZipInner>>,
    method: CompressionMethod,
    finished: bool,
}

impl ZipWriteStrategy {
    /// Deflate-compressed entries.
    pub fn deflated() -> Self {
        Self::with_method(CompressionMethod::Deflated)
    }

    /// Stored (uncompressed) entries.
    pub fn stored() -> Self {
        Self::with_method(CompressionMethod::Stored)
    }

    fn with_method(method: CompressionMethod) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ZipInner {
                writer: None,
                entry_open: false,
            })),
            method,
            finished: false,
        }
    }
}

impl WriteStrategy for ZipWriteStrategy {
    fn setup(&mut self, container: &ArchiveContainer) -> Result<()> {
        if let Some(parent) = container.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ArchiveError::file(parent.display().to_string(), e))?;
        }
        let file = File::create(&container.path)
            .map_err(|e| ArchiveError::file(container.path.display().to_string(), e))?;
        self.inner.borrow_mut().writer = Some(ZipWriter::new(file));
        Ok(())
    }

    fn create_output(
        &mut self,
        _container: &ArchiveContainer,
        logical_path: &str,
    ) -> Result<Box<dyn Write>> {
        if self.finished {
            return Err(ArchiveError::ContainerFinished {
                path: logical_path.to_string(),
            });
        }
        {
            let mut inner = self.inner.borrow_mut();
            if inner.entry_open {
                return Err(ArchiveError::Structure(format!(
                    "zip entry {} opened while the previous entry is still open",
                    logical_path
                )));
            }
            let writer = inner.writer.as_mut().ok_or_else(|| {
                ArchiveError::Structure("zip container was never set up".to_string())
            })?;
            let options = SimpleFileOptions::default()
                .compression_method(self.method)
                .large_file(true);
            debug!(entry = logical_path, "starting zip entry");
            writer.start_file(logical_path, options)?;
            inner.entry_open = true;
        }
        Ok(Box::new(ZipEntryWriter {
            inner: Rc::clone(&self.inner),
        }))
    }

    fn is_simultaneous_writing_supported(&self) -> bool {
        false
    }

    fn finish(&mut self, container: &ArchiveContainer) -> Result<()> {
        if self.finished {
            return Err(ArchiveError::ContainerFinished {
                path: container.path.display().to_string(),
            });
        }
        let mut inner = self.inner.borrow_mut();
        if inner.entry_open {
            return Err(ArchiveError::Structure(
                "zip finished while an entry is still open".to_string(),
            ));
        }
        if let Some(writer) = inner.writer.take() {
            writer.finish()?;
        }
        drop(inner);
        self.finished = true;
        Ok(())
    }
}

/// Writer handle for the currently open entry. Dropping it releases the
/// entry so the next one can start.
struct ZipEntryWriter {
    inner: Rc<RefCell<ZipInner>>,
}

impl Write for ZipEntryWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut inner = self.inner.borrow_mut();
        match inner.writer.as_mut() {
            Some(w) => w.write(buf),
            None => Err(std::io::Error::other("zip container already finished")),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut inner = self.inner.borrow_mut();
        match inner.writer.as_mut() {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for ZipEntryWriter {
    fn drop(&mut self) {
        self.inner.borrow_mut().entry_open = false;
    }
}
