//! Per-file checksum bookkeeping and the end-of-run file index.
//!
//! Every file written anywhere in the archive during one export run goes
//! through a [`TrackedWriter`] so an MD5 digest is computed as the bytes
//! pass through and recorded against the file's logical archive path. The
//! file index document is built once, at the very end, purely from the
//! accumulated entries; building it incrementally would require the index
//! to describe itself.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use md5::{Digest, Md5};

use crate::content::xml::XmlWriter;
use crate::error::{ArchiveError, Result};

/// One recorded file: logical archive path plus its MD5 digest in
/// uppercase hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIndexEntry {
    pub path: String,
    pub digest_hex: String,
}

/// Uppercase-hex MD5 of a byte slice.
pub fn md5_hex(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    hex::encode_upper(hasher.finalize())
}

/// Copy a stream with a bounded buffer, returning the byte count and the
/// uppercase-hex MD5 of everything copied.
pub fn copy_with_md5(
    reader: &mut dyn std::io::Read,
    writer: &mut dyn Write,
) -> Result<(u64, String)> {
    let mut hasher = Md5::new();
    let mut buf = [0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
    writer.flush()?;
    Ok((total, hex::encode_upper(hasher.finalize())))
}

/// Shared accumulator of [`FileIndexEntry`] records.
///
/// Cloning the handle shares the underlying entry list. Single-threaded
/// by design, like the rest of the export pipeline.
#[derive(Clone, Default)]
pub struct FileIndex {
    entries: Rc<RefCell<Vec<FileIndexEntry>>>,
}

impl FileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an output stream so its digest is recorded under `path` when
    /// the stream is dropped.
    pub fn wrap(&self, path: impl Into<String>, inner: Box<dyn Write>) -> TrackedWriter {
        TrackedWriter {
            inner: Some(inner),
            hasher: Some(Md5::new()),
            path: path.into(),
            entries: Rc::clone(&self.entries),
        }
    }

    /// Record an entry directly (used by strategies that already digested
    /// the bytes themselves).
    pub fn record(&self, path: impl Into<String>, digest_hex: impl Into<String>) {
        self.entries.borrow_mut().push(FileIndexEntry {
            path: path.into(),
            digest_hex: digest_hex.into(),
        });
    }

    /// Snapshot of the accumulated entries, in write order.
    pub fn entries(&self) -> Vec<FileIndexEntry> {
        self.entries.borrow().clone()
    }

    /// Emit the file index document.
    ///
    /// `base` is the archive's base folder name, prefixed to every path;
    /// separators are written as backslashes, which is what the index
    /// format mandates. Fails if any path was recorded more than once,
    /// since that means a file was written twice into a single-pass
    /// container.
    pub fn write_index<W: Write>(&self, out: W, base: &str, pretty: bool) -> Result<()> {
        let entries = self.entries.borrow();
        for (i, entry) in entries.iter().enumerate() {
            if entries[..i].iter().any(|e| e.path == entry.path) {
                return Err(ArchiveError::Checksum(format!(
                    "path {} recorded twice in the file index",
                    entry.path
                )));
            }
        }

        let mut xml = XmlWriter::new(out, pretty);
        xml.declaration()?;
        xml.open_tag("fileIndex")?;
        for entry in entries.iter() {
            let full = if base.is_empty() {
                entry.path.clone()
            } else {
                format!("{}/{}", base, entry.path)
            };
            let (folder, file) = split_path(&full);
            xml.open_tag("f")?;
            xml.text_element("foN", &folder.replace('/', "\\"))?;
            xml.text_element("fiN", file)?;
            xml.text_element("md5", &entry.digest_hex)?;
            xml.close_tag("f")?;
        }
        xml.close_tag("fileIndex")?;
        xml.flush()?;
        Ok(())
    }
}

impl FileIndex {
    /// Parse a file index document back into entries. Paths come back in
    /// logical form: forward slashes, base folder prefix stripped when it
    /// matches `base`.
    pub fn parse(input: Box<dyn std::io::Read>, base: &str) -> Result<Vec<FileIndexEntry>> {
        use crate::content::events::{XmlEvent, XmlTokenizer};

        #[derive(Clone, Copy, PartialEq)]
        enum Field {
            None,
            Folder,
            File,
            Digest,
        }

        let mut tokens = XmlTokenizer::new(input);
        tokens.expect_start("fileIndex")?;
        let mut entries = Vec::new();
        let mut folder = String::new();
        let mut file = String::new();
        let mut digest = String::new();
        let mut current = Field::None;

        loop {
            match tokens.next_event()? {
                XmlEvent::StartElement { name, .. } => {
                    current = match name.as_str() {
                        "foN" => Field::Folder,
                        "fiN" => Field::File,
                        "md5" => Field::Digest,
                        _ => Field::None,
                    };
                }
                XmlEvent::Text(t) => match current {
                    Field::Folder => folder.push_str(&t),
                    Field::File => file.push_str(&t),
                    Field::Digest => digest.push_str(&t),
                    Field::None => {}
                },
                XmlEvent::EndElement { name } => {
                    current = Field::None;
                    if name == "f" {
                        let folder_part = folder.replace('\\', "/");
                        let mut path = if folder_part.is_empty() {
                            file.clone()
                        } else {
                            format!("{}/{}", folder_part, file)
                        };
                        if !base.is_empty() {
                            if let Some(stripped) =
                                path.strip_prefix(&format!("{}/", base))
                            {
                                path = stripped.to_string();
                            }
                        }
                        entries.push(FileIndexEntry {
                            path,
                            digest_hex: std::mem::take(&mut digest),
                        });
                        folder.clear();
                        file.clear();
                    } else if name == "fileIndex" {
                        break;
                    }
                }
                XmlEvent::Eof => break,
            }
        }
        Ok(entries)
    }
}

fn split_path(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((folder, file)) => (folder, file),
        None => ("", path),
    }
}

/// Output stream wrapper computing an MD5 digest of everything written.
///
/// On drop the digest is recorded in the owning [`FileIndex`]. Dropping
/// the writer is how callers close an archive entry, so the record lands
/// exactly when the file is complete.
pub struct TrackedWriter {
    inner: Option<Box<dyn Write>>,
    hasher: Option<Md5>,
    path: String,
    entries: Rc<RefCell<Vec<FileIndexEntry>>>,
}

impl Write for TrackedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let inner = self
            .inner
            .as_mut()
            .ok_or_else(|| std::io::Error::other("writer already closed"))?;
        let n = inner.write(buf)?;
        if let Some(hasher) = self.hasher.as_mut() {
            hasher.update(&buf[..n]);
        }
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.inner.as_mut() {
            Some(inner) => inner.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for TrackedWriter {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            drop(inner);
        }
        if let Some(hasher) = self.hasher.take() {
            self.entries.borrow_mut().push(FileIndexEntry {
                path: std::mem::take(&mut self.path),
                digest_hex: hex::encode_upper(hasher.finalize()),
            });
        }
    }
}
