//! Folder-tree write strategy.

use std::fs::{self, File};
use std::io::{BufWriter, Write};

use tracing::debug;

use crate::error::{ArchiveError, Result};
use crate::write::{ArchiveContainer, WriteStrategy};

/// Maps logical paths 1:1 to filesystem paths under the container root,
/// creating directories on demand.
#[derive(Debug, Default)]
pub struct FolderWriteStrategy {
    finished: bool,
}

impl FolderWriteStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WriteStrategy for FolderWriteStrategy {
    fn setup(&mut self, container: &ArchiveContainer) -> Result<()> {
        fs::create_dir_all(&container.path)
            .map_err(|e| ArchiveError::file(container.path.display().to_string(), e))?;
        Ok(())
    }

    fn create_output(
        &mut self,
        container: &ArchiveContainer,
        logical_path: &str,
    ) -> Result<Box<dyn Write>> {
        if self.finished {
            return Err(ArchiveError::ContainerFinished {
                path: logical_path.to_string(),
            });
        }
        let target = container.path.join(logical_path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ArchiveError::file(parent.display().to_string(), e))?;
        }
        debug!(path = %target.display(), "creating archive file");
        let file = File::create(&target)
            .map_err(|e| ArchiveError::file(target.display().to_string(), e))?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn is_simultaneous_writing_supported(&self) -> bool {
        true
    }

    fn finish(&mut self, _container: &ArchiveContainer) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}
