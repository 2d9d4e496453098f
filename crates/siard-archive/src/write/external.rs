//! Zip container with an external large-object folder tree.

use std::io::Write;

use crate::error::Result;
use crate::write::{
    ArchiveContainer, ContainerRole, FolderWriteStrategy, WriteStrategy, ZipWriteStrategy,
};

/// Routes structural files into a zip container and LOB payloads into a
/// parallel folder tree, based on the container's role.
pub struct ExternalLobWriteStrategy {
    zip: ZipWriteStrategy,
    folder: FolderWriteStrategy,
}

impl ExternalLobWriteStrategy {
    pub fn new(zip: ZipWriteStrategy) -> Self {
        Self {
            zip,
            folder: FolderWriteStrategy::new(),
        }
    }

    fn pick(&mut self, role: ContainerRole) -> &mut dyn WriteStrategy {
        match role {
            ContainerRole::Main => &mut self.zip,
            ContainerRole::LobContainer => &mut self.folder,
        }
    }
}

impl WriteStrategy for ExternalLobWriteStrategy {
    fn setup(&mut self, container: &ArchiveContainer) -> Result<()> {
        self.pick(container.role).setup(container)
    }

    fn create_output(
        &mut self,
        container: &ArchiveContainer,
        logical_path: &str,
    ) -> Result<Box<dyn Write>> {
        self.pick(container.role).create_output(container, logical_path)
    }

    fn is_simultaneous_writing_supported(&self) -> bool {
        // the zip half still forbids two open entries in the main container
        false
    }

    fn finish(&mut self, container: &ArchiveContainer) -> Result<()> {
        self.pick(container.role).finish(container)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes_by_role() {
        let dir = tempfile::tempdir().unwrap();
        let main = ArchiveContainer::new(dir.path().join("out.zip"), ContainerRole::Main);
        let lobs =
            ArchiveContainer::new(dir.path().join("lobs"), ContainerRole::LobContainer);

        let mut strategy = ExternalLobWriteStrategy::new(ZipWriteStrategy::stored());
        strategy.setup(&main).unwrap();
        strategy.setup(&lobs).unwrap();

        {
            let mut w = strategy.create_output(&main, "header/metadata.xml").unwrap();
            w.write_all(b"<m/>").unwrap();
        }
        {
            let mut w = strategy
                .create_output(&lobs, "Documents/docCollection1/1/1.bin")
                .unwrap();
            w.write_all(&[0xFF]).unwrap();
        }
        strategy.finish(&main).unwrap();
        strategy.finish(&lobs).unwrap();

        assert!(dir.path().join("out.zip").is_file());
        assert!(dir
            .path()
            .join("lobs/Documents/docCollection1/1/1.bin")
            .is_file());
    }
}
