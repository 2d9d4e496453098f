//! Archive containers and write strategies.
//!
//! A [`WriteStrategy`] turns logical archive paths into actual bytes on
//! storage. The three implementations are interchangeable: a plain folder
//! tree, a single zip container, and a zip container with an external
//! folder tree for large objects. All of them are single-pass write
//! targets: once [`WriteStrategy::finish`] has run, no further output can
//! be created.

mod external;
mod folder;
mod zip;

pub use external::ExternalLobWriteStrategy;
pub use folder::FolderWriteStrategy;
pub use zip::ZipWriteStrategy;

use std::io::Write;
use std::path::PathBuf;

use crate::error::Result;

/// What a container holds, used by composite strategies for routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerRole {
    /// Structural files and table content.
    Main,
    /// Externalized large-object payloads.
    LobContainer,
}

/// One physical output root.
///
/// Created once per export run by the orchestrator and shared, never
/// mutated, by every writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveContainer {
    pub path: PathBuf,
    pub role: ContainerRole,
}

impl ArchiveContainer {
    pub fn new(path: impl Into<PathBuf>, role: ContainerRole) -> Self {
        Self {
            path: path.into(),
            role,
        }
    }
}

/// Capability interface of a write target.
pub trait WriteStrategy {
    /// Prepare the physical container (create the folder, open the zip).
    fn setup(&mut self, container: &ArchiveContainer) -> Result<()>;

    /// Open a writable stream for one logical path.
    ///
    /// Strategies without simultaneous-writing support require the
    /// previous stream to be dropped first.
    fn create_output(
        &mut self,
        container: &ArchiveContainer,
        logical_path: &str,
    ) -> Result<Box<dyn Write>>;

    /// Whether two output streams may be open at the same time.
    fn is_simultaneous_writing_supported(&self) -> bool;

    /// Flush and seal the container. At most once; afterwards
    /// `create_output` fails with `ContainerFinished`.
    fn finish(&mut self, container: &ArchiveContainer) -> Result<()>;
}
