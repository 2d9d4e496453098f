//! Error types for the archive codec.

use thiserror::Error;

/// Main error type for archive operations.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Configuration error (invalid YAML, nonsense limits, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A type could not be mapped to a normalized spelling or wire type
    #[error("Type mapping error: {0}")]
    TypeMapping(String),

    /// Structural invariant violated (recursive composed type, missing
    /// primary key, empty table definition)
    #[error("Structural error: {0}")]
    Structure(String),

    /// IO error without a specific archive path
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// IO error localized to an archive path
    #[error("IO error at {path}: {source}")]
    File {
        path: String,
        source: std::io::Error,
    },

    /// Zip container error
    #[error("Archive container error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Malformed record found while decoding table content
    #[error("Malformed content in table {table}: {message}")]
    Malformed { table: String, message: String },

    /// File index and written paths disagree at finalize time
    #[error("Checksum/file index error: {0}")]
    Checksum(String),

    /// A write was attempted after the container was finished
    #[error("Container already finished: {path}")]
    ContainerFinished { path: String },

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ArchiveError {
    /// Create a File error tied to an archive path.
    pub fn file(path: impl Into<String>, source: std::io::Error) -> Self {
        ArchiveError::File {
            path: path.into(),
            source,
        }
    }

    /// Create a Malformed error for a table.
    pub fn malformed(table: impl Into<String>, message: impl Into<String>) -> Self {
        ArchiveError::Malformed {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;
