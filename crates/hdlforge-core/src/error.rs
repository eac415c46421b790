//! Error types for hdlforge-core.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for hdlforge-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in hdlforge-core.
#[derive(Debug, Error)]
pub enum Error {
    /// A library could not be located on any search path.
    #[error("library not found: {0}")]
    LibraryNotFound(String),

    /// A module could not be resolved within its library.
    #[error("module not found: {0}")]
    ModuleNotFound(String),

    /// Failed to parse a core manifest.
    #[error("manifest {path} is malformed on line {line}: {message}")]
    ManifestParse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// An HDL dialect tag that the repository does not understand.
    #[error("unsupported HDL dialect: {0}")]
    UnsupportedDialect(String),

    /// A pipeline stage input that must exist before the stage can run.
    #[error("missing artifact: {0}")]
    MissingArtifact(PathBuf),

    /// A tool executable could not be located inside the toolchain install.
    #[error("unable to locate the executable for tool '{0}'")]
    ToolNotFound(String),

    /// Toolchain install discovery or version probing failed.
    #[error("toolchain error: {0}")]
    Toolchain(String),

    /// Interactive session commanded while the process is not running,
    /// or the session transport broke down.
    #[error("session error: {0}")]
    Session(String),

    /// The on-disk device cache does not match the expected schema.
    #[error("device cache error: {0}")]
    CacheFormat(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
