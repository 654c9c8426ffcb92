//! Import error type.

use std::path::PathBuf;

use thiserror::Error;

/// Why an import did not complete.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The feed file does not exist.
    #[error("No xmltv file found: {}", .0.display())]
    SourceNotFound(PathBuf),
    /// Another import holds the run lock.
    #[error("already importing...")]
    AlreadyRunning,
    /// The cancellation flag was set.
    #[error("import cancelled")]
    Cancelled,
    /// Parsing or storage failed.
    #[error("Invalid XML file:{0:#}")]
    Failed(anyhow::Error),
}

impl From<anyhow::Error> for ImportError {
    fn from(err: anyhow::Error) -> Self {
        Self::Failed(err)
    }
}
