use std::path::PathBuf;
use thiserror::Error;

/// Failures of the persisted upload state file
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read state file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("state file {path} is corrupt (refusing to start with an empty state): {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write state file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures reported by the video platform or the transport to it
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("upload quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("authorization failed: {0}")]
    Auth(String),
    #[error("platform API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PublishError {
    /// Errors after which every later upload in the same run would fail too
    pub fn is_fatal_for_batch(&self) -> bool {
        matches!(self, PublishError::QuotaExceeded(_) | PublishError::Auth(_))
    }
}

/// Selection and input problems detected by the batch driver
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("requested audio file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("no .jpg/.jpeg/.png files found in images dir {}", .0.display())]
    NoImages(PathBuf),
}
