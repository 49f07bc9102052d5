use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to {action} {}: {source}", .path.display())]
    IoAt {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unknown action tag {0} in dialog header")]
    UnknownAction(u8),

    #[error("Unknown file type tag {0} in dialog header")]
    UnknownFileType(u8),

    #[error("Unsupported protocol version {version} (supported: {supported})")]
    UnsupportedVersion { version: u8, supported: u8 },

    #[error("Invalid relative path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("Source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Destination already exists: {}", .0.display())]
    DestinationExists(PathBuf),

    #[error("File {} still locked after {attempts} attempts", .path.display())]
    FileLocked { path: PathBuf, attempts: u32 },

    #[cfg(feature = "watch")]
    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Worker task failed: {0}")]
    TaskFailed(String),
}

impl SyncError {
    /// Wrap an I/O error with the path and the action that failed on it.
    pub fn io_at(action: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| SyncError::IoAt {
            action,
            path,
            source,
        }
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        SyncError::TaskFailed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
