use crate::report::SyncReport;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Local directory not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Remote path exists but is not a directory: {path}")]
    Conflict { path: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Remote operation failed on {path}: {message}")]
    Remote { path: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A fatal error hit while uploading; `partial` lists what had already
    /// changed on the remote.
    #[error("Deploy aborted after {} uploads: {cause}", partial.uploaded.len())]
    Aborted {
        partial: Box<SyncReport>,
        cause: Box<SyncError>,
    },
}

impl SyncError {
    pub(crate) fn remote(path: impl Into<String>, message: impl ToString) -> Self {
        SyncError::Remote {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Errors that mean the channel itself is gone, not just one item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Transport(_) | SyncError::Aborted { .. })
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
