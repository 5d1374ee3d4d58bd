//! Upload error types.
//!
//! [`UploadError`] is run-scoped and ends the pipeline. [`FileError`] is
//! file-scoped: it is recorded against one file and the run continues.

use sftpdeploy_transfer::TransferError;

use crate::session::SessionError;

/// Errors that fail a whole upload run.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("SFTP abrupt closure")]
    AbruptClosure,

    #[error("pipeline is closed")]
    Closed,
}

/// Errors that fail a single file.
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error(transparent)]
    Path(#[from] TransferError),

    #[error("directory {path} could not be created: {reason}")]
    Directory { path: String, reason: String },

    #[error("directory check for {path} failed: {source}")]
    Session {
        path: String,
        #[source]
        source: SessionError,
    },

    #[error("could not open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: SessionError,
    },

    #[error("write to {path} failed: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("reading contents of {path} failed: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FileError {
    /// True when the failure came from the session going away.
    pub fn is_session_closed(&self) -> bool {
        match self {
            Self::Session { source, .. } | Self::Open { source, .. } => source.is_closed(),
            _ => false,
        }
    }
}
