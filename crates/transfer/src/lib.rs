//! Remote path resolution, file records and progress accounting.
//!
//! This crate holds the pure, transport-agnostic pieces of an upload:
//! where a file lands on the remote host, which directories must exist
//! before it can be written, and how much of it has been sent.

mod path;
mod progress;
mod types;
mod validation;

pub use path::{RemotePlatform, ResolvedPath, normalize_remote_path, resolve};
pub use progress::{FileProgress, SpeedCalculator};
pub use types::{FileContent, FileRecord, UploadBody};
pub use validation::validate_upload_path;

/// Size of each write issued to a remote file stream: 32 KiB.
///
/// Matches the largest payload most SFTP servers accept in a single
/// `SSH_FXP_WRITE` without splitting.
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),
}
