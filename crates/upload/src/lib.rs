//! Upload pipeline: turns a stream of file records into remote files.
//!
//! This crate implements the **business logic** of an SFTP deploy. It has
//! no SSH dependency of its own: a [`SessionConnector`] implementation
//! (the `sftpdeploy-ssh` crate, or [`MemoryConnector`] for dry runs and
//! tests) supplies the remote session.
//!
//! # Pipeline
//!
//! 1. **Resolve**: compute the remote target and its ancestor directories
//! 2. **Acquire**: lazily open the single shared session
//! 3. **Directories**: create missing ancestors, root first, once per run
//! 4. **Write**: stream the contents into the remote file
//! 5. **Finish**: release the session and report a summary

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod pipeline;
pub mod pool;
pub mod session;
pub mod source;
pub mod types;

// Re-export primary types for convenience.
pub use cache::{DirStatus, DirectoryCache};
pub use config::{AuthMethod, HostKeyPolicy, PipelineConfig};
pub use engine::TransferEngine;
pub use error::{FileError, UploadError};
pub use memory::{MemoryConnector, MemoryRemote, RemoteCall};
pub use pipeline::UploadPipeline;
pub use pool::SessionPool;
pub use session::{RemoteSession, RemoteWriter, SessionConnector, SessionError, SessionFuture};
pub use source::{LocalFile, scan_files_for_upload};
pub use types::{FileOutcome, PipelineState, TransferOutcome, UploadEvent, UploadSummary};

pub use sftpdeploy_transfer::{FileContent, FileRecord, RemotePlatform};
