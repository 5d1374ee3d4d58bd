//! Remote session and connector traits.
//!
//! `RemoteSession` is implemented by the SSH crate on top of an SFTP
//! sub-session, and by [`MemoryRemote`](crate::memory::MemoryRemote).
//! Using a trait keeps pipeline logic decoupled from transport and
//! testable with an in-memory remote.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWrite;

use crate::config::PipelineConfig;

/// Boxed future returned by session operations.
pub type SessionFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SessionError>> + Send + 'a>>;

/// Write half of an open remote file. Shutting it down closes the file.
pub type RemoteWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// Errors reported by a remote session or connector.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("no such file: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("session closed")]
    Closed,

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("host key rejected: {0}")]
    HostKey(String),

    #[error("connection timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection error: {0}")]
    Connect(String),

    #[error("SFTP error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// True when the session itself is gone, as opposed to a failed call.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// An established, authenticated file-transfer session.
///
/// Paths are passed exactly as the remote expects them; separator
/// conversion happens before these calls.
pub trait RemoteSession: Send + Sync {
    /// Whether `path` exists on the remote.
    fn exists<'a>(&'a self, path: &'a str) -> SessionFuture<'a, bool>;

    /// Creates one directory with mode 0755. Parents must already exist.
    /// Reports [`SessionError::AlreadyExists`] if it is already there.
    fn mkdir<'a>(&'a self, path: &'a str) -> SessionFuture<'a, ()>;

    /// Opens `path` for writing in create/truncate mode, requesting mode 0666.
    fn create<'a>(&'a self, path: &'a str) -> SessionFuture<'a, RemoteWriter>;

    /// True once the underlying channel has gone away.
    fn is_closed(&self) -> bool;

    /// Closes the sub-session, then the connection. Idempotent.
    fn close(&self) -> SessionFuture<'_, ()>;
}

/// Opens sessions from a pipeline configuration.
pub trait SessionConnector: Send + Sync {
    /// Connects, authenticates and opens exactly one sub-session.
    fn connect<'a>(
        &'a self,
        config: &'a PipelineConfig,
    ) -> SessionFuture<'a, Arc<dyn RemoteSession>>;
}
