//! Run-scoped cache of remote directories known to exist.
//!
//! Each directory gets a once-cell: the first caller runs the
//! exists/mkdir sequence, concurrent callers for the same path wait on
//! it, and later callers return without touching the session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sftpdeploy_transfer::RemotePlatform;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::session::{RemoteSession, SessionError};

/// What the cache learned about a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirStatus {
    /// Already present on the remote.
    Existing,
    /// Created during this run.
    Created,
    /// Creation failed with something other than "already exists".
    Failed(String),
}

/// Result of [`DirectoryCache::ensure_exists`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ensured {
    pub status: DirStatus,
    /// True when this call issued the protocol requests, false when the
    /// answer came from the cache or another in-flight caller.
    pub probed: bool,
}

/// Set of canonical remote directories confirmed for this run.
///
/// Keys are always forward-slash canonical paths; the platform-specific
/// form is only built for the protocol calls.
#[derive(Default)]
pub struct DirectoryCache {
    entries: Mutex<HashMap<String, Arc<OnceCell<DirStatus>>>>,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `path` has already been settled this run.
    pub fn contains(&self, path: &str) -> bool {
        self.lock()
            .get(path)
            .is_some_and(|cell| cell.initialized())
    }

    /// Number of settled directories.
    pub fn len(&self) -> usize {
        self.lock().values().filter(|cell| cell.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Makes sure `path` exists on the remote.
    ///
    /// Creation failures other than "already exists" are logged and
    /// cached as [`DirStatus::Failed`]; they are not errors here. Only a
    /// closed session is returned as `Err`, and then nothing is cached.
    pub async fn ensure_exists(
        &self,
        session: &dyn RemoteSession,
        path: &str,
        platform: RemotePlatform,
    ) -> Result<Ensured, SessionError> {
        let cell = Arc::clone(self.lock().entry(path.to_string()).or_default());

        let mut probed = false;
        let flag = &mut probed;
        let status = cell
            .get_or_try_init(move || async move {
                *flag = true;
                probe_and_create(session, &platform.native_path(path)).await
            })
            .await?
            .clone();

        Ok(Ensured { status, probed })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<OnceCell<DirStatus>>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

async fn probe_and_create(
    session: &dyn RemoteSession,
    remote: &str,
) -> Result<DirStatus, SessionError> {
    match session.exists(remote).await {
        Ok(true) => return Ok(DirStatus::Existing),
        Ok(false) => {}
        Err(SessionError::Closed) => return Err(SessionError::Closed),
        Err(e) => debug!(dir = %remote, error = %e, "exists check failed, trying mkdir"),
    }

    match session.mkdir(remote).await {
        Ok(()) => {
            info!(dir = %remote, "SFTP created");
            Ok(DirStatus::Created)
        }
        Err(SessionError::AlreadyExists(_)) => {
            debug!(dir = %remote, "directory appeared concurrently");
            Ok(DirStatus::Existing)
        }
        Err(SessionError::Closed) => Err(SessionError::Closed),
        Err(e) => {
            warn!(dir = %remote, error = %e, "SFTP mkdir error");
            Ok(DirStatus::Failed(e.to_string()))
        }
    }
}
