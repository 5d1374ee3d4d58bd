//! Lazily-established single shared session.
//!
//! The state lock is held for the whole connect, so callers arriving
//! while the connection is being set up queue behind it and receive the
//! same session. There is never more than one connect per run.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::error::UploadError;
use crate::session::{RemoteSession, SessionConnector};
use crate::types::UploadEvent;

enum PoolState {
    Idle,
    Ready(Arc<dyn RemoteSession>),
    /// Connecting failed; the message is replayed to later callers.
    Failed(String),
    /// The session went away before release.
    Broken,
    Released,
}

/// Owner of the run's single remote session.
pub struct SessionPool {
    connector: Arc<dyn SessionConnector>,
    config: Arc<PipelineConfig>,
    state: Mutex<PoolState>,
    released: AtomicBool,
    events_tx: mpsc::Sender<UploadEvent>,
}

impl SessionPool {
    pub fn new(
        connector: Arc<dyn SessionConnector>,
        config: Arc<PipelineConfig>,
        events_tx: mpsc::Sender<UploadEvent>,
    ) -> Self {
        Self {
            connector,
            config,
            state: Mutex::new(PoolState::Idle),
            released: AtomicBool::new(false),
            events_tx,
        }
    }

    /// Returns the shared session, connecting on first use.
    pub async fn acquire(&self) -> Result<Arc<dyn RemoteSession>, UploadError> {
        let mut state = self.state.lock().await;

        match &*state {
            PoolState::Ready(session) if !session.is_closed() => return Ok(Arc::clone(session)),
            PoolState::Ready(_) | PoolState::Broken => {
                *state = PoolState::Broken;
                return Err(UploadError::AbruptClosure);
            }
            PoolState::Failed(message) => return Err(UploadError::Connection(message.clone())),
            PoolState::Released => return Err(UploadError::Closed),
            PoolState::Idle => {}
        }

        info!(
            host = %self.config.address(),
            user = %self.config.username,
            "authenticating with {}",
            self.config.auth.label()
        );

        match self.connector.connect(&self.config).await {
            Ok(session) => {
                info!(host = %self.config.address(), "SFTP session ready");
                let _ = self.events_tx.try_send(UploadEvent::Connected {
                    host: self.config.host.clone(),
                });
                *state = PoolState::Ready(Arc::clone(&session));
                Ok(session)
            }
            Err(e) => {
                let message = e.to_string();
                error!(host = %self.config.address(), error = %message, "connection failed");
                *state = PoolState::Failed(message.clone());
                Err(UploadError::Connection(message))
            }
        }
    }

    /// Records that the session went away before release.
    pub async fn mark_broken(&self) {
        let mut state = self.state.lock().await;
        if matches!(*state, PoolState::Ready(_)) {
            *state = PoolState::Broken;
        }
    }

    /// Closes the session if one was opened. Idempotent.
    ///
    /// Close errors are logged only: by now every transfer is settled.
    pub async fn release(&self) {
        self.released.store(true, Ordering::SeqCst);

        let previous = {
            let mut state = self.state.lock().await;
            std::mem::replace(&mut *state, PoolState::Released)
        };

        match previous {
            PoolState::Ready(session) => {
                debug!("closing SFTP session");
                match session.close().await {
                    Ok(()) => info!("connection closed"),
                    Err(e) => warn!(error = %e, "error while closing session"),
                }
            }
            PoolState::Idle => debug!("no session was opened"),
            _ => {}
        }
    }

    /// True once [`release`](Self::release) has been called.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// True while a live session is held.
    pub async fn is_connected(&self) -> bool {
        matches!(&*self.state.lock().await, PoolState::Ready(s) if !s.is_closed())
    }
}
