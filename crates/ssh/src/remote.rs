//! [`RemoteSession`] over a russh SFTP sub-session.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use russh::Disconnect;
use russh::client::Handle;
use russh_sftp::client::SftpSession;
use russh_sftp::client::error::Error as SftpError;
use russh_sftp::protocol::{FileAttributes, OpenFlags, StatusCode};
use sftpdeploy_upload::{RemoteSession, RemoteWriter, SessionError, SessionFuture};
use tokio::io::AsyncWrite;
use tracing::{debug, info, warn};

use crate::error::{is_session_end, map_sftp};
use crate::handler::ClientHandler;

/// Permissions for directories created by the upload.
const DIR_MODE: u32 = 0o755;
/// Permissions requested for uploaded files, before the server's umask.
const FILE_MODE: u32 = 0o666;

fn with_mode(mode: u32) -> FileAttributes {
    FileAttributes {
        permissions: Some(mode),
        ..FileAttributes::empty()
    }
}

/// One SSH connection carrying one SFTP sub-session.
pub struct SftpRemote {
    sftp: SftpSession,
    handle: Mutex<Option<Handle<ClientHandler>>>,
    closed: AtomicBool,
    /// Set once the SFTP channel ended underneath us.
    channel_lost: Arc<AtomicBool>,
}

impl SftpRemote {
    pub(crate) fn new(sftp: SftpSession, handle: Handle<ClientHandler>) -> Self {
        Self {
            sftp,
            handle: Mutex::new(Some(handle)),
            closed: AtomicBool::new(false),
            channel_lost: Arc::new(AtomicBool::new(false)),
        }
    }

    fn lock_handle(&self) -> std::sync::MutexGuard<'_, Option<Handle<ClientHandler>>> {
        self.handle.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Maps an SFTP error, reporting any failure after the connection
    /// or the SFTP channel dropped as a closed session.
    fn error(&self, path: &str, e: SftpError) -> SessionError {
        if self.is_closed() {
            return SessionError::Closed;
        }
        let mapped = map_sftp(path, e);
        if mapped.is_closed() && !self.channel_lost.swap(true, Ordering::SeqCst) {
            warn!(path, "SFTP channel ended");
        }
        mapped
    }
}

impl RemoteSession for SftpRemote {
    fn exists<'a>(&'a self, path: &'a str) -> SessionFuture<'a, bool> {
        Box::pin(async move {
            self.sftp
                .try_exists(path)
                .await
                .map_err(|e| self.error(path, e))
        })
    }

    fn mkdir<'a>(&'a self, path: &'a str) -> SessionFuture<'a, ()> {
        Box::pin(async move {
            match self.sftp.create_dir(path).await {
                Ok(()) => {
                    if let Err(e) = self.sftp.set_metadata(path, with_mode(DIR_MODE)).await {
                        let e = self.error(path, e);
                        if e.is_closed() {
                            return Err(e);
                        }
                        debug!(dir = %path, error = %e, "could not set directory mode");
                    }
                    Ok(())
                }
                // Servers report an existing directory as a generic failure.
                Err(SftpError::Status(s)) if s.status_code == StatusCode::Failure => {
                    match self.sftp.try_exists(path).await {
                        Ok(true) => Err(SessionError::AlreadyExists(path.to_string())),
                        Ok(false) => Err(self.error(path, SftpError::Status(s))),
                        Err(e) => match self.error(path, e) {
                            SessionError::Closed => Err(SessionError::Closed),
                            _ => Err(self.error(path, SftpError::Status(s))),
                        },
                    }
                }
                Err(e) => Err(self.error(path, e)),
            }
        })
    }

    fn create<'a>(&'a self, path: &'a str) -> SessionFuture<'a, RemoteWriter> {
        Box::pin(async move {
            let file = self
                .sftp
                .open_with_flags_and_attributes(
                    path,
                    OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
                    with_mode(FILE_MODE),
                )
                .await
                .map_err(|e| self.error(path, e))?;
            let writer: RemoteWriter = Box::pin(ChannelWatch {
                inner: Box::pin(file),
                channel_lost: Arc::clone(&self.channel_lost),
            });
            Ok(writer)
        })
    }

    fn is_closed(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) || self.channel_lost.load(Ordering::SeqCst) {
            return true;
        }
        self.lock_handle()
            .as_ref()
            .is_none_or(|handle| handle.is_closed())
    }

    fn close(&self) -> SessionFuture<'_, ()> {
        Box::pin(async move {
            if self.closed.swap(true, Ordering::SeqCst) {
                return Ok(());
            }

            if let Err(e) = self.sftp.close().await {
                debug!(error = %e, "SFTP session close failed");
            }
            info!("SFTP session closed");

            let handle = self.lock_handle().take();
            if let Some(handle) = handle {
                handle
                    .disconnect(Disconnect::ByApplication, "", "en")
                    .await
                    .map_err(crate::error::map_ssh)?;
                info!("connection closed");
            }
            Ok(())
        })
    }
}

/// Remote file writer that flags the sub-session as lost when a write
/// fails because the SFTP channel is gone.
struct ChannelWatch<W> {
    inner: W,
    channel_lost: Arc<AtomicBool>,
}

impl<W> ChannelWatch<W> {
    fn watch<T>(&self, poll: Poll<io::Result<T>>) -> Poll<io::Result<T>> {
        if let Poll::Ready(Err(e)) = &poll {
            if is_session_end(&e.to_string()) {
                self.channel_lost.store(true, Ordering::SeqCst);
            }
        }
        poll
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for ChannelWatch<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        this.watch(poll)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_flush(cx);
        this.watch(poll)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_shutdown(cx);
        this.watch(poll)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    struct Refusing(&'static str);

    impl AsyncWrite for Refusing {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::other(self.0)))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn watched(message: &'static str) -> (ChannelWatch<Refusing>, Arc<AtomicBool>) {
        let lost = Arc::new(AtomicBool::new(false));
        let writer = ChannelWatch {
            inner: Refusing(message),
            channel_lost: Arc::clone(&lost),
        };
        (writer, lost)
    }

    #[test]
    fn modes_only_carry_permissions() {
        let file = with_mode(FILE_MODE);
        assert_eq!(file.permissions, Some(0o666));
        assert_eq!(file.size, None);
        assert_eq!(file.mtime, None);
        assert_eq!(with_mode(DIR_MODE).permissions, Some(0o755));
    }

    #[tokio::test]
    async fn write_after_channel_end_marks_session_lost() {
        let (mut writer, lost) = watched("Unexpected behavior: session closed");
        assert!(writer.write_all(b"data").await.is_err());
        assert!(lost.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn ordinary_write_error_keeps_session() {
        let (mut writer, lost) = watched("Failure: disk full");
        assert!(writer.write_all(b"data").await.is_err());
        assert!(!lost.load(Ordering::SeqCst));
    }
}
