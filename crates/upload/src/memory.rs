//! In-memory remote filesystem.
//!
//! Backs `--dry-run` in the CLI and the pipeline tests. Every protocol
//! call is recorded so callers can assert on round-trips, and failures
//! can be injected per path.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::AsyncWrite;
use tokio::sync::Notify;

use crate::config::PipelineConfig;
use crate::session::{
    RemoteSession, RemoteWriter, SessionConnector, SessionError, SessionFuture,
};

/// One recorded protocol call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Exists(String),
    Mkdir(String),
    Create(String),
    Close,
}

#[derive(Default)]
struct RemoteFs {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
    calls: Vec<RemoteCall>,
    mkdir_failures: HashMap<String, SessionError>,
    write_failures: HashSet<String>,
    sever_on_create: HashSet<String>,
}

/// A remote that lives in memory. Clones share the same filesystem.
#[derive(Clone, Default)]
pub struct MemoryRemote {
    fs: Arc<Mutex<RemoteFs>>,
    closed: Arc<AtomicBool>,
    latency: bool,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call and every write yield once before completing, so
    /// concurrent callers interleave the way they would over a network.
    pub fn with_latency(mut self) -> Self {
        self.latency = true;
        self
    }

    async fn pause(&self) {
        if self.latency {
            tokio::task::yield_now().await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RemoteFs> {
        self.fs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seeds an existing directory.
    pub fn add_dir(&self, path: &str) {
        self.lock().dirs.insert(path.to_string());
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.lock().dirs.contains(path)
    }

    /// Contents of a written file.
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().files.get(path).cloned()
    }

    /// Paths of all written files, sorted.
    pub fn files(&self) -> Vec<String> {
        self.lock().files.keys().cloned().collect()
    }

    /// Every call issued so far, in order.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }

    /// Number of recorded calls matching `pred`.
    pub fn count<F>(&self, pred: F) -> usize
    where
        F: Fn(&RemoteCall) -> bool,
    {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }

    /// Paths passed to `mkdir`, in call order.
    pub fn mkdir_calls(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                RemoteCall::Mkdir(path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.count(|c| matches!(c, RemoteCall::Close))
    }

    /// Makes the next `mkdir` of `path` fail with `error`.
    pub fn fail_mkdir(&self, path: &str, error: SessionError) {
        self.lock().mkdir_failures.insert(path.to_string(), error);
    }

    /// Makes every write to `path` fail.
    pub fn fail_write(&self, path: &str) {
        self.lock().write_failures.insert(path.to_string());
    }

    /// Drops the session when `path` is opened for writing.
    pub fn sever_on_create(&self, path: &str) {
        self.lock().sever_on_create.insert(path.to_string());
    }

    /// Drops the session now, as if the server went away.
    pub fn sever(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn check_open(&self) -> Result<(), SessionError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }
}

impl RemoteSession for MemoryRemote {
    fn exists<'a>(&'a self, path: &'a str) -> SessionFuture<'a, bool> {
        Box::pin(async move {
            self.pause().await;
            self.check_open()?;
            let mut fs = self.lock();
            fs.calls.push(RemoteCall::Exists(path.to_string()));
            Ok(fs.dirs.contains(path) || fs.files.contains_key(path))
        })
    }

    fn mkdir<'a>(&'a self, path: &'a str) -> SessionFuture<'a, ()> {
        Box::pin(async move {
            self.pause().await;
            self.check_open()?;
            let mut fs = self.lock();
            fs.calls.push(RemoteCall::Mkdir(path.to_string()));
            if let Some(error) = fs.mkdir_failures.remove(path) {
                return Err(error);
            }
            if !fs.dirs.insert(path.to_string()) {
                return Err(SessionError::AlreadyExists(path.to_string()));
            }
            Ok(())
        })
    }

    fn create<'a>(&'a self, path: &'a str) -> SessionFuture<'a, RemoteWriter> {
        Box::pin(async move {
            self.pause().await;
            self.check_open()?;
            let fail = {
                let mut fs = self.lock();
                fs.calls.push(RemoteCall::Create(path.to_string()));
                if fs.sever_on_create.contains(path) {
                    drop(fs);
                    self.sever();
                    return Err(SessionError::Closed);
                }
                fs.write_failures.contains(path)
            };

            let writer: RemoteWriter = Box::pin(MemoryWriter {
                path: path.to_string(),
                buf: Vec::new(),
                fail,
                latency: self.latency,
                pause: None,
                fs: Arc::clone(&self.fs),
                closed: Arc::clone(&self.closed),
            });
            Ok(writer)
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) -> SessionFuture<'_, ()> {
        Box::pin(async move {
            self.lock().calls.push(RemoteCall::Close);
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        })
    }
}

struct MemoryWriter {
    path: String,
    buf: Vec<u8>,
    fail: bool,
    latency: bool,
    pause: Option<Pin<Box<dyn Future<Output = ()> + Send>>>,
    fs: Arc<Mutex<RemoteFs>>,
    closed: Arc<AtomicBool>,
}

impl MemoryWriter {
    fn lock(&self) -> std::sync::MutexGuard<'_, RemoteFs> {
        self.fs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// With latency on, each write or shutdown yields to the runtime once.
    fn delay(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        if !self.latency {
            return Poll::Ready(());
        }
        let pause = self
            .pause
            .get_or_insert_with(|| Box::pin(tokio::task::yield_now()));
        if pause.as_mut().poll(cx).is_pending() {
            return Poll::Pending;
        }
        self.pause = None;
        Poll::Ready(())
    }

    fn check(&self) -> io::Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "session closed"));
        }
        if self.fail {
            return Err(io::Error::other(format!("write refused: {}", self.path)));
        }
        Ok(())
    }
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.delay(cx).is_pending() {
            return Poll::Pending;
        }
        if let Err(e) = this.check() {
            return Poll::Ready(Err(e));
        }
        this.buf.extend_from_slice(data);
        Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(self.check())
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.delay(cx).is_pending() {
            return Poll::Pending;
        }
        if let Err(e) = this.check() {
            return Poll::Ready(Err(e));
        }
        let data = std::mem::take(&mut this.buf);
        let path = this.path.clone();
        this.lock().files.insert(path, data);
        Poll::Ready(Ok(()))
    }
}

// ---------------------------------------------------------------------------
// MemoryConnector
// ---------------------------------------------------------------------------

/// Connector handing out a shared [`MemoryRemote`].
pub struct MemoryConnector {
    remote: MemoryRemote,
    connects: AtomicUsize,
    gate: Option<Arc<Notify>>,
    failure: Option<String>,
}

impl MemoryConnector {
    pub fn new(remote: MemoryRemote) -> Self {
        Self {
            remote,
            connects: AtomicUsize::new(0),
            gate: None,
            failure: None,
        }
    }

    /// Holds every connect until `gate` is notified.
    pub fn gated(remote: MemoryRemote, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(remote)
        }
    }

    /// Every connect fails authentication with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::new(MemoryRemote::new())
        }
    }

    pub fn remote(&self) -> &MemoryRemote {
        &self.remote
    }

    /// Number of connection attempts made.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl SessionConnector for MemoryConnector {
    fn connect<'a>(
        &'a self,
        _config: &'a PipelineConfig,
    ) -> SessionFuture<'a, Arc<dyn RemoteSession>> {
        Box::pin(async move {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if let Some(message) = &self.failure {
                return Err(SessionError::Auth(message.clone()));
            }
            let session: Arc<dyn RemoteSession> = Arc::new(self.remote.clone());
            Ok(session)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn write_then_shutdown_commits_file() {
        let remote = MemoryRemote::new();
        let mut writer = remote.create("/a.txt").await.unwrap();
        writer.write_all(b"hello").await.unwrap();
        assert!(remote.file("/a.txt").is_none());

        writer.shutdown().await.unwrap();
        assert_eq!(remote.file("/a.txt").unwrap(), b"hello");
        assert_eq!(remote.files(), vec!["/a.txt".to_string()]);
    }

    #[tokio::test]
    async fn mkdir_twice_reports_already_exists() {
        let remote = MemoryRemote::new();
        remote.mkdir("/d").await.unwrap();
        let err = remote.mkdir("/d").await.unwrap_err();
        assert!(matches!(err, SessionError::AlreadyExists(_)));
        assert!(remote.exists("/d").await.unwrap());
    }

    #[tokio::test]
    async fn injected_write_failure() {
        let remote = MemoryRemote::new();
        remote.fail_write("/bad");
        let mut writer = remote.create("/bad").await.unwrap();
        assert!(writer.write_all(b"x").await.is_err());
    }

    #[tokio::test]
    async fn latency_makes_calls_yield() {
        let remote = MemoryRemote::new().with_latency();
        let exists = remote.exists("/");
        tokio::pin!(exists);
        assert!(futures_util::poll!(exists.as_mut()).is_pending());
        assert_eq!(remote.count(|c| matches!(c, RemoteCall::Exists(_))), 0);
        assert!(!exists.await.unwrap());

        let mut writer = remote.create("/slow.txt").await.unwrap();
        writer.write_all(b"abc").await.unwrap();
        writer.shutdown().await.unwrap();
        assert_eq!(remote.file("/slow.txt").unwrap(), b"abc");
    }

    #[tokio::test]
    async fn severed_remote_refuses_calls() {
        let remote = MemoryRemote::new();
        remote.sever();
        assert!(remote.is_closed());
        assert!(matches!(remote.exists("/").await, Err(SessionError::Closed)));
    }

    #[tokio::test]
    async fn failing_connector_counts_attempts() {
        let connector = MemoryConnector::failing("denied");
        let config = PipelineConfig::new("h", crate::config::AuthMethod::Password("p".into()));
        let result = connector.connect(&config).await;
        assert!(matches!(result, Err(SessionError::Auth(_))));
        assert_eq!(connector.connect_count(), 1);
    }
}
