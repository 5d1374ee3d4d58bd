//! Per-file transfer: directories, open, write, close.

use sftpdeploy_transfer::{DEFAULT_CHUNK_SIZE, FileProgress, FileRecord, ResolvedPath, UploadBody};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::cache::{DirStatus, DirectoryCache};
use crate::config::PipelineConfig;
use crate::error::FileError;
use crate::session::{RemoteSession, RemoteWriter};
use crate::types::UploadEvent;

/// Moves one file onto the remote through a shared session.
pub struct TransferEngine<'a> {
    cache: &'a DirectoryCache,
    config: &'a PipelineConfig,
    events_tx: &'a mpsc::Sender<UploadEvent>,
}

impl<'a> TransferEngine<'a> {
    pub fn new(
        cache: &'a DirectoryCache,
        config: &'a PipelineConfig,
        events_tx: &'a mpsc::Sender<UploadEvent>,
    ) -> Self {
        Self {
            cache,
            config,
            events_tx,
        }
    }

    /// Transfers `record` to `resolved.target()` and returns the bytes written.
    ///
    /// Missing ancestors are ensured root first, strictly before the file
    /// is opened. The record's contents are consumed as described in
    /// [`FileRecord::take_upload_contents`]; a record without contents
    /// writes nothing and issues no remote calls.
    pub async fn transfer(
        &self,
        session: &dyn RemoteSession,
        record: &mut FileRecord,
        resolved: &ResolvedPath,
    ) -> Result<u64, FileError> {
        let Some(body) = record.take_upload_contents() else {
            return Ok(0);
        };

        self.ensure_directories(session, resolved).await?;

        let target = resolved.target();
        debug!(path = %target, size = record.size, "opening remote file");
        let writer = session
            .create(target)
            .await
            .map_err(|source| FileError::Open {
                path: target.to_string(),
                source,
            })?;

        let mut progress = FileProgress::new(record.size);
        match body {
            UploadBody::Buffer(data) => {
                self.write_buffer(writer, &data, target, &mut progress).await
            }
            UploadBody::Stream(reader) => {
                self.write_stream(writer, reader, target, &mut progress).await
            }
        }
    }

    async fn ensure_directories(
        &self,
        session: &dyn RemoteSession,
        resolved: &ResolvedPath,
    ) -> Result<(), FileError> {
        for dir in resolved.pending_directories(|d| self.cache.contains(d)) {
            let ensured = self
                .cache
                .ensure_exists(session, dir, self.config.platform)
                .await
                .map_err(|source| FileError::Session {
                    path: dir.to_string(),
                    source,
                })?;

            match ensured.status {
                DirStatus::Created if ensured.probed => {
                    self.emit(UploadEvent::DirectoryCreated {
                        path: dir.to_string(),
                    });
                }
                DirStatus::Failed(reason) => {
                    if ensured.probed {
                        self.emit(UploadEvent::DirectoryFailed {
                            path: dir.to_string(),
                            error: reason.clone(),
                        });
                    }
                    if self.config.strict_directories {
                        return Err(FileError::Directory {
                            path: dir.to_string(),
                            reason,
                        });
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn write_buffer(
        &self,
        mut writer: RemoteWriter,
        data: &[u8],
        target: &str,
        progress: &mut FileProgress,
    ) -> Result<u64, FileError> {
        for chunk in data.chunks(DEFAULT_CHUNK_SIZE) {
            writer
                .write_all(chunk)
                .await
                .map_err(|source| write_error(target, source))?;
            self.report(target, progress, chunk.len());
        }
        self.finish(writer, target, progress).await
    }

    async fn write_stream(
        &self,
        mut writer: RemoteWriter,
        mut reader: Box<dyn tokio::io::AsyncRead + Send + Unpin>,
        target: &str,
        progress: &mut FileProgress,
    ) -> Result<u64, FileError> {
        let mut buf = vec![0u8; DEFAULT_CHUNK_SIZE];
        loop {
            let n = reader.read(&mut buf).await.map_err(|source| FileError::Read {
                path: target.to_string(),
                source,
            })?;
            if n == 0 {
                break;
            }
            writer
                .write_all(&buf[..n])
                .await
                .map_err(|source| write_error(target, source))?;
            self.report(target, progress, n);
        }
        self.finish(writer, target, progress).await
    }

    /// Closes the remote file. Only a clean close counts as written.
    async fn finish(
        &self,
        mut writer: RemoteWriter,
        target: &str,
        progress: &FileProgress,
    ) -> Result<u64, FileError> {
        writer
            .shutdown()
            .await
            .map_err(|source| write_error(target, source))?;
        Ok(progress.transferred())
    }

    fn report(&self, target: &str, progress: &mut FileProgress, written: usize) {
        if let Some(percent) = progress.record(written as u64) {
            debug!(path = %target, bytes = progress.transferred(), percent, "upload progress");
            self.emit(UploadEvent::Progress {
                remote_path: target.to_string(),
                bytes: progress.transferred(),
                percent,
                bytes_per_second: progress.bytes_per_second(),
            });
        }
    }

    fn emit(&self, event: UploadEvent) {
        let _ = self.events_tx.try_send(event);
    }
}

fn write_error(target: &str, source: std::io::Error) -> FileError {
    FileError::Write {
        path: target.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthMethod;
    use crate::memory::MemoryRemote;
    use crate::session::SessionError;
    use sftpdeploy_transfer::{RemotePlatform, resolve};

    fn config(base: &str) -> PipelineConfig {
        PipelineConfig::new("host", AuthMethod::Password("pw".into())).with_remote_path(base)
    }

    fn drain(rx: &mut mpsc::Receiver<UploadEvent>) -> Vec<UploadEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn buffer_upload_creates_parents_first() {
        let remote = MemoryRemote::new();
        let cache = DirectoryCache::new();
        let config = config("/var/www");
        let (tx, mut rx) = mpsc::channel(64);
        let engine = TransferEngine::new(&cache, &config, &tx);

        let mut record = FileRecord::from_bytes("a/b/x.txt", "hello");
        let resolved = resolve(&config.remote_path, &record.relative_path).unwrap();
        let bytes = engine.transfer(&remote, &mut record, &resolved).await.unwrap();

        assert_eq!(bytes, 5);
        assert_eq!(remote.file("/var/www/a/b/x.txt").unwrap(), b"hello");
        assert_eq!(
            remote.mkdir_calls(),
            vec!["/var/www", "/var/www/a", "/var/www/a/b"]
        );
        assert!(record.is_buffer());

        let events = drain(&mut rx);
        let created = events
            .iter()
            .filter(|e| matches!(e, UploadEvent::DirectoryCreated { .. }))
            .count();
        assert_eq!(created, 3);
        let last = events
            .iter()
            .rev()
            .find_map(|e| match e {
                UploadEvent::Progress { bytes, percent, .. } => Some((*bytes, *percent)),
                _ => None,
            });
        assert_eq!(last, Some((5, 100)));
    }

    #[tokio::test]
    async fn stream_upload_is_chunked_and_consumed() {
        let remote = MemoryRemote::new();
        let cache = DirectoryCache::new();
        let config = config("/");
        let (tx, mut rx) = mpsc::channel(256);
        let engine = TransferEngine::new(&cache, &config, &tx);

        let data = vec![7u8; DEFAULT_CHUNK_SIZE * 2 + 10];
        let mut record =
            FileRecord::from_reader("big.bin", std::io::Cursor::new(data.clone()), data.len() as u64);
        let resolved = resolve(&config.remote_path, &record.relative_path).unwrap();
        let bytes = engine.transfer(&remote, &mut record, &resolved).await.unwrap();

        assert_eq!(bytes, data.len() as u64);
        assert_eq!(remote.file("/big.bin").unwrap(), data);
        assert!(record.is_null());
        assert_eq!(record.size, data.len() as u64);

        let percents: Vec<u8> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                UploadEvent::Progress { percent, .. } => Some(percent),
                _ => None,
            })
            .collect();
        assert_eq!(percents.last(), Some(&100));
        assert!(percents.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn progress_is_capped_when_size_is_understated() {
        let remote = MemoryRemote::new();
        let cache = DirectoryCache::new();
        let config = config("/");
        let (tx, mut rx) = mpsc::channel(64);
        let engine = TransferEngine::new(&cache, &config, &tx);

        let mut record = FileRecord::from_reader("x", &b"0123456789"[..], 4);
        let resolved = resolve("/", "x").unwrap();
        engine.transfer(&remote, &mut record, &resolved).await.unwrap();

        for event in drain(&mut rx) {
            if let UploadEvent::Progress { percent, .. } = event {
                assert!(percent <= 100);
            }
        }
    }

    #[tokio::test]
    async fn mkdir_failure_still_attempts_write() {
        let remote = MemoryRemote::new();
        remote.fail_mkdir("/d", SessionError::PermissionDenied("/d".into()));
        let cache = DirectoryCache::new();
        let config = config("/");
        let (tx, mut rx) = mpsc::channel(64);
        let engine = TransferEngine::new(&cache, &config, &tx);

        let mut record = FileRecord::from_bytes("d/f.txt", "x");
        let resolved = resolve("/", "d/f.txt").unwrap();
        engine.transfer(&remote, &mut record, &resolved).await.unwrap();

        assert!(remote.file("/d/f.txt").is_some());
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, UploadEvent::DirectoryFailed { path, .. } if path == "/d")));
    }

    #[tokio::test]
    async fn strict_directories_fail_the_file() {
        let remote = MemoryRemote::new();
        remote.fail_mkdir("/d", SessionError::PermissionDenied("/d".into()));
        let cache = DirectoryCache::new();
        let mut config = config("/");
        config.strict_directories = true;
        let (tx, _rx) = mpsc::channel(64);
        let engine = TransferEngine::new(&cache, &config, &tx);

        let mut record = FileRecord::from_bytes("d/f.txt", "x");
        let resolved = resolve("/", "d/f.txt").unwrap();
        let err = engine
            .transfer(&remote, &mut record, &resolved)
            .await
            .unwrap_err();

        assert!(matches!(err, FileError::Directory { .. }));
        assert!(remote.files().is_empty());
    }

    #[tokio::test]
    async fn write_failure_is_a_file_error() {
        let remote = MemoryRemote::new();
        remote.fail_write("/bad.txt");
        let cache = DirectoryCache::new();
        let config = config("/");
        let (tx, _rx) = mpsc::channel(64);
        let engine = TransferEngine::new(&cache, &config, &tx);

        let mut record = FileRecord::from_bytes("bad.txt", "x");
        let resolved = resolve("/", "bad.txt").unwrap();
        let err = engine
            .transfer(&remote, &mut record, &resolved)
            .await
            .unwrap_err();

        assert!(matches!(err, FileError::Write { .. }));
        assert!(!err.is_session_closed());
    }

    #[tokio::test]
    async fn windows_remote_directories_use_backslashes() {
        let remote = MemoryRemote::new();
        let cache = DirectoryCache::new();
        let config = config("/srv").with_platform(RemotePlatform::Windows);
        let (tx, _rx) = mpsc::channel(64);
        let engine = TransferEngine::new(&cache, &config, &tx);

        let mut record = FileRecord::from_bytes("site/index.html", "<html>");
        let resolved = resolve(&config.remote_path, &record.relative_path).unwrap();
        engine.transfer(&remote, &mut record, &resolved).await.unwrap();

        assert_eq!(remote.mkdir_calls(), vec!["\\srv", "\\srv\\site"]);
        assert!(cache.contains("/srv/site"));
        assert!(remote.file("/srv/site/index.html").is_some());
    }

    #[tokio::test]
    async fn cached_directories_are_not_probed_again() {
        let remote = MemoryRemote::new();
        let cache = DirectoryCache::new();
        let config = config("/");
        let (tx, _rx) = mpsc::channel(64);
        let engine = TransferEngine::new(&cache, &config, &tx);

        for name in ["a/1.txt", "a/2.txt"] {
            let mut record = FileRecord::from_bytes(name, "x");
            let resolved = resolve("/", name).unwrap();
            engine.transfer(&remote, &mut record, &resolved).await.unwrap();
        }

        assert_eq!(remote.mkdir_calls(), vec!["/a"]);
        assert_eq!(
            remote.count(|c| matches!(c, crate::memory::RemoteCall::Exists(_))),
            1
        );
    }

    #[tokio::test]
    async fn record_without_contents_touches_nothing() {
        let remote = MemoryRemote::new();
        let cache = DirectoryCache::new();
        let config = config("/var/www");
        let (tx, mut rx) = mpsc::channel(64);
        let engine = TransferEngine::new(&cache, &config, &tx);

        let mut record = FileRecord::null("a/dir");
        let resolved = resolve(&config.remote_path, &record.relative_path).unwrap();
        let bytes = engine.transfer(&remote, &mut record, &resolved).await.unwrap();

        assert_eq!(bytes, 0);
        assert!(remote.calls().is_empty());
        assert!(cache.is_empty());
        assert!(drain(&mut rx).is_empty());
    }
}
