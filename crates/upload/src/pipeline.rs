//! Upload pipeline controller.
//!
//! Consumes file records, drives the transfer engine for each one over
//! the shared session, and releases the session at end of input.

use std::sync::{Arc, Mutex};

use futures_util::{Stream, StreamExt};
use sftpdeploy_transfer::{FileRecord, resolve};
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::cache::DirectoryCache;
use crate::config::PipelineConfig;
use crate::engine::TransferEngine;
use crate::error::{FileError, UploadError};
use crate::pool::SessionPool;
use crate::session::SessionConnector;
use crate::types::{FileOutcome, PipelineState, TransferOutcome, UploadEvent, UploadSummary};

/// Uploads every record of one run to a single host.
///
/// Holds the run's session pool and directory cache. A pipeline serves
/// exactly one run: once finished it rejects further files.
pub struct UploadPipeline {
    config: Arc<PipelineConfig>,
    pool: SessionPool,
    cache: DirectoryCache,
    state: Mutex<PipelineState>,
    summary: Mutex<UploadSummary>,
    run_id: Uuid,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
}

impl UploadPipeline {
    pub fn new(config: PipelineConfig, connector: Arc<dyn SessionConnector>) -> Self {
        let config = Arc::new(config);
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            pool: SessionPool::new(connector, Arc::clone(&config), events_tx.clone()),
            config,
            cache: DirectoryCache::new(),
            state: Mutex::new(PipelineState::Idle),
            summary: Mutex::new(UploadSummary::default()),
            run_id: Uuid::new_v4(),
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    pub fn state(&self) -> PipelineState {
        *lock(&self.state)
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Number of remote directories settled so far this run.
    pub fn cached_directories(&self) -> usize {
        self.cache.len()
    }

    /// Counts accumulated so far.
    pub fn summary(&self) -> UploadSummary {
        *lock(&self.summary)
    }

    /// Uploads one record.
    ///
    /// File-scoped failures are reported in the returned outcome and the
    /// pipeline stays usable. `Err` means the run cannot continue:
    /// the connection failed, the session closed abruptly, or the
    /// pipeline was already finished.
    pub async fn upload(&self, record: FileRecord) -> Result<FileOutcome, UploadError> {
        self.process(record).await.map_err(|aborted| aborted.error)
    }

    async fn process(&self, mut record: FileRecord) -> Result<FileOutcome, Aborted> {
        if let Err(error) = self.activate() {
            return Err(Aborted { record, error });
        }

        if record.is_null() {
            debug!(file = %record.relative_path, "no contents, passing through");
            lock(&self.summary).skipped += 1;
            return Ok(FileOutcome {
                record,
                outcome: TransferOutcome::Skipped,
            });
        }

        let resolved = match resolve(&self.config.remote_path, &record.relative_path) {
            Ok(resolved) => resolved,
            Err(e) => return Ok(self.file_failed(record, FileError::from(e))),
        };

        let session = match self.pool.acquire().await {
            Ok(session) => session,
            Err(error) => return Err(Aborted { record, error }),
        };
        let engine = TransferEngine::new(&self.cache, &self.config, &self.events_tx);

        match engine.transfer(session.as_ref(), &mut record, &resolved).await {
            Ok(bytes) => {
                let remote_path = resolved.target().to_string();
                if self.config.log_files {
                    info!(bytes, "Uploaded: {} => {}", record.relative_path, remote_path);
                }
                lock(&self.summary).uploaded += 1;
                self.emit(UploadEvent::Uploaded {
                    relative_path: record.relative_path.clone(),
                    remote_path: remote_path.clone(),
                    bytes,
                });
                Ok(FileOutcome {
                    record,
                    outcome: TransferOutcome::Uploaded { remote_path, bytes },
                })
            }
            Err(e) if e.is_session_closed() || (session.is_closed() && !self.pool.is_released()) => {
                error!(file = %record.relative_path, error = %e, "SFTP abrupt closure");
                self.pool.mark_broken().await;
                let failed = self.file_failed(record, e);
                Err(Aborted {
                    record: failed.record,
                    error: UploadError::AbruptClosure,
                })
            }
            Err(e) => Ok(self.file_failed(record, e)),
        }
    }

    /// Ends the run: releases the session, then reports the summary.
    pub async fn finish(&self) -> Result<UploadSummary, UploadError> {
        {
            let mut state = lock(&self.state);
            if *state == PipelineState::Closed {
                return Err(UploadError::Closed);
            }
            *state = PipelineState::Closed;
        }

        self.pool.release().await;

        let summary = self.summary();
        if summary.is_empty() {
            warn!(failed = summary.failed, "{summary}");
        } else {
            info!(
                uploaded = summary.uploaded,
                failed = summary.failed,
                "{summary}"
            );
        }
        self.emit(UploadEvent::Finished(summary));
        Ok(summary)
    }

    /// Drives a whole stream of records through the pipeline.
    ///
    /// Up to `max_in_flight` files are in progress at once over the one
    /// session. Each record is forwarded to `downstream` in arrival order
    /// once it reaches a terminal state, whatever the outcome. On a fatal
    /// error the record that hit it is still forwarded; the other
    /// in-flight transfers are dropped along with their records, the
    /// session is released and the error is returned without a summary.
    pub async fn run<S>(
        &self,
        files: S,
        downstream: Option<mpsc::Sender<FileRecord>>,
    ) -> Result<UploadSummary, UploadError>
    where
        S: Stream<Item = FileRecord> + Send,
    {
        let span = info_span!("upload", run_id = %self.run_id, host = %self.config.host);

        async move {
            info!(
                remote_path = %self.config.remote_path,
                platform = %self.config.platform,
                "starting upload"
            );

            let mut outcomes = Box::pin(
                files
                    .map(|record| self.process(record))
                    .buffered(self.config.max_in_flight.max(1)),
            );

            while let Some(result) = outcomes.next().await {
                match result {
                    Ok(outcome) => {
                        if let Some(tx) = &downstream {
                            if tx.send(outcome.record).await.is_err() {
                                debug!("downstream receiver dropped");
                            }
                        }
                    }
                    Err(Aborted { record, error }) => {
                        drop(outcomes);
                        error!(file = %record.relative_path, error = %error, "upload aborted");
                        if let Some(tx) = &downstream {
                            let _ = tx.send(record).await;
                        }
                        self.abort().await;
                        return Err(error);
                    }
                }
            }

            self.finish().await
        }
        .instrument(span)
        .await
    }

    /// Closes the pipeline after a fatal error.
    async fn abort(&self) {
        *lock(&self.state) = PipelineState::Closed;
        self.pool.release().await;
    }

    fn activate(&self) -> Result<(), UploadError> {
        let mut state = lock(&self.state);
        match *state {
            PipelineState::Closed => Err(UploadError::Closed),
            PipelineState::Idle => {
                debug!(run_id = %self.run_id, "pipeline active");
                *state = PipelineState::Active;
                Ok(())
            }
            PipelineState::Active => Ok(()),
        }
    }

    fn file_failed(&self, record: FileRecord, error: FileError) -> FileOutcome {
        let message = error.to_string();
        warn!(file = %record.relative_path, error = %message, "upload failed");
        lock(&self.summary).failed += 1;
        self.emit(UploadEvent::Failed {
            relative_path: record.relative_path.clone(),
            error: message.clone(),
        });
        FileOutcome {
            record,
            outcome: TransferOutcome::Failed(message),
        }
    }

    fn emit(&self, event: UploadEvent) {
        let _ = self.events_tx.try_send(event);
    }
}

/// A fatal error and the record being processed when it happened.
struct Aborted {
    record: FileRecord,
    error: UploadError,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthMethod;
    use crate::memory::{MemoryConnector, MemoryRemote};

    fn pipeline(connector: Arc<MemoryConnector>) -> UploadPipeline {
        let config = PipelineConfig::new("deploy.example", AuthMethod::Password("pw".into()))
            .with_remote_path("/var/www");
        UploadPipeline::new(config, connector)
    }

    #[tokio::test]
    async fn state_transitions() {
        let connector = Arc::new(MemoryConnector::new(MemoryRemote::new()));
        let pipeline = pipeline(connector);
        assert_eq!(pipeline.state(), PipelineState::Idle);

        pipeline
            .upload(FileRecord::from_bytes("a.txt", "a"))
            .await
            .unwrap();
        assert_eq!(pipeline.state(), PipelineState::Active);

        let summary = pipeline.finish().await.unwrap();
        assert_eq!(summary.uploaded, 1);
        assert_eq!(pipeline.state(), PipelineState::Closed);
    }

    #[tokio::test]
    async fn files_after_finish_are_rejected() {
        let connector = Arc::new(MemoryConnector::new(MemoryRemote::new()));
        let pipeline = pipeline(connector);
        pipeline.finish().await.unwrap();

        let result = pipeline.upload(FileRecord::from_bytes("late.txt", "x")).await;
        assert!(matches!(result, Err(UploadError::Closed)));
        assert!(matches!(pipeline.finish().await, Err(UploadError::Closed)));
    }

    #[tokio::test]
    async fn null_records_pass_through_without_connecting() {
        let connector = Arc::new(MemoryConnector::new(MemoryRemote::new()));
        let pipeline = pipeline(connector.clone());

        let outcome = pipeline.upload(FileRecord::null("assets")).await.unwrap();
        assert_eq!(outcome.outcome, TransferOutcome::Skipped);
        assert_eq!(outcome.record.relative_path, "assets");
        assert_eq!(connector.connect_count(), 0);

        let summary = pipeline.finish().await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.to_string(), "No files uploaded");
    }

    #[tokio::test]
    async fn escaping_path_fails_only_that_file() {
        let remote = MemoryRemote::new();
        let connector = Arc::new(MemoryConnector::new(remote.clone()));
        let pipeline = pipeline(connector.clone());

        let bad = pipeline
            .upload(FileRecord::from_bytes("../etc/passwd", "x"))
            .await
            .unwrap();
        assert!(matches!(bad.outcome, TransferOutcome::Failed(_)));
        assert_eq!(connector.connect_count(), 0);

        let good = pipeline
            .upload(FileRecord::from_bytes("ok.txt", "x"))
            .await
            .unwrap();
        assert!(good.is_success());
        assert!(remote.file("/var/www/ok.txt").is_some());
    }

    #[tokio::test]
    async fn connection_failure_is_fatal() {
        let connector = Arc::new(MemoryConnector::failing("bad password"));
        let pipeline = pipeline(connector);

        let result = pipeline.upload(FileRecord::from_bytes("a.txt", "a")).await;
        assert!(matches!(result, Err(UploadError::Connection(msg)) if msg.contains("bad password")));
    }

    #[tokio::test]
    async fn severed_session_is_abrupt_closure() {
        let remote = MemoryRemote::new();
        remote.sever_on_create("/var/www/b.txt");
        let connector = Arc::new(MemoryConnector::new(remote.clone()));
        let pipeline = pipeline(connector);

        pipeline
            .upload(FileRecord::from_bytes("a.txt", "a"))
            .await
            .unwrap();
        let result = pipeline.upload(FileRecord::from_bytes("b.txt", "b")).await;
        assert!(matches!(result, Err(UploadError::AbruptClosure)));

        let later = pipeline.upload(FileRecord::from_bytes("c.txt", "c")).await;
        assert!(matches!(later, Err(UploadError::AbruptClosure)));
    }

    #[tokio::test]
    async fn events_report_upload_and_summary() {
        let connector = Arc::new(MemoryConnector::new(MemoryRemote::new()));
        let mut pipeline = pipeline(connector);
        let mut events = pipeline.take_events().unwrap();
        assert!(pipeline.take_events().is_none());

        pipeline
            .upload(FileRecord::from_bytes("a/x.txt", "x"))
            .await
            .unwrap();
        pipeline.finish().await.unwrap();

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }

        assert!(matches!(seen.first(), Some(UploadEvent::Connected { host }) if host == "deploy.example"));
        assert!(seen.contains(&UploadEvent::Uploaded {
            relative_path: "a/x.txt".into(),
            remote_path: "/var/www/a/x.txt".into(),
            bytes: 1,
        }));
        assert!(matches!(
            seen.last(),
            Some(UploadEvent::Finished(summary)) if summary.uploaded == 1
        ));
    }
}
