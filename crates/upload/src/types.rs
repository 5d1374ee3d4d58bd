//! Data types for the upload flow.

use std::fmt;

use sftpdeploy_transfer::FileRecord;

/// Lifecycle of an [`UploadPipeline`](crate::UploadPipeline).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No file received yet.
    Idle,
    /// Accepting files. The session may or may not exist yet.
    Active,
    /// End of input observed and session released.
    Closed,
}

/// Event emitted during an upload run.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// The shared session is ready.
    Connected { host: String },
    /// A remote directory was created.
    DirectoryCreated { path: String },
    /// A remote directory could not be created. Non-fatal.
    DirectoryFailed { path: String, error: String },
    /// Bytes written for one file changed its whole percentage.
    Progress {
        remote_path: String,
        bytes: u64,
        percent: u8,
        bytes_per_second: f64,
    },
    /// A file was written and closed.
    Uploaded {
        relative_path: String,
        remote_path: String,
        bytes: u64,
    },
    /// A file failed. The run continues.
    Failed { relative_path: String, error: String },
    /// The run completed and the session was released.
    Finished(UploadSummary),
}

/// Final counts of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub uploaded: usize,
    pub failed: usize,
    /// Null records passed through without upload.
    pub skipped: usize,
}

impl UploadSummary {
    pub fn is_empty(&self) -> bool {
        self.uploaded == 0
    }
}

impl fmt::Display for UploadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.uploaded {
            0 => f.write_str("No files uploaded"),
            1 => f.write_str("1 file uploaded successfully"),
            n => write!(f, "{n} files uploaded successfully"),
        }
    }
}

/// How one file ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Uploaded { remote_path: String, bytes: u64 },
    Failed(String),
    /// Null record, forwarded without upload.
    Skipped,
}

/// A processed record together with its outcome.
///
/// The record is handed back so it can be forwarded downstream.
#[derive(Debug)]
pub struct FileOutcome {
    pub record: FileRecord,
    pub outcome: TransferOutcome,
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TransferOutcome::Uploaded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_messages() {
        let none = UploadSummary::default();
        assert_eq!(none.to_string(), "No files uploaded");
        assert!(none.is_empty());

        let one = UploadSummary {
            uploaded: 1,
            ..Default::default()
        };
        assert_eq!(one.to_string(), "1 file uploaded successfully");

        let many = UploadSummary {
            uploaded: 12,
            failed: 3,
            skipped: 0,
        };
        assert_eq!(many.to_string(), "12 files uploaded successfully");
    }

    #[test]
    fn failures_alone_still_mean_no_files_uploaded() {
        let summary = UploadSummary {
            uploaded: 0,
            failed: 4,
            skipped: 1,
        };
        assert_eq!(summary.to_string(), "No files uploaded");
    }
}
