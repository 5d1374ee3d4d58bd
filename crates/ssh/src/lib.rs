//! SSH/SFTP backend for the upload pipeline.
//!
//! [`SftpConnector`] opens one authenticated connection with one SFTP
//! sub-session per call, using `russh` and `russh-sftp`. The resulting
//! [`SftpRemote`] implements the pipeline's `RemoteSession` trait.

mod connector;
mod error;
mod handler;
mod remote;

pub use connector::SftpConnector;
pub use remote::SftpRemote;
