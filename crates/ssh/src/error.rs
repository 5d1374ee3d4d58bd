//! Mapping of russh errors onto [`SessionError`].

use russh_sftp::client::error::Error as SftpError;
use russh_sftp::protocol::StatusCode;
use sftpdeploy_upload::SessionError;

/// Classifies an SSH transport error raised while connecting.
pub(crate) fn map_ssh(e: russh::Error) -> SessionError {
    match e {
        russh::Error::UnknownKey | russh::Error::KeyChanged { .. } => {
            SessionError::HostKey(e.to_string())
        }
        russh::Error::NotAuthenticated => SessionError::Auth(e.to_string()),
        russh::Error::Disconnect | russh::Error::HUP => SessionError::Closed,
        russh::Error::IO(io) => SessionError::Connect(io.to_string()),
        other => SessionError::Connect(other.to_string()),
    }
}

/// Messages russh-sftp uses once the sub-session channel is gone, even
/// while the SSH connection itself stays up.
const SESSION_END_MESSAGES: [&str; 2] = ["session closed", "sender dropped"];

/// Whether an error message reports the end of the SFTP sub-session.
pub(crate) fn is_session_end(message: &str) -> bool {
    SESSION_END_MESSAGES.iter().any(|m| message.contains(m))
}

/// Classifies an SFTP request error for `path`.
pub(crate) fn map_sftp(path: &str, e: SftpError) -> SessionError {
    match e {
        SftpError::UnexpectedBehavior(ref message) if is_session_end(message) => {
            SessionError::Closed
        }
        SftpError::Status(status) => match status.status_code {
            StatusCode::NoSuchFile => SessionError::NotFound(path.to_string()),
            StatusCode::PermissionDenied => SessionError::PermissionDenied(path.to_string()),
            StatusCode::NoConnection | StatusCode::ConnectionLost => SessionError::Closed,
            code => SessionError::Protocol(format!(
                "{path}: {code:?} {}",
                status.error_message
            )),
        },
        SftpError::IO(message) => SessionError::Io(std::io::Error::other(message)),
        other => SessionError::Protocol(format!("{path}: {other}")),
    }
}
