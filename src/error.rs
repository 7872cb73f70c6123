//! Error types for batch transfer operations.

use std::fmt;
use thiserror::Error;

/// Classification of a failed remote filesystem call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// The path does not exist on the remote side
    NotFound,
    /// The server refused the operation
    PermissionDenied,
    /// Anything else reported by the protocol layer
    Other,
}

/// A failure reported by a [`RemoteChannel`](crate::remote::RemoteChannel) call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(path: &str) -> Self {
        Self::new(RemoteErrorKind::NotFound, format!("No such file: '{}'", path))
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Other, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == RemoteErrorKind::NotFound
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RemoteError {}

/// Main error type for transfer operations.
#[derive(Error, Debug)]
pub enum TransferError {
    /// Builder input rejected (blank host, unparsable port, ...)
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Session or channel setup failed
    #[error("Failed to connect to {host}:{port}: {message}")]
    ConnectFailure {
        host: String,
        port: u16,
        message: String,
    },

    /// A listing/stat/transfer/remove/mkdir call failed
    #[error("Protocol error: {0}")]
    Protocol(#[from] RemoteError),

    /// The aggregate wait exceeded the effective timeout
    #[error("Upload of {files} files timed out after {timeout_secs} seconds!")]
    TransferTimeout { files: usize, timeout_secs: u64 },

    /// The waiting caller was interrupted
    #[error("Interrupted while waiting for tasks to finish")]
    InterruptedWait,

    /// A task observed the worker stop signal
    #[error("Task cancelled")]
    Cancelled,

    /// Local IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    /// Create a ConnectFailure error
    pub fn connect(host: impl Into<String>, port: u16, message: impl fmt::Display) -> Self {
        TransferError::ConnectFailure {
            host: host.into(),
            port,
            message: message.to_string(),
        }
    }

    /// Returns true if this wraps a remote "not found" failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransferError::Protocol(e) if e.is_not_found())
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_carries_context() {
        let err = TransferError::TransferTimeout {
            files: 3,
            timeout_secs: 10800,
        };
        assert_eq!(
            err.to_string(),
            "Upload of 3 files timed out after 10800 seconds!"
        );
    }

    #[test]
    fn test_not_found_detection() {
        let err: TransferError = RemoteError::not_found("a/b").into();
        assert!(err.is_not_found());

        let err: TransferError = RemoteError::other("boom").into();
        assert!(!err.is_not_found());
        assert!(!TransferError::Cancelled.is_not_found());
    }
}
