//! Application error model
//!
//! Defines a typed error hierarchy using `thiserror`. Variants follow the
//! severity split of the export run: connection and folder-listing failures
//! abort the run, while search, fetch, render and write failures are scoped
//! to a single folder, message or artifact and are recovered by the pipeline.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Underlying reason a connection attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailure {
    /// Host name could not be resolved
    Dns,
    /// TCP connection refused or unreachable
    Refused,
    /// TLS handshake or STARTTLS negotiation failed
    Tls,
    /// Server rejected the credentials
    AuthRejected,
    /// A connection phase exceeded its time bound
    Timeout,
    /// Greeting missing or other protocol-level failure
    Protocol,
}

impl fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Dns => "dns failure",
            Self::Refused => "connection refused",
            Self::Tls => "tls negotiation failure",
            Self::AuthRejected => "authentication rejected",
            Self::Timeout => "timeout",
            Self::Protocol => "protocol error",
        };
        f.write_str(label)
    }
}

/// Failure to establish an authenticated IMAP session
#[derive(Debug, Clone, Error)]
#[error("{cause}: {detail}")]
pub struct ConnectionError {
    pub cause: ConnectFailure,
    pub detail: String,
}

impl ConnectionError {
    pub fn new(cause: ConnectFailure, detail: impl Into<String>) -> Self {
        Self {
            cause,
            detail: detail.into(),
        }
    }
}

/// The three exported representations of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Raw,
    Text,
    Document,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Raw => "raw message",
            Self::Text => "text",
            Self::Document => "document",
        })
    }
}

/// Application error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid configuration or user input
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Could not connect or authenticate (fatal)
    #[error("connection failed: {0}")]
    Connection(#[from] ConnectionError),
    /// Server-level folder listing failed (fatal in all-folders mode)
    #[error("folder listing failed: {0}")]
    FolderList(String),
    /// A folder could not be selected or searched (folder is skipped)
    #[error("search failed in folder '{folder}': {reason}")]
    Search { folder: String, reason: String },
    /// A single message could not be fetched or parsed (message is skipped)
    #[error("fetch failed for message uid {uid}: {reason}")]
    Fetch { uid: u32, reason: String },
    /// One artifact of a message could not be written
    #[error("failed writing {artifact} artifact {}: {reason}", path.display())]
    Write {
        artifact: ArtifactKind,
        path: PathBuf,
        reason: String,
    },
    /// The document renderer failed for a message
    #[error("document rendering failed: {0}")]
    Render(String),
    /// Unexpected failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Convenience constructor for `InvalidInput`
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Process exit status for an error that aborted the run
    ///
    /// - `InvalidInput` → 2
    /// - everything else → 1
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidInput(_) => 2,
            _ => 1,
        }
    }
}

/// Type alias for fallible return values
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::{AppError, ConnectFailure, ConnectionError};

    #[test]
    fn connection_error_display_includes_cause() {
        let err = AppError::from(ConnectionError::new(ConnectFailure::AuthRejected, "NO LOGIN"));
        assert_eq!(
            err.to_string(),
            "connection failed: authentication rejected: NO LOGIN"
        );
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn invalid_input_maps_to_usage_exit_code() {
        assert_eq!(AppError::invalid("bad date").exit_code(), 2);
    }
}
