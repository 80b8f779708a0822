//! Gateway error taxonomy
//!
//! Every failure surfaced to the dispatcher is one of these variants, so a
//! caller can always tell a credentials problem from a rejected request or a
//! local file problem.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by the connection manager and the operation set
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No usable credentials were found while connecting
    #[error("AWS credentials not available: {0}")]
    CredentialsUnavailable(String),

    /// The reachability check failed for a reason other than credentials
    #[error("Failed to connect to S3: {0}")]
    ConnectionFailed(String),

    /// The backend rejected a well-formed request
    #[error("{operation} failed: {code}: {message}")]
    BackendRequest {
        operation: &'static str,
        code: String,
        message: String,
    },

    /// Reading or writing a local file failed
    #[error("Local file error for {}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The response held data that cannot be rendered as JSON text
    #[error("Failed to serialize response: {0}")]
    Serialization(String),

    /// The dispatcher passed an unknown operation or malformed arguments
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl GatewayError {
    /// Stable machine-readable kind of this error
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::CredentialsUnavailable(_) => "credentials_unavailable",
            GatewayError::ConnectionFailed(_) => "connection_failed",
            GatewayError::BackendRequest { .. } => "backend_request_error",
            GatewayError::LocalIo { .. } => "local_io_error",
            GatewayError::Serialization(_) => "serialization_error",
            GatewayError::InvalidArgument(_) => "invalid_argument",
        }
    }

    /// Backend error code, when the backend supplied one
    pub fn backend_code(&self) -> Option<&str> {
        match self {
            GatewayError::BackendRequest { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn local_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GatewayError::LocalIo {
            path: path.into(),
            source,
        }
    }

    /// Structured form handed back to the dispatcher
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind().to_string(),
            message: self.to_string(),
        }
    }
}

/// Kind + message pair serialized into failed replies
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub kind: String,
    pub message: String,
}

pub type Result<T> = std::result::Result<T, GatewayError>;
