//! Error types for Hazelcast client operations.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::protocol::ErrorCode;

/// An application error reported by a cluster member in an error response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    code: ErrorCode,
    class_name: String,
    message: Option<String>,
}

impl RemoteError {
    /// Creates a new remote error.
    pub fn new(code: ErrorCode, class_name: impl Into<String>, message: Option<String>) -> Self {
        Self {
            code,
            class_name: class_name.into(),
            message,
        }
    }

    /// Returns the protocol error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Returns the server-side class name of the error.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Returns the error message, if the server sent one.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns `true` if the error code belongs to the retryable set.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{} ({:?}): {}", self.class_name, self.code, message),
            None => write!(f, "{} ({:?})", self.class_name, self.code),
        }
    }
}

/// The main error type for Hazelcast operations.
#[derive(Debug, Error)]
pub enum HazelcastError {
    /// Connection-related errors (network failures, disconnections).
    #[error("connection error: {0}")]
    Connection(String),

    /// A pending request failed because its connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// A request was sent on a connection that is no longer active.
    #[error("client not active: {0}")]
    ClientNotActive(String),

    /// No live connection could be found for a request.
    #[error("no connection: {0}")]
    NoConnection(String),

    /// Connecting to the cluster failed on every candidate address.
    #[error("unable to connect to the cluster, tried {addresses:?}: {}", .failures.join("; "))]
    ClusterUnreachable {
        /// Every address that was tried.
        addresses: Vec<SocketAddr>,
        /// Every per-address failure, in the order they occurred.
        failures: Vec<String>,
    },

    /// Protocol-related errors (invalid messages, unsupported versions).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Operation timeout errors.
    #[error("timeout error: {0}")]
    Timeout(String),

    /// The operation observed a cancellation signal.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// Authentication errors (invalid credentials, failed login).
    #[error("authentication error: {0}")]
    Authentication(String),

    /// Configuration errors (invalid settings).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An error reported by a cluster member.
    #[error("remote error: {0}")]
    Remote(RemoteError),

    /// I/O errors from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl HazelcastError {
    /// Returns `true` if the failure was a local connection loss rather than
    /// an application error.
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::ConnectionClosed(_) | Self::ClientNotActive(_) | Self::Io(_)
        )
    }

    /// Returns `true` if an invocation that failed with this error may be
    /// sent again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Remote(remote) => remote.is_retryable(),
            other => other.is_connection_loss(),
        }
    }
}

impl From<RemoteError> for HazelcastError {
    fn from(error: RemoteError) -> Self {
        Self::Remote(error)
    }
}

/// A specialized `Result` type for Hazelcast operations.
pub type Result<T> = std::result::Result<T, HazelcastError>;
