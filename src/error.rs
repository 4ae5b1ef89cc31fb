//! Error types for the ChainDB client.

use crate::types::DocId;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// What went wrong in a failed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistFailure {
    /// The server refused the document content.
    Validation,
    /// The server refused the write for another reason.
    Rejected,
    /// The request never got a reply.
    Transport,
    Timeout,
    Auth,
    /// The reply could not be understood.
    Protocol,
}

impl fmt::Display for PersistFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PersistFailure::Validation => "validation",
            PersistFailure::Rejected => "rejected",
            PersistFailure::Transport => "transport",
            PersistFailure::Timeout => "timeout",
            PersistFailure::Auth => "auth",
            PersistFailure::Protocol => "protocol",
        };
        f.write_str(name)
    }
}

/// Main error type for client operations.
#[derive(Debug, Error)]
pub enum ChainDbError {
    /// Network or connection failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status without a more specific mapping.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Server rejected the document content.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Identifier or table absent on the server.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A persist or update did not take effect.
    #[error("Persist error ({kind}): {message}")]
    Persist { kind: PersistFailure, message: String },

    /// Bounded wait exceeded.
    #[error("Timed out after {elapsed:?}: {operation}")]
    Timeout { operation: String, elapsed: Duration },

    /// Reconnection budget exhausted.
    #[error("Event channel lost after {attempts} reconnect attempts")]
    ConnectionLost { attempts: u32 },

    /// Credential handshake failed or credentials were refused.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Server returned a document bound to a different identifier.
    #[error("Identifier mismatch: expected {expected}, got {got:?}")]
    IdentifierMismatch { expected: DocId, got: Option<DocId> },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Server response did not have the expected shape.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Server refused a read request.
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid table name: {0:?}")]
    InvalidTableName(String),
}

impl ChainDbError {
    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ChainDbError::Transport(_) | ChainDbError::Timeout { .. } => true,
            ChainDbError::Http { status, .. } => *status >= 500,
            ChainDbError::Persist { kind, .. } => {
                matches!(kind, PersistFailure::Transport | PersistFailure::Timeout)
            }
            _ => false,
        }
    }

    /// The failure kind of a `Persist` error.
    pub fn persist_failure(&self) -> Option<PersistFailure> {
        match self {
            ChainDbError::Persist { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Server refused a write; used as a rejection fallback.
    pub(crate) fn persist_rejected(message: String) -> Self {
        ChainDbError::Persist {
            kind: PersistFailure::Rejected,
            message,
        }
    }

    /// Fold any failure of a write into `Persist`, keeping its category
    /// as the failure kind.
    pub(crate) fn into_persist(self) -> Self {
        let (kind, message) = match self {
            ChainDbError::Persist { .. } => return self,
            ChainDbError::Validation(m) => (PersistFailure::Validation, m),
            ChainDbError::Auth(m) => (PersistFailure::Auth, m),
            ChainDbError::Transport(m) => (PersistFailure::Transport, m),
            ChainDbError::Timeout { .. } => (PersistFailure::Timeout, self.to_string()),
            ChainDbError::Http { status, .. } if status >= 500 => {
                (PersistFailure::Transport, self.to_string())
            }
            ChainDbError::Deserialization(_)
            | ChainDbError::Protocol(_)
            | ChainDbError::IdentifierMismatch { .. } => (PersistFailure::Protocol, self.to_string()),
            other => (PersistFailure::Rejected, other.to_string()),
        };
        ChainDbError::Persist { kind, message }
    }

    /// Map an HTTP status to the error taxonomy.
    pub(crate) fn from_status(status: u16, message: String) -> Self {
        match status {
            404 => ChainDbError::NotFound(message),
            400 | 422 => ChainDbError::Validation(message),
            401 | 403 => ChainDbError::Auth(message),
            _ => ChainDbError::Http { status, message },
        }
    }

    /// Classify a `success: false` envelope message.
    ///
    /// The server reports rejections as free text, so the category is
    /// recovered from the wording and otherwise left to `fallback`.
    pub(crate) fn classify_rejection(
        message: String,
        fallback: fn(String) -> ChainDbError,
    ) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("not found") || lower.contains("does not exist") {
            ChainDbError::NotFound(message)
        } else if lower.contains("invalid")
            || lower.contains("validation")
            || lower.contains("schema")
        {
            ChainDbError::Validation(message)
        } else {
            fallback(message)
        }
    }
}

impl From<serde_json::Error> for ChainDbError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            ChainDbError::Deserialization(e.to_string())
        } else {
            ChainDbError::Serialization(e.to_string())
        }
    }
}

impl From<reqwest::Error> for ChainDbError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ChainDbError::Timeout {
                operation: e
                    .url()
                    .map(|u| u.path().to_string())
                    .unwrap_or_else(|| "request".to_string()),
                elapsed: Duration::ZERO,
            }
        } else if let Some(status) = e.status() {
            ChainDbError::from_status(status.as_u16(), e.to_string())
        } else if e.is_decode() {
            ChainDbError::Deserialization(e.to_string())
        } else {
            ChainDbError::Transport(e.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ChainDbError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match e {
            WsError::Http(response) => {
                let status = response.status().as_u16();
                ChainDbError::from_status(status, "event channel handshake refused".to_string())
            }
            other => ChainDbError::Transport(other.to_string()),
        }
    }
}

impl From<url::ParseError> for ChainDbError {
    fn from(e: url::ParseError) -> Self {
        ChainDbError::InvalidConfig(format!("invalid server URL: {e}"))
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ChainDbError>;
