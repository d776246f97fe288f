//! Error types for the Reverie journaling core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A shared error type for the whole journaling core.
///
/// This provides typed, structured error variants with automatic
/// conversion from common error types via the `From` trait. Query
/// misses are deliberately *not* errors anywhere in the core; lookups
/// return `Ok(None)` and `NotFound` is reserved for operations that
/// require the target to exist.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum ReverieError {
    /// An operation was called before its component was initialized.
    #[error("{component} is not initialized")]
    NotInitialized { component: &'static str },

    /// Entity required by the operation does not exist.
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// `add` was called for a key that already exists.
    #[error("Entity already exists: {entity_type} '{id}'")]
    AlreadyExists {
        entity_type: &'static str,
        id: String,
    },

    /// IO error (file system operations).
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Authenticated decryption failed: wrong key or corrupted data.
    /// This is the sole feedback mechanism for "wrong password".
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// The remote analysis collaborator could not be reached or refused
    /// the call (network, credential, or rate-limit failure).
    #[error("Remote analysis unavailable: {0}")]
    RemoteUnavailable(String),

    /// The remote analysis collaborator answered with a payload that
    /// does not match the expected schema.
    #[error("Malformed remote response: {0}")]
    MalformedRemoteResponse(String),

    /// Internal error (should not happen in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReverieError {
    /// Creates a NotInitialized error for the named component.
    pub fn not_initialized(component: &'static str) -> Self {
        Self::NotInitialized { component }
    }

    /// Creates a NotFound error.
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates an AlreadyExists error.
    pub fn already_exists(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates an IO error.
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a Decryption error.
    pub fn decryption(message: impl Into<String>) -> Self {
        Self::Decryption(message.into())
    }

    /// Creates an Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this is a NotInitialized error.
    pub fn is_not_initialized(&self) -> bool {
        matches!(self, Self::NotInitialized { .. })
    }

    /// Check if this is a NotFound error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a Decryption error.
    pub fn is_decryption(&self) -> bool {
        matches!(self, Self::Decryption(_))
    }

    /// Check if this error is recoverable by falling back to the local
    /// analysis path.
    pub fn is_remote_failure(&self) -> bool {
        matches!(
            self,
            Self::RemoteUnavailable(_) | Self::MalformedRemoteResponse(_)
        )
    }
}

impl From<std::io::Error> for ReverieError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for ReverieError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// A type alias for `Result<T, ReverieError>`.
pub type Result<T> = std::result::Result<T, ReverieError>;
