//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including validation failures, invalid state transitions, and the
//! classification of failures reported by remote collaborators.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid local path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Object key that cannot be mapped onto the local tree
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}

/// Classified failures returned by the remote authority and object storage
///
/// Adapters wrap these in `anyhow::Error`; callers that need to react to a
/// specific kind (authorization expiry in particular) recover them with
/// [`RemoteError::from_anyhow`] or [`is_auth_failure`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The bearer token was rejected (HTTP 401/403)
    #[error("Unauthorized (HTTP {status}): {message}")]
    Unauthorized {
        /// HTTP status code returned
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// The requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other non-success HTTP status
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code returned
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// A network-level failure (connect, reset, timeout)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The response body could not be parsed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Maps an HTTP status and body into the matching variant
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => RemoteError::Unauthorized { status, message },
            404 => RemoteError::NotFound(message),
            _ => RemoteError::Status { status, message },
        }
    }

    /// Returns true if this error means the session credentials are no longer valid
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RemoteError::Unauthorized { .. })
    }

    /// Finds a `RemoteError` anywhere in an `anyhow` error chain
    pub fn from_anyhow(err: &anyhow::Error) -> Option<&RemoteError> {
        err.chain().find_map(|cause| cause.downcast_ref::<RemoteError>())
    }
}

/// Returns true if the error chain contains an authorization failure
pub fn is_auth_failure(err: &anyhow::Error) -> bool {
    RemoteError::from_anyhow(err).is_some_and(RemoteError::is_unauthorized)
}
