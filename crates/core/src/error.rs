//! Error types for Concierge.
//!
//! This module defines a unified error enum that covers every failure the
//! orchestration layer can report: configuration, credentials, per-backend
//! failures, notification delivery, storage and templating.

use thiserror::Error;

/// Unified error type for Concierge.
///
/// Per-backend failures (`BackendTimeout`, `Backend`) are normally absorbed by
/// the orchestrator and recorded in its report map. `AuthUnavailable` is the
/// only backend-side failure that is surfaced to callers.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Credentials could not be obtained from the identity provider
    #[error("Authorization unavailable: {0}")]
    AuthUnavailable(String),

    /// A backend call exceeded its time budget
    #[error("Backend '{backend}' timed out")]
    BackendTimeout { backend: String },

    /// A backend returned an error or a malformed payload
    #[error("Backend '{backend}' failed: {message}")]
    Backend { backend: String, message: String },

    /// Handoff notification delivery errors
    #[error("Notify error: {0}")]
    Notify(String),

    /// Conversation log / session storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Message template errors
    #[error("Template error: {0}")]
    Template(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Build a `Backend` error for the given backend id.
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Whether this error means credentials could not be obtained.
    pub fn is_auth_unavailable(&self) -> bool {
        matches!(self, AppError::AuthUnavailable(_))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
