//! Error types for the authorization engine

use thiserror::Error;

/// Authorization engine errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Malformed check request, rejected before evaluation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid policy definition
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// Candidate policy set rejected during reload
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Policy store failure (fetch, connection)
    #[error("Policy store error: {0}")]
    Store(String),

    /// Hot-reload configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthzError {
    /// True for errors caused by the caller's input rather than the engine
    pub fn is_client_error(&self) -> bool {
        matches!(self, AuthzError::InvalidRequest(_))
    }
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
