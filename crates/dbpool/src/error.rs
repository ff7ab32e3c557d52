//! Error types for pool management operations.

/// Errors from pool manager operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("database connection failed: {0}")]
    ConnectionLost(String),

    #[error("database operation timed out: {0}")]
    Timeout(String),

    #[error("database authentication failed: {0}")]
    AuthFailed(String),

    #[error("pool not initialized")]
    NotInitialized,

    #[error("pool rotation failed, previous pool remains in service: {0}")]
    RotationFailed(String),
}

/// Result alias for pool manager operations.
pub type Result<T> = std::result::Result<T, Error>;
