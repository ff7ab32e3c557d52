//! Error types for catalog loading.

/// Errors from catalog load/refresh operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("database pool error: {0}")]
    Pool(String),

    #[error("catalog query failed: {0}")]
    Query(String),
}

/// Result alias for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;
