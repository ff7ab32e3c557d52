//! Error types for credential acquisition.

/// Errors from identity/credential operations (C2).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("identity provider unavailable: {0}")]
    IdentityUnavailable(String),

    #[error("identity provider rejected request: {0}")]
    IdentityUnauthorized(String),

    #[error("identity acquisition timed out: {0}")]
    IdentityTimeout(String),

    #[error("identity provider returned a malformed token: {0}")]
    IdentityMalformedToken(String),
}

/// Result alias for identity operations.
pub type Result<T> = std::result::Result<T, Error>;
