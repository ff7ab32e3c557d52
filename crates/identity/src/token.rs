//! Bearer token — an opaque secret plus an absolute expiry.
//!
//! Expiry is tracked with `Instant` (monotonic) rather than a wall-clock
//! timestamp, so a system clock step never manufactures a spurious expiry
//! or a spurious extra lifetime.

use std::time::{Duration, Instant};

use common::Secret;

/// A sentinel TTL used for credentials that never expire on their own
/// (static passwords, secret-store reads) — rotation of these is a no-op.
pub const FAR_FUTURE_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// An acquired bearer token, redacted in `Debug`/`Display` via `Secret`.
#[derive(Debug, Clone)]
pub struct Token {
    value: Secret<String>,
    expires_at: Instant,
}

impl Token {
    pub fn new(value: impl Into<String>, ttl: Duration) -> Self {
        Self {
            value: Secret::new(value.into()),
            expires_at: Instant::now() + ttl,
        }
    }

    /// Construct a token already expired, for tests exercising the
    /// refresh path.
    #[cfg(test)]
    pub fn expired(value: impl Into<String>) -> Self {
        Self {
            value: Secret::new(value.into()),
            expires_at: Instant::now() - Duration::from_secs(1),
        }
    }

    pub fn value(&self) -> &str {
        self.value.expose()
    }

    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// Whether strictly more than `min_ttl` remains before expiry.
    ///
    /// Strict, per the boundary behavior that a token expiring at exactly
    /// `now + min_ttl` must be treated as absent, not valid.
    pub fn has_min_ttl(&self, min_ttl: Duration) -> bool {
        self.remaining() > min_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_has_min_ttl() {
        let token = Token::new("abc", Duration::from_secs(120));
        assert!(token.has_min_ttl(Duration::from_secs(60)));
    }

    #[test]
    fn expired_token_lacks_min_ttl() {
        let token = Token::expired("abc");
        assert!(!token.has_min_ttl(Duration::from_secs(1)));
        assert_eq!(token.remaining(), Duration::ZERO);
    }

    #[test]
    fn value_round_trips() {
        let token = Token::new("secret-value", Duration::from_secs(10));
        assert_eq!(token.value(), "secret-value");
    }

    #[test]
    fn debug_redacts_value() {
        let token = Token::new("super-secret", Duration::from_secs(10));
        let debug = format!("{token:?}");
        assert!(!debug.contains("super-secret"));
    }

    /// A token expiring at exactly `now + min_ttl` is absent, not present —
    /// the boundary is a strict inequality, not `>=`.
    #[test]
    fn expiry_exactly_at_min_ttl_boundary_is_not_valid() {
        let token = Token::new("abc", Duration::from_secs(60));
        assert!(!token.has_min_ttl(token.remaining()));
    }
}
