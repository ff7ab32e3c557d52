//! Token cache (C1) — thread-safe holder for one bearer token plus expiry.
//!
//! Two lock flavors share the same state shape: [`BlockingCache`] for
//! startup code that runs before the runtime is driving request handlers,
//! and [`AsyncCache`] for the request path. The async flavor exposes
//! `*_unlocked` variants so a caller that already holds the lock (C2's
//! single-flight acquisition) can check-then-act without a second lock
//! acquisition or releasing it across the acquisition call.

use std::time::{Duration, Instant};

use crate::token::Token;

/// Cache contents, shared by both lock flavors.
#[derive(Default)]
pub struct CacheState {
    token: Option<Token>,
    last_success_at: Option<Instant>,
    last_error: Option<(String, Instant)>,
}

impl CacheState {
    fn get_if_valid(&self, min_ttl: Duration) -> Option<Token> {
        self.token
            .as_ref()
            .filter(|t| t.has_min_ttl(min_ttl))
            .cloned()
    }

    fn set(&mut self, token: Token) {
        self.token = Some(token);
        self.last_success_at = Some(Instant::now());
    }

    fn invalidate(&mut self) {
        self.token = None;
    }

    fn ttl(&self) -> Option<Duration> {
        self.token.as_ref().map(Token::remaining)
    }

    fn record_error(&mut self, error: String) {
        self.last_error = Some((error, Instant::now()));
    }

    pub fn last_success_at(&self) -> Option<Instant> {
        self.last_success_at
    }

    pub fn last_error(&self) -> Option<&(String, Instant)> {
        self.last_error.as_ref()
    }
}

/// `std::sync::Mutex`-backed cache for synchronous startup-time callers.
#[derive(Default)]
pub struct BlockingCache {
    state: std::sync::Mutex<CacheState>,
}

impl BlockingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_if_valid(&self, min_ttl: Duration) -> Option<Token> {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get_if_valid(min_ttl)
    }

    pub fn set(&self, token: Token) {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .set(token);
    }

    pub fn invalidate(&self) {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .invalidate();
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).ttl()
    }
}

/// `tokio::sync::Mutex`-backed cache for the request path.
///
/// The guard returned by [`AsyncCache::lock`] may be held across await
/// points, which is exactly what C2 relies on to single-flight
/// acquisition: the provider locks once, rechecks validity, and — if the
/// token must be refreshed — performs the (possibly slow) acquisition
/// while still holding the guard, so every other caller queues on the same
/// lock instead of triggering a duplicate acquisition.
#[derive(Default)]
pub struct AsyncCache {
    state: tokio::sync::Mutex<CacheState>,
}

impl AsyncCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_if_valid(&self, min_ttl: Duration) -> Option<Token> {
        self.state.lock().await.get_if_valid(min_ttl)
    }

    pub async fn set(&self, token: Token) {
        self.state.lock().await.set(token);
    }

    pub async fn invalidate(&self) {
        self.state.lock().await.invalidate();
    }

    pub async fn ttl(&self) -> Option<Duration> {
        self.state.lock().await.ttl()
    }

    pub async fn record_error(&self, error: String) {
        self.state.lock().await.record_error(error);
    }

    /// Timestamp of the last successful `set`, for diagnostics (§4.7).
    pub async fn last_success_at(&self) -> Option<Instant> {
        self.state.lock().await.last_success_at()
    }

    /// Most recent recorded error message and when it happened, for
    /// diagnostics (§4.7). Does not imply the cache is currently empty —
    /// a stale error can coexist with a still-valid token.
    pub async fn last_error(&self) -> Option<(String, Instant)> {
        self.state.lock().await.last_error().cloned()
    }

    /// Acquire the lock for a caller that needs to check-then-act without
    /// releasing it in between (single-flight acquisition).
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, CacheState> {
        self.state.lock().await
    }

    pub fn get_if_valid_unlocked(state: &CacheState, min_ttl: Duration) -> Option<Token> {
        state.get_if_valid(min_ttl)
    }

    pub fn set_unlocked(state: &mut CacheState, token: Token) {
        state.set(token);
    }

    pub fn invalidate_unlocked(state: &mut CacheState) {
        state.invalidate();
    }

    pub fn record_error_unlocked(state: &mut CacheState, error: String) {
        state.record_error(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocking_cache_returns_none_when_empty() {
        let cache = BlockingCache::new();
        assert!(cache.get_if_valid(Duration::from_secs(1)).is_none());
        assert!(cache.ttl().is_none());
    }

    #[test]
    fn blocking_cache_honors_min_ttl() {
        let cache = BlockingCache::new();
        cache.set(Token::new("abc", Duration::from_secs(30)));
        assert!(cache.get_if_valid(Duration::from_secs(10)).is_some());
        assert!(cache.get_if_valid(Duration::from_secs(60)).is_none());
    }

    #[test]
    fn blocking_cache_invalidate_clears_token() {
        let cache = BlockingCache::new();
        cache.set(Token::new("abc", Duration::from_secs(30)));
        cache.invalidate();
        assert!(cache.get_if_valid(Duration::from_secs(0)).is_none());
    }

    #[tokio::test]
    async fn async_cache_round_trips_token() {
        let cache = AsyncCache::new();
        cache.set(Token::new("abc", Duration::from_secs(60))).await;
        let cached = cache.get_if_valid(Duration::from_secs(30)).await;
        assert_eq!(cached.unwrap().value(), "abc");
    }

    #[tokio::test]
    async fn async_cache_unlocked_helpers_share_state_with_locked_api() {
        let cache = AsyncCache::new();
        {
            let mut guard = cache.lock().await;
            assert!(AsyncCache::get_if_valid_unlocked(&guard, Duration::from_secs(1)).is_none());
            AsyncCache::set_unlocked(&mut guard, Token::new("abc", Duration::from_secs(60)));
        }
        let cached = cache.get_if_valid(Duration::from_secs(30)).await;
        assert_eq!(cached.unwrap().value(), "abc");
    }

    #[tokio::test]
    async fn async_cache_ttl_reflects_remaining_duration() {
        let cache = AsyncCache::new();
        cache.set(Token::new("abc", Duration::from_secs(60))).await;
        let ttl = cache.ttl().await.unwrap();
        assert!(ttl <= Duration::from_secs(60));
        assert!(ttl > Duration::from_secs(55));
    }

    #[tokio::test]
    async fn async_cache_records_error_without_clearing_token() {
        let cache = AsyncCache::new();
        cache.set(Token::new("abc", Duration::from_secs(60))).await;
        cache.record_error("acquisition failed".into()).await;
        assert!(cache.get_if_valid(Duration::from_secs(0)).await.is_some());
    }

    #[tokio::test]
    async fn last_success_at_is_none_until_first_set() {
        let cache = AsyncCache::new();
        assert!(cache.last_success_at().await.is_none());
        cache.set(Token::new("abc", Duration::from_secs(60))).await;
        assert!(cache.last_success_at().await.is_some());
    }

    #[tokio::test]
    async fn last_error_reports_message_without_clearing_on_success() {
        let cache = AsyncCache::new();
        cache.record_error("boom".into()).await;
        let (message, _at) = cache.last_error().await.unwrap();
        assert_eq!(message, "boom");

        cache.set(Token::new("abc", Duration::from_secs(60))).await;
        // A later success does not retroactively clear the error record —
        // diagnostics show both the last success and the last error.
        assert!(cache.last_error().await.is_some());
    }
}
