//! Storage credential provider (C2) — object-storage bearer tokens.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::cache::AsyncCache;
use crate::error::{Error, Result};
use crate::fetch::{CredentialFetcher, DevCliFetcher, ImdsFetcher};
use crate::token::Token;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
const MIN_ACCEPTABLE_TTL: Duration = Duration::from_secs(60);

/// Acquires and caches the bearer token object-storage reader backends use.
///
/// `acquire_async`/`refresh_async` single-flight through the cache's
/// `tokio::sync::Mutex`: the first caller to find the cache stale holds
/// the lock across the (blocking, network-bound) fetch, and every other
/// concurrent caller queues on the same lock rather than issuing a
/// redundant fetch.
pub struct StorageProvider {
    cache: AsyncCache,
    fetcher: Arc<dyn CredentialFetcher>,
}

impl StorageProvider {
    /// `dev_mode` selects the developer-cli credential source (for running
    /// outside the cloud); otherwise managed identity via IMDS is used.
    pub fn new(storage_account: impl Into<String>, dev_mode: bool) -> Self {
        let audience = format!("https://{}.blob.core.windows.net", storage_account.into());
        let fetcher: Arc<dyn CredentialFetcher> = if dev_mode {
            Arc::new(DevCliFetcher { audience })
        } else {
            Arc::new(ImdsFetcher {
                audience,
                client_id: None,
            })
        };
        Self::with_fetcher(fetcher)
    }

    pub fn with_fetcher(fetcher: Arc<dyn CredentialFetcher>) -> Self {
        Self {
            cache: AsyncCache::new(),
            fetcher,
        }
    }

    pub async fn acquire_async(&self, min_ttl: Duration) -> Result<Token> {
        let mut guard = self.cache.lock().await;
        if let Some(token) = AsyncCache::get_if_valid_unlocked(&guard, min_ttl) {
            return Ok(token);
        }

        let fetcher = Arc::clone(&self.fetcher);
        let fetch = tokio::task::spawn_blocking(move || fetcher.fetch());

        let outcome = tokio::time::timeout(ACQUIRE_TIMEOUT, fetch).await;

        let token = match outcome {
            Err(_) => {
                let err = Error::IdentityTimeout(format!(
                    "storage token acquisition exceeded {ACQUIRE_TIMEOUT:?}"
                ));
                AsyncCache::record_error_unlocked(&mut guard, err.to_string());
                return Err(err);
            }
            Ok(Err(join_err)) => {
                let err = Error::IdentityUnavailable(format!(
                    "storage token acquisition task panicked: {join_err}"
                ));
                AsyncCache::record_error_unlocked(&mut guard, err.to_string());
                return Err(err);
            }
            Ok(Ok(Err(err))) => {
                warn!(error = %err, "storage credential acquisition failed");
                AsyncCache::record_error_unlocked(&mut guard, err.to_string());
                return Err(err);
            }
            Ok(Ok(Ok((value, ttl)))) => Token::new(value, ttl),
        };

        if !token.has_min_ttl(MIN_ACCEPTABLE_TTL) {
            let err = Error::IdentityMalformedToken(format!(
                "acquired storage token expires in under {MIN_ACCEPTABLE_TTL:?}"
            ));
            AsyncCache::record_error_unlocked(&mut guard, err.to_string());
            return Err(err);
        }

        info!("acquired storage credential");
        AsyncCache::set_unlocked(&mut guard, token.clone());
        Ok(token)
    }

    pub async fn refresh_async(&self) -> Result<Token> {
        self.cache.invalidate().await;
        self.acquire_async(Duration::ZERO).await
    }

    pub async fn ttl(&self) -> Option<Duration> {
        self.cache.ttl().await
    }

    /// When the currently cached token (if any) was acquired, for C7
    /// diagnostics (§4.7 "last-success... timestamps per provider").
    pub async fn last_success_at(&self) -> Option<std::time::Instant> {
        self.cache.last_success_at().await
    }

    /// The most recent acquisition failure, if any, for C7 diagnostics.
    pub async fn last_error(&self) -> Option<(String, std::time::Instant)> {
        self.cache.last_error().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher {
        calls: Arc<AtomicUsize>,
        result: std::sync::Mutex<Option<Result<(String, Duration)>>>,
    }

    impl CredentialFetcher for CountingFetcher {
        fn fetch(&self) -> Result<(String, Duration)> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(("fallback".into(), Duration::from_secs(120))))
        }
    }

    #[tokio::test]
    async fn acquire_fetches_once_and_caches() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = Arc::new(CountingFetcher {
            calls: Arc::clone(&calls),
            result: std::sync::Mutex::new(Some(Ok(("tok1".into(), Duration::from_secs(300))))),
        });
        let provider = StorageProvider::with_fetcher(fetcher);

        let a = provider.acquire_async(Duration::from_secs(60)).await.unwrap();
        let b = provider.acquire_async(Duration::from_secs(60)).await.unwrap();

        assert_eq!(a.value(), "tok1");
        assert_eq!(b.value(), "tok1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_invalidates_and_refetches() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = Arc::new(CountingFetcher {
            calls: Arc::clone(&calls),
            result: std::sync::Mutex::new(Some(Ok(("tok1".into(), Duration::from_secs(300))))),
        });
        let provider = StorageProvider::with_fetcher(fetcher);

        provider.acquire_async(Duration::from_secs(60)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        provider.refresh_async().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_acquisition_leaves_previous_token_in_place() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = Arc::new(CountingFetcher {
            calls: Arc::clone(&calls),
            result: std::sync::Mutex::new(Some(Ok(("tok1".into(), Duration::from_secs(1))))),
        });
        let provider = StorageProvider::with_fetcher(fetcher);

        provider
            .acquire_async(Duration::from_millis(1))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;

        // Cache is stale now; queue a failing fetch behind it.
        let calls2 = Arc::new(AtomicUsize::new(0));
        let failing = Arc::new(CountingFetcher {
            calls: Arc::clone(&calls2),
            result: std::sync::Mutex::new(Some(Err(Error::IdentityUnavailable("down".into())))),
        });
        let provider2 = StorageProvider::with_fetcher(failing);
        let result = provider2.acquire_async(Duration::from_secs(60)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn concurrent_acquisitions_single_flight_to_one_fetch() {
        struct SlowFetcher {
            calls: Arc<AtomicUsize>,
        }
        impl CredentialFetcher for SlowFetcher {
            fn fetch(&self) -> Result<(String, Duration)> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(100));
                Ok(("shared-token".into(), Duration::from_secs(300)))
            }
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let provider = Arc::new(StorageProvider::with_fetcher(Arc::new(SlowFetcher {
            calls: Arc::clone(&calls),
        })));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let provider = Arc::clone(&provider);
            handles.push(tokio::spawn(async move {
                provider.acquire_async(Duration::from_secs(60)).await
            }));
        }

        let mut values = Vec::new();
        for handle in handles {
            values.push(handle.await.unwrap().unwrap().value().to_string());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(values.iter().all(|v| v == "shared-token"));
    }

    #[tokio::test]
    async fn short_lived_token_is_rejected() {
        let fetcher = Arc::new(CountingFetcher {
            calls: Arc::new(AtomicUsize::new(0)),
            result: std::sync::Mutex::new(Some(Ok(("tok1".into(), Duration::from_secs(5))))),
        });
        let provider = StorageProvider::with_fetcher(fetcher);

        let result = provider.acquire_async(Duration::from_secs(0)).await;
        assert!(matches!(result, Err(Error::IdentityMalformedToken(_))));
    }

    #[tokio::test]
    async fn last_success_and_last_error_are_exposed_for_diagnostics() {
        let fetcher = Arc::new(CountingFetcher {
            calls: Arc::new(AtomicUsize::new(0)),
            result: std::sync::Mutex::new(Some(Err(Error::IdentityUnavailable("down".into())))),
        });
        let provider = StorageProvider::with_fetcher(fetcher);
        assert!(provider.last_success_at().await.is_none());

        let _ = provider.acquire_async(Duration::from_secs(60)).await;
        let (message, _at) = provider.last_error().await.unwrap();
        assert_eq!(message, "identity provider unavailable: down");
        assert!(provider.last_success_at().await.is_none());
    }
}
