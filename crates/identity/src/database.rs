//! Database credential provider (C2) — the password/token the pool
//! manager uses to connect to PostgreSQL.
//!
//! Three modes, selected by configuration (`common::PgAuthMode`):
//! managed identity (Azure AD token scoped to the Postgres server,
//! refreshed like any other token), external secret store (a Key Vault
//! secret, cached indefinitely), and static password (read once from
//! config, never refreshed). Modes 2 and 3 cache their value with
//! [`crate::token::FAR_FUTURE_TTL`], making C6's rotation step a no-op for
//! them in practice — `refresh_async` still runs but always hits cache.

use std::sync::Arc;
use std::time::Duration;

use common::PgAuthMode;
use tracing::{info, warn};

use crate::cache::AsyncCache;
use crate::error::{Error, Result};
use crate::fetch::{CredentialFetcher, ImdsFetcher, StaticFetcher, VaultFetcher};
use crate::token::Token;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
const MI_AUDIENCE: &str = "https://ossrdbms-aad.database.windows.net";

/// §4.2: a token already expired or expiring within 60s is rejected rather
/// than cached. Static-password and secret-store modes cache
/// [`crate::token::FAR_FUTURE_TTL`], which always clears this floor, so in
/// practice only managed identity can ever fail this check.
const MIN_ACCEPTABLE_TTL: Duration = Duration::from_secs(60);

/// Settings needed to construct a [`DatabaseProvider`] for any of the
/// three auth modes; unused fields for a given mode are ignored.
pub struct DatabaseProviderSettings {
    pub mode: PgAuthMode,
    pub mi_client_id: Option<String>,
    pub secret_store_name: Option<String>,
    pub secret_store_key: Option<String>,
    pub static_password: Option<String>,
}

pub struct DatabaseProvider {
    mode: PgAuthMode,
    cache: AsyncCache,
    fetcher: Arc<dyn CredentialFetcher>,
}

impl DatabaseProvider {
    pub fn new(settings: DatabaseProviderSettings) -> Result<Self> {
        let fetcher: Arc<dyn CredentialFetcher> = match settings.mode {
            PgAuthMode::ManagedIdentity => Arc::new(ImdsFetcher {
                audience: MI_AUDIENCE.to_string(),
                client_id: settings.mi_client_id,
            }),
            PgAuthMode::SecretStore => {
                let vault_name = settings.secret_store_name.ok_or_else(|| {
                    Error::IdentityUnavailable(
                        "secret_store mode requires secret_store_name".into(),
                    )
                })?;
                let secret_name = settings.secret_store_key.ok_or_else(|| {
                    Error::IdentityUnavailable(
                        "secret_store mode requires secret_store_key".into(),
                    )
                })?;
                Arc::new(VaultFetcher {
                    vault_name,
                    secret_name,
                })
            }
            PgAuthMode::Password => {
                let password = settings.static_password.ok_or_else(|| {
                    Error::IdentityUnavailable("password mode requires static_password".into())
                })?;
                Arc::new(StaticFetcher { value: password })
            }
        };

        Ok(Self {
            mode: settings.mode,
            cache: AsyncCache::new(),
            fetcher,
        })
    }

    pub fn with_fetcher(mode: PgAuthMode, fetcher: Arc<dyn CredentialFetcher>) -> Self {
        Self {
            mode,
            cache: AsyncCache::new(),
            fetcher,
        }
    }

    pub fn mode(&self) -> PgAuthMode {
        self.mode
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
                    "database credential acquisition exceeded {ACQUIRE_TIMEOUT:?}"
                ));
                AsyncCache::record_error_unlocked(&mut guard, err.to_string());
                return Err(err);
            }
            Ok(Err(join_err)) => {
                let err = Error::IdentityUnavailable(format!(
                    "database credential acquisition task panicked: {join_err}"
                ));
                AsyncCache::record_error_unlocked(&mut guard, err.to_string());
                return Err(err);
            }
            Ok(Ok(Err(err))) => {
                warn!(error = %err, mode = ?self.mode, "database credential acquisition failed");
                AsyncCache::record_error_unlocked(&mut guard, err.to_string());
                return Err(err);
            }
            Ok(Ok(Ok((value, ttl)))) => Token::new(value, ttl),
        };

        if !token.has_min_ttl(MIN_ACCEPTABLE_TTL) {
            let err = Error::IdentityMalformedToken(format!(
                "acquired database credential expires in under {MIN_ACCEPTABLE_TTL:?}"
            ));
            AsyncCache::record_error_unlocked(&mut guard, err.to_string());
            return Err(err);
        }

        info!(mode = ?self.mode, "acquired database credential");
        AsyncCache::set_unlocked(&mut guard, token.clone());
        Ok(token)
    }

    pub async fn refresh_async(&self) -> Result<Token> {
        // Password and secret-store modes never expire; invalidating
        // would just force an immediate re-fetch of the same value. Only
        // managed identity benefits from a forced refresh.
        if self.mode == PgAuthMode::ManagedIdentity {
            self.cache.invalidate().await;
        }
        self.acquire_async(Duration::ZERO).await
    }

    pub async fn ttl(&self) -> Option<Duration> {
        self.cache.ttl().await
    }

    /// When the currently cached credential (if any) was acquired, for C7
    /// diagnostics (§4.7 "last-success... timestamps per provider").
    pub async fn last_success_at(&self) -> Option<std::time::Instant> {
        self.cache.last_success_at().await
    }

    /// The most recent acquisition failure, if any, for C7 diagnostics.
    pub async fn last_error(&self) -> Option<(String, std::time::Instant)> {
        self.cache.last_error().await
    }
}
