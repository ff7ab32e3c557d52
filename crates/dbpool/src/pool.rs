//! Pool manager (C4) — owns the sync pool (STAC mosaic reader) and the
//! async pool (OGC features engine), sharing one credential, rotated
//! together.
//!
//! The "current pool" slot is a single `tokio::sync::RwLock`-guarded
//! `Option<Arc<PoolSet>>`. Rotation builds the replacement pool set
//! entirely before taking the write lock, so the swap itself never blocks
//! on network I/O and readers never observe a half-built pool. The old
//! set is handed to a detached task that sleeps out the drain window
//! before closing it, so connections already checked out keep working
//! until they're returned.

use std::sync::Arc;
use std::time::Duration;

use deadpool_postgres::Runtime;
use r2d2_postgres::PostgresConnectionManager;
use r2d2_postgres::postgres::{Config as PgConfig, NoTls};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::settings::PoolSettings;

pub type SyncPool = r2d2::Pool<PostgresConnectionManager<NoTls>>;
pub type AsyncPool = deadpool_postgres::Pool;

struct PoolSet {
    sync_pool: SyncPool,
    async_pool: AsyncPool,
}

/// Point-in-time pool sizing, surfaced by C7 diagnostics.
#[derive(Debug, Clone)]
pub struct PoolStatus {
    pub initialized: bool,
    pub sync_connections: u32,
    pub sync_idle: u32,
    pub async_size: usize,
    pub async_available: i64,
}

pub struct PoolManager {
    settings: PoolSettings,
    drain_window: Duration,
    current: RwLock<Option<Arc<PoolSet>>>,
}

impl PoolManager {
    pub fn new(settings: PoolSettings, drain_window: Duration) -> Self {
        Self {
            settings,
            drain_window,
            current: RwLock::new(None),
        }
    }

    /// Build both pools and install them. On failure the slot stays
    /// empty — the component reports degraded, startup is not aborted.
    pub async fn initialize(&self, password: &str) -> Result<()> {
        let set = build_pool_set(self.settings.clone(), password.to_string()).await?;
        *self.current.write().await = Some(Arc::new(set));
        info!("pool manager initialized");
        Ok(())
    }

    /// Short-lived handle onto the current sync pool. Callers must not
    /// retain it across await points.
    pub async fn get_sync(&self) -> Result<SyncPool> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|s| s.sync_pool.clone())
            .ok_or(Error::NotInitialized)
    }

    /// Short-lived handle onto the current async pool.
    pub async fn get_async(&self) -> Result<AsyncPool> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|s| s.async_pool.clone())
            .ok_or(Error::NotInitialized)
    }

    /// Build a replacement pool set with `new_password` and atomically
    /// install it. If construction fails, the previous pools remain in
    /// service and the failure is returned for the caller (C6) to record
    /// and retry next interval.
    pub async fn rotate(&self, new_password: &str) -> Result<()> {
        let new_set = build_pool_set(self.settings.clone(), new_password.to_string()).await?;

        let old = {
            let mut guard = self.current.write().await;
            let old = guard.take();
            *guard = Some(Arc::new(new_set));
            old
        };

        if let Some(old) = old {
            let drain_window = self.drain_window;
            tokio::spawn(async move {
                tokio::time::sleep(drain_window).await;
                old.async_pool.close();
                info!("drained and closed previous pool set after rotation");
            });
        }

        info!("pool manager rotated to new credential");
        Ok(())
    }

    /// Drain and close the current pools. Used at shutdown.
    pub async fn close(&self) {
        if let Some(set) = self.current.write().await.take() {
            set.async_pool.close();
        }
    }

    pub async fn is_initialized(&self) -> bool {
        self.current.read().await.is_some()
    }

    pub async fn status(&self) -> PoolStatus {
        match self.current.read().await.as_ref() {
            None => PoolStatus {
                initialized: false,
                sync_connections: 0,
                sync_idle: 0,
                async_size: 0,
                async_available: 0,
            },
            Some(set) => {
                let sync_state = set.sync_pool.state();
                let async_status = set.async_pool.status();
                PoolStatus {
                    initialized: true,
                    sync_connections: sync_state.connections,
                    sync_idle: sync_state.idle_connections,
                    async_size: async_status.size,
                    async_available: async_status.available as i64,
                }
            }
        }
    }
}

/// Builds both pools off the async runtime thread. `r2d2::Pool::builder().build`
/// eagerly opens `min_idle` connections synchronously, which would block
/// the executor if run inline.
async fn build_pool_set(settings: PoolSettings, password: String) -> Result<PoolSet> {
    tokio::task::spawn_blocking(move || build_pool_set_blocking(&settings, &password))
        .await
        .map_err(|e| Error::RotationFailed(format!("pool build task panicked: {e}")))?
}

fn build_pool_set_blocking(settings: &PoolSettings, password: &str) -> Result<PoolSet> {
    let mut pg_config = PgConfig::new();
    pg_config
        .host(&settings.host)
        .port(settings.port)
        .dbname(&settings.database)
        .user(&settings.user)
        .password(password)
        .connect_timeout(settings.connect_timeout);

    let manager = PostgresConnectionManager::new(pg_config, NoTls);
    let sync_pool = r2d2::Pool::builder()
        .min_idle(Some(settings.pool_min))
        .max_size(settings.pool_max)
        .connection_timeout(settings.connect_timeout)
        .build(manager)
        .map_err(|e| Error::ConnectionLost(format!("building sync pool: {e}")))?;

    let mut deadpool_cfg = deadpool_postgres::Config::default();
    deadpool_cfg.host = Some(settings.host.clone());
    deadpool_cfg.port = Some(settings.port);
    deadpool_cfg.dbname = Some(settings.database.clone());
    deadpool_cfg.user = Some(settings.user.clone());
    deadpool_cfg.password = Some(password.to_string());
    deadpool_cfg.pool = Some(deadpool_postgres::PoolConfig {
        max_size: settings.pool_max as usize,
        timeouts: deadpool_postgres::Timeouts {
            wait: Some(settings.connect_timeout),
            create: Some(settings.connect_timeout),
            recycle: Some(settings.connect_timeout),
        },
        ..Default::default()
    });

    let async_pool = deadpool_cfg
        .create_pool(Some(Runtime::Tokio1), tokio_postgres::NoTls)
        .map_err(|e| Error::ConnectionLost(format!("building async pool: {e}")))?;

    Ok(PoolSet {
        sync_pool,
        async_pool,
    })
}
