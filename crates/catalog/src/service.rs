//! Catalog service (C5) — publishes the current [`Catalog`] and refreshes
//! it after pool rotation.

use std::sync::{Arc, RwLock};

use dbpool::PoolManager;
use tracing::warn;

use crate::catalog::{self, Catalog};
use crate::error::Result;

/// Holds the published catalog behind a `std::sync::RwLock<Arc<Catalog>>`
/// rather than an atomic-pointer crate: reads are a clone of an `Arc`
/// under a read lock held only for that clone, which is indistinguishable
/// in practice from an atomic swap and avoids pulling in a dependency
/// nothing else in the workspace needs.
///
/// Never caches a pool handle across calls — each `refresh` asks the pool
/// manager for the current async pool fresh, so a rotation that happens
/// between refreshes is picked up on the very next one.
pub struct CatalogService {
    pool_manager: Arc<PoolManager>,
    schemas: Vec<String>,
    published: RwLock<Arc<Catalog>>,
}

impl CatalogService {
    pub fn new(pool_manager: Arc<PoolManager>, schemas: Vec<String>) -> Self {
        Self {
            pool_manager,
            schemas,
            published: RwLock::new(Arc::new(Catalog::empty())),
        }
    }

    /// Current published catalog. Cheap: one `Arc` clone under a brief
    /// read lock.
    pub fn current(&self) -> Arc<Catalog> {
        Arc::clone(&self.published.read().unwrap_or_else(|p| p.into_inner()))
    }

    /// Reload from the database and atomically publish the result.
    ///
    /// On failure to even reach the pool, the previously published
    /// catalog is left in place and the error is returned for the caller
    /// to log/record.
    pub async fn refresh(&self) -> Result<()> {
        if self.schemas.is_empty() {
            *self.published.write().unwrap_or_else(|p| p.into_inner()) = Arc::new(Catalog::empty());
            return Ok(());
        }

        let pool = self
            .pool_manager
            .get_async()
            .await
            .map_err(|e| crate::error::Error::Pool(e.to_string()))?;

        let loaded = catalog::load(&pool, &self.schemas).await?;
        let count = loaded.len();
        *self.published.write().unwrap_or_else(|p| p.into_inner()) = Arc::new(loaded);
        if count == 0 {
            warn!("catalog refresh published zero collections");
        }
        Ok(())
    }
}
