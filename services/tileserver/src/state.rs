//! Shared application state, built once in `main` and cloned cheaply into
//! every handler via axum's `State` extractor (every field is an `Arc` or
//! `Copy`).

use std::sync::Arc;
use std::time::Instant;

use catalog::CatalogService;
use common::Config;
use dbpool::PoolManager;
use identity::{DatabaseProvider, StorageProvider};
use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// `None` when `storage.storage_auth_enabled = false` — C3 then runs
    /// every request without a credential, and C7 reports storage as
    /// `disabled` rather than `degraded`.
    pub storage_provider: Option<Arc<StorageProvider>>,
    pub database_provider: Arc<DatabaseProvider>,
    pub pool_manager: Arc<PoolManager>,
    pub catalog_service: Arc<CatalogService>,
    pub metrics_handle: PrometheusHandle,
    pub started_at: Instant,
    pub hostname: Arc<str>,
}
