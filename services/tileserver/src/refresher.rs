//! Background refresher (C6): the single long-lived task that rotates
//! credentials and pools on a timer.
//!
//! A `tokio::spawn`ed loop on a fixed interval performs two independent
//! credential refreshes (storage, database) followed by a pool rotation
//! and catalog reload — storage first, with the database substeps forming
//! one failure domain separate from the storage refresh.

use std::time::Duration;

use common::PgAuthMode;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::state::AppState;

/// Bounds a single refresh pass so a hung identity/database call can't wedge
/// shutdown indefinitely (§4.6 cancellation contract).
const REFRESH_BUDGET: Duration = Duration::from_secs(60);

pub fn spawn(state: AppState, shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run(state, shutdown))
}

async fn run(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let interval_secs = state.config.refresh.background_refresh_interval_sec.max(1);
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick fires immediately; startup already did an initial
    // acquisition/load, so skip it rather than refreshing twice back to back.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if tokio::time::timeout(REFRESH_BUDGET, refresh_once(&state)).await.is_err() {
                    error!("background refresh exceeded its time budget");
                }
            }
            _ = shutdown.changed() => {
                info!("background refresher stopping");
                return;
            }
        }
    }
}

/// Storage and database are independent failure domains: a failure in one
/// is logged and does not skip the other.
async fn refresh_once(state: &AppState) {
    if let Some(provider) = state.storage_provider.as_ref() {
        match provider.refresh_async().await {
            Ok(_) => info!("storage credential refreshed"),
            Err(e) => error!(error = %e, "storage credential refresh failed"),
        }
    }

    if state.database_provider.mode() != PgAuthMode::ManagedIdentity {
        return;
    }

    let token = match state.database_provider.refresh_async().await {
        Ok(token) => token,
        Err(e) => {
            error!(error = %e, "database credential refresh failed");
            return;
        }
    };

    if let Err(e) = state.pool_manager.rotate(token.value()).await {
        error!(error = %e, "pool rotation failed, previous pool remains in service");
        return;
    }

    match state.catalog_service.refresh().await {
        Ok(_) => info!("pool rotated and catalog refreshed"),
        Err(e) => error!(error = %e, "catalog refresh after pool rotation failed"),
    }
}
