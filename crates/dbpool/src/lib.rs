//! Connection pool manager (C4): owns the sync pool (STAC mosaic reader)
//! and the async pool (OGC features engine) behind one atomically-rotated
//! "current pool set" slot.

mod error;
mod pool;
mod settings;

pub use error::{Error, Result};
pub use pool::{AsyncPool, PoolManager, PoolStatus, SyncPool};
pub use settings::PoolSettings;
