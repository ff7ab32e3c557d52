//! Common types shared across the tile server workspace

mod config;
mod error;
mod secret;

pub use config::{
    Config, DatabaseConfig, PgAuthMode, RefreshConfig, ServerConfig, StorageConfig, VectorConfig,
};
pub use error::{Error, Result};
pub use secret::Secret;
