//! Static parameters a pool is built from. Credentials are supplied
//! separately at `initialize`/`rotate` time since they change independently
//! of everything here.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub pool_min: u32,
    pub pool_max: u32,
    pub connect_timeout: Duration,
}
