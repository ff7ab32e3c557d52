//! Root configuration for the tile server.
//!
//! Loaded once at startup from a TOML file and never mutated afterward.
//! Every field the control plane reads lives here so components never
//! reach into the environment themselves (except the documented
//! `CONFIG_PATH` override used to locate this file in the first place).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::secret::Secret;

const DEFAULT_CONFIG_PATH: &str = "./config/tileserver.toml";

/// Root configuration, deserialized directly from TOML.
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
}

/// HTTP listener and logging options.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".parse().expect("valid default addr"),
            log_level: "info".to_string(),
        }
    }
}

/// Object-storage credential configuration (C2/C3).
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub storage_auth_enabled: bool,
    pub storage_account: String,
    #[serde(default)]
    pub dev_mode_credential: bool,
}

/// Database credential mode (§4.2 "database provider specifics").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PgAuthMode {
    Password,
    SecretStore,
    ManagedIdentity,
}

/// Database connection + credential configuration (C4).
#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    pub pg_auth_mode: PgAuthMode,
    pub pg_host: String,
    #[serde(default = "default_pg_port")]
    pub pg_port: u16,
    pub pg_db: String,
    pub pg_user: String,
    #[serde(default)]
    pub pg_password: Option<Secret<String>>,
    #[serde(default)]
    pub secret_store_name: Option<String>,
    #[serde(default)]
    pub secret_store_key: Option<String>,
    #[serde(default)]
    pub pg_mi_client_id: Option<String>,
    /// When false, a DB outage still leaves the process ready (§7).
    #[serde(default = "default_true")]
    pub db_required: bool,
    #[serde(default = "default_pool_min")]
    pub pool_min: u32,
    #[serde(default = "default_pool_max")]
    pub pool_max: u32,
    #[serde(default = "default_connect_timeout_sec")]
    pub connect_timeout_sec: u64,
}

/// OGC-features / catalog configuration (C5).
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub enable_vector_api: bool,
    pub vector_schemas: Vec<String>,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            enable_vector_api: false,
            vector_schemas: Vec::new(),
        }
    }
}

/// Background refresher and TTL floor configuration (C6, C1).
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub background_refresh_interval_sec: u64,
    pub min_token_ttl_sec: u64,
    pub readyz_min_token_ttl_sec: u64,
    pub pool_drain_window_sec: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            background_refresh_interval_sec: 2700,
            min_token_ttl_sec: 300,
            readyz_min_token_ttl_sec: 60,
            pool_drain_window_sec: 30,
        }
    }
}

fn default_pg_port() -> u16 {
    5432
}

fn default_true() -> bool {
    true
}

fn default_pool_min() -> u32 {
    1
}

fn default_pool_max() -> u32 {
    10
}

fn default_connect_timeout_sec() -> u64 {
    10
}

impl Config {
    /// Resolve the configuration path: explicit CLI flag, then `CONFIG_PATH`,
    /// then the baked-in default. Mirrors the CLI resolution shape used by
    /// the proxy this crate was generalized from.
    pub fn resolve_path(cli_arg: Option<&str>) -> PathBuf {
        if let Some(path) = cli_arg {
            return PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(path);
        }
        PathBuf::from(DEFAULT_CONFIG_PATH)
    }

    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field validation that `serde`'s shape alone can't express.
    fn validate(&self) -> Result<()> {
        match self.database.pg_auth_mode {
            PgAuthMode::Password if self.database.pg_password.is_none() => {
                return Err(Error::MissingRequiredOption(
                    "pg_password is required when pg_auth_mode = \"password\"".into(),
                ));
            }
            PgAuthMode::SecretStore
                if self.database.secret_store_name.is_none()
                    || self.database.secret_store_key.is_none() =>
            {
                return Err(Error::MissingRequiredOption(
                    "secret_store_name and secret_store_key are required when pg_auth_mode = \"secret_store\"".into(),
                ));
            }
            _ => {}
        }

        if self.database.pool_max < self.database.pool_min {
            return Err(Error::Config(format!(
                "pool_max ({}) must be >= pool_min ({})",
                self.database.pool_max, self.database.pool_min
            )));
        }

        if self.storage.storage_auth_enabled && self.storage.storage_account.is_empty() {
            return Err(Error::MissingRequiredOption(
                "storage_account is required when storage_auth_enabled = true".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
        [storage]
        storage_auth_enabled = true
        storage_account = "acct1"

        [database]
        pg_auth_mode = "managed_identity"
        pg_host = "db.internal"
        pg_db = "catalog"
        pg_user = "tiles"
        "#
    }

    #[test]
    fn loads_minimal_config_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, minimal_toml()).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.database.pg_port, 5432);
        assert_eq!(config.refresh.background_refresh_interval_sec, 2700);
        assert_eq!(config.refresh.min_token_ttl_sec, 300);
        assert!(!config.vector.enable_vector_api);
        assert!(config.database.db_required);
    }

    #[test]
    fn password_mode_requires_password() {
        let toml = r#"
        [storage]
        storage_account = ""

        [database]
        pg_auth_mode = "password"
        pg_host = "db.internal"
        pg_db = "catalog"
        pg_user = "tiles"
        "#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, toml).unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, Error::MissingRequiredOption(_)));
    }

    #[test]
    fn storage_auth_enabled_requires_account() {
        let toml = r#"
        [storage]
        storage_auth_enabled = true
        storage_account = ""

        [database]
        pg_auth_mode = "managed_identity"
        pg_host = "db.internal"
        pg_db = "catalog"
        pg_user = "tiles"
        "#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, toml).unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, Error::MissingRequiredOption(_)));
    }

    #[test]
    fn pool_max_below_min_is_rejected() {
        let toml = r#"
        [storage]
        storage_account = ""

        [database]
        pg_auth_mode = "managed_identity"
        pg_host = "db.internal"
        pg_db = "catalog"
        pg_user = "tiles"
        pool_min = 5
        pool_max = 2
        "#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, toml).unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn resolve_path_prefers_cli_arg() {
        let resolved = Config::resolve_path(Some("/tmp/explicit.toml"));
        assert_eq!(resolved, PathBuf::from("/tmp/explicit.toml"));
    }

    #[test]
    fn resolve_path_falls_back_to_default() {
        // SAFETY: test-only removal of a process-wide env var; no other test
        // in this crate reads CONFIG_PATH concurrently.
        unsafe {
            std::env::remove_var("CONFIG_PATH");
        }
        let resolved = Config::resolve_path(None);
        assert_eq!(resolved, PathBuf::from(DEFAULT_CONFIG_PATH));
    }
}
