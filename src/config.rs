//! Configuration management for the RAX VFS server
//!
//! Settings come from `config.toml` with `RAX_VFS_*` environment overrides.
//! The layout of the virtual tree itself lives in the separate sharing file
//! named by `shares_file`.

use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::storage::StoreOptions;

/// Complete server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(flatten)]
    pub startup: StartupConfig,

    #[serde(flatten)]
    pub store: StoreConfig,
}

/// Network, session and sharing settings
#[derive(Debug, Deserialize, Clone)]
pub struct StartupConfig {
    // ═══ NETWORK (Environment Override Supported) ═══
    /// IP address to bind the FTP control connection
    pub bind_address: String,

    /// Port for FTP control connection
    pub control_port: u16,

    /// Maximum concurrent logged-in clients
    /// Environment: RAX_VFS_MAX_CLIENTS
    pub max_clients: usize,

    // ═══ LIMITS ═══
    pub max_command_length: usize,
    pub max_username_length: usize,

    // ═══ SHARING ═══
    /// Sharing declaration file building the virtual tree
    pub shares_file: String,

    /// Accept USER anonymous with any password
    pub anonymous_allowed: bool,

    /// Hide dot-files from listings and bulk import
    pub ignore_hidden: bool,
}

/// Permission store settings
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub permission_db: String,

    /// Add default records for every shared directory's entries at startup
    pub import_on_startup: bool,

    pub lock_retry_interval_ms: u64,
    pub lock_attempts: u32,
    pub compaction_threshold: u32,
}

impl ServerConfig {
    /// Load configuration from config.toml with environment overrides
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::from_builder(File::with_name("config"), Self::environment())
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self, config::ConfigError> {
        Self::from_builder(File::from(path), Self::environment())
    }

    /// `RAX_VFS_*` variables; values are parsed so numbers and booleans
    /// override typed fields.
    fn environment() -> Environment {
        Environment::with_prefix("RAX_VFS").try_parsing(true)
    }

    fn from_builder<S>(file: S, env: Environment) -> Result<Self, config::ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let settings = Config::builder()
            .add_source(file)
            .add_source(env)
            .build()?;
        let config: ServerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validation for all configuration values
    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.startup.control_port == 0 {
            return Err(config::ConfigError::Message(
                "Control port cannot be 0".into(),
            ));
        }

        if self.startup.max_clients == 0 {
            return Err(config::ConfigError::Message(
                "max_clients must be greater than 0".into(),
            ));
        }

        if self.startup.shares_file.is_empty() {
            return Err(config::ConfigError::Message(
                "shares_file cannot be empty".into(),
            ));
        }

        if self.store.permission_db.is_empty() {
            return Err(config::ConfigError::Message(
                "permission_db cannot be empty".into(),
            ));
        }

        if self.store.lock_attempts == 0 {
            return Err(config::ConfigError::Message(
                "lock_attempts must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            ignore_hidden: self.startup.ignore_hidden,
            lock_retry_interval: Duration::from_millis(self.store.lock_retry_interval_ms),
            lock_attempts: self.store.lock_attempts,
            compaction_threshold: self.store.compaction_threshold,
        }
    }
}

impl StartupConfig {
    /// Get bind address and control port as socket address
    pub fn control_socket(&self) -> String {
        format!("{}:{}", self.bind_address, self.control_port)
    }

    pub fn shares_path(&self) -> PathBuf {
        PathBuf::from(&self.shares_file)
    }
}

impl StoreConfig {
    pub fn permission_db_path(&self) -> PathBuf {
        PathBuf::from(&self.permission_db)
    }
}
