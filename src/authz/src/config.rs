//! Settings file loading and validation
//!
//! ```toml
//! [store]
//! database_url = "sqlite:live_permissions.db"
//! max_connections = 8
//!
//! [engine]
//! auto_provision = true
//! secondary_identity_lookup = "actor.gh_email"
//! ```

use crate::engine::EngineConfig;
use crate::error::{PermissionError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default database file, next to the working directory
pub const DEFAULT_DATABASE_URL: &str = "sqlite:live_permissions.db";

/// Complete settings file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

impl Settings {
    /// Load and validate settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let settings = Self::from_toml(&content)?;
        tracing::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Parse and validate settings from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.store.validate()?;
        self.engine.validate()
    }
}

/// Connection settings for the SQLite store
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// sqlx SQLite URL, e.g. `sqlite:live_permissions.db` or `sqlite::memory:`
    #[serde(default = "default_database_url")]
    pub database_url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits on a locked database before failing
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_ms: u64,

    #[serde(default = "default_true")]
    pub create_if_missing: bool,
}

impl StoreConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            return Err(PermissionError::Config("database_url must not be empty".into()));
        }
        if self.max_connections == 0 {
            return Err(PermissionError::Config("max_connections must be at least 1".into()));
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout(),
            acquire_timeout_ms: default_acquire_timeout(),
            create_if_missing: true,
        }
    }
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_max_connections() -> u32 {
    8
}

fn default_busy_timeout() -> u64 {
    5_000
}

fn default_acquire_timeout() -> u64 {
    3_000
}

fn default_true() -> bool {
    true
}
