//! YAML configuration for the monitor.
//!
//! Every section is optional; missing keys fall back to their defaults. The
//! database path can be overridden by `EQUIPMENT_MONITOR_DB` and then by the
//! `--database` flag.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{query::DEFAULT_ROW_LIMIT, reconcile::SchemaPolicy};

pub const DATABASE_ENV: &str = "EQUIPMENT_MONITOR_DB";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub query: QueryConfig,
    pub upload: UploadConfig,
    pub asset: Option<AssetConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("monitor.db"),
            busy_timeout_ms: 5_000,
        }
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Zero disables caching.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 600 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryConfig {
    pub row_limit: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            row_limit: DEFAULT_ROW_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadConfig {
    pub policy: SchemaPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssetConfig {
    pub url: String,
    /// Name of the environment variable holding a bearer token, if any.
    #[serde(default)]
    pub token_env: Option<String>,
    #[serde(default = "default_asset_timeout")]
    pub timeout_secs: u64,
}

fn default_asset_timeout() -> u64 {
    10
}

impl Config {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).context("Parsing configuration YAML")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            fs::read_to_string(path).with_context(|| format!("Opening config file {path:?}"))?;
        let config = Self::parse(&raw).with_context(|| format!("Loading config {path:?}"))?;
        debug!("Loaded configuration from {path:?}");
        Ok(config)
    }

    /// Loads `path` when given, otherwise defaults, then applies overrides.
    pub fn resolve(path: Option<&Path>, database: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        let env_path = std::env::var_os(DATABASE_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        config.apply_database_override(env_path, database);
        Ok(config)
    }

    fn apply_database_override(&mut self, env_path: Option<PathBuf>, flag: Option<&Path>) {
        if let Some(path) = flag.map(Path::to_path_buf).or(env_path) {
            debug!("Using database {path:?}");
            self.database.path = path;
        }
    }
}
