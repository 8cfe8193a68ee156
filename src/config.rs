use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

/// Runtime settings, usually read from a TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BankConfig {
    pub database: DatabaseConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file, created on first open.
    pub path: PathBuf,
    pub max_connections: u32,
    /// How long a connection waits on a locked database before giving up.
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("arca.db"),
            max_connections: 8,
            busy_timeout_ms: 5000,
        }
    }
}

/// Bounds for retrying a deposit or withdrawal that lost a write race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_backoff_ms: 2,
            max_backoff_ms: 100,
        }
    }
}

impl RetryConfig {
    /// Delay before attempt `attempt + 1`, doubling from the base and capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        let millis = self
            .base_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

impl BankConfig {
    /// Load settings from `path`, or fall back to defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::from_toml(&raw)
                    .with_context(|| format!("Invalid config file {}", path.display()))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Failed to parse TOML")
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.database.path.as_os_str().is_empty(),
            "database.path must not be empty"
        );
        ensure!(
            self.database.max_connections >= 1,
            "database.max_connections must be at least 1"
        );
        ensure!(
            self.retry.max_attempts >= 1,
            "retry.max_attempts must be at least 1"
        );
        ensure!(
            self.retry.base_backoff_ms <= self.retry.max_backoff_ms,
            "retry.base_backoff_ms must not exceed retry.max_backoff_ms"
        );
        Ok(())
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database.path = path.into();
        self
    }
}
