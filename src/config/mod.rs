// txn2pg configuration
//
// Supports configuration from multiple sources:
// 1. Environment variables (highest priority)
// 2. Config file path from TXN2PG_CONFIG env var
// 3. Config file contents from TXN2PG_CONFIG_CONTENT env var
// 4. Default config file locations (./config.toml, ./.txn2pg.toml)
// 5. Built-in defaults (lowest priority)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

mod env_overrides;
mod sources;
mod validation;

pub use env_overrides::{EnvSource, ENV_PREFIX};

/// Main runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub kafka: KafkaConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub app: AppConfig,
}

/// Kafka consumer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub group_id: String,
    /// Where a new consumer group starts reading: "latest" or "earliest".
    pub auto_offset_reset: String,
    pub fetch_max_bytes: usize,
    pub session_timeout_ms: u64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: Vec::new(),
            topic: String::new(),
            group_id: String::new(),
            auto_offset_reset: "latest".to_string(),
            fetch_max_bytes: 10 * 1024 * 1024,
            session_timeout_ms: 45_000,
        }
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postgres: Option<PostgresConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Postgres,
            postgres: Some(PostgresConfig::default()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    Memory,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Postgres => write!(f, "postgres"),
            StorageBackend::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(StorageBackend::Postgres),
            "memory" | "mem" => Ok(StorageBackend::Memory),
            _ => anyhow::bail!(
                "Unsupported storage backend: {}. Supported: postgres, memory",
                s
            ),
        }
    }
}

/// PostgreSQL connection and pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub sslmode: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub conn_max_lifetime_secs: u64,
    pub acquire_timeout_secs: u64,
    /// Create the `historical_transactions` table on startup if it is missing.
    pub create_schema: bool,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 5432,
            user: String::new(),
            password: String::new(),
            name: String::new(),
            sslmode: "require".to_string(),
            max_connections: 100,
            min_connections: 10,
            conn_max_lifetime_secs: 3600,
            acquire_timeout_secs: 30,
            create_schema: false,
        }
    }
}

impl PostgresConfig {
    pub fn conn_max_lifetime(&self) -> Duration {
        Duration::from_secs(self.conn_max_lifetime_secs)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Connection URL with the password masked, for logs.
    pub fn redacted_url(&self) -> String {
        format!(
            "postgres://{}:***@{}:{}/{}?sslmode={}",
            self.user, self.host, self.port, self.name, self.sslmode
        )
    }
}

/// Ingestion loop tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Fixed delay after a failed fetch before trying again.
    pub fetch_backoff_ms: u64,
    /// How long in-flight work may run after a shutdown signal.
    pub shutdown_grace_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            fetch_backoff_ms: 1000,
            shutdown_grace_secs: 2,
        }
    }
}

impl IngestConfig {
    pub fn fetch_backoff(&self) -> Duration {
        Duration::from_millis(self.fetch_backoff_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Process-level settings (logging)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl RuntimeConfig {
    /// Load configuration from all sources with priority
    pub fn load() -> Result<Self> {
        sources::load_config()
    }

    /// Load configuration from a specific file path (for CLI usage).
    pub fn load_from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        sources::load_from_file_path(path)
    }

    /// Merge another config into this one (used for TOML layering).
    pub fn merge(&mut self, other: RuntimeConfig) {
        self.kafka = other.kafka;
        self.storage = other.storage;
        self.ingest = other.ingest;
        self.app = other.app;
    }

    /// Apply environment overrides from a custom source.
    pub fn apply_env_overrides_from<E: EnvSource>(&mut self, env: &E) -> Result<()> {
        env_overrides::apply_env_overrides(self, env)
    }

    /// Build a configuration from optional inline TOML plus overrides supplied
    /// by an `EnvSource`. Used by tests and embedders that do not want the
    /// process environment consulted.
    pub fn load_with_env<E: EnvSource>(inline_config: Option<&str>, env: &E) -> Result<Self> {
        let mut config = RuntimeConfig::default();

        if let Some(inline) = inline_config {
            let file_config: RuntimeConfig =
                toml::from_str(inline).context("Failed to parse inline config content")?;
            config.merge(file_config);
        }

        config.apply_env_overrides_from(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    /// Accepted-but-risky settings, for logging after tracing is up.
    pub fn warnings(&self) -> Vec<String> {
        validation::config_warnings(self)
    }

    /// Copy of this configuration with secrets masked, for display.
    pub fn redacted(&self) -> RuntimeConfig {
        let mut copy = self.clone();
        if let Some(pg) = copy.storage.postgres.as_mut() {
            if !pg.password.is_empty() {
                pg.password = "***".to_string();
            }
        }
        copy
    }

    /// Log the effective configuration without secrets.
    pub fn log_summary(&self) {
        info!("Configuration loaded:");
        info!("  Log level: {}", self.app.log_level);
        info!("  Kafka brokers: {}", self.kafka.brokers.join(", "));
        info!("  Kafka topic: {}", self.kafka.topic);
        info!("  Kafka group id: {}", self.kafka.group_id);
        info!("  Storage backend: {}", self.storage.backend);
        if self.storage.backend == StorageBackend::Postgres {
            if let Some(pg) = &self.storage.postgres {
                info!("  Database: {}", pg.redacted_url());
                info!(
                    "  Database pool: min={} max={} lifetime={}s",
                    pg.min_connections, pg.max_connections, pg.conn_max_lifetime_secs
                );
            }
        }
        info!("  Fetch backoff: {}ms", self.ingest.fetch_backoff_ms);
        info!("  Shutdown grace: {}s", self.ingest.shutdown_grace_secs);
    }
}
