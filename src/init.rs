// Initialization utilities
//
// Logging/tracing setup and construction of the store and log source from
// RuntimeConfig

use std::sync::Arc;

use crate::config::{AppConfig, KafkaConfig, LogFormat, StorageBackend, StorageConfig};
use crate::source::LogSource;
use crate::writer::{MemoryStore, TransactionStore};
use anyhow::Result;
use tracing::{info, warn};

/// Initialize tracing/logging from the app section of RuntimeConfig
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // Parse log level from config
    let env_filter = EnvFilter::try_new(config.log_level.to_lowercase())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    // Try to set the global subscriber; ignore error if already set (idempotent)
    let _ = match config.log_format {
        LogFormat::Json => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().json()))
        }
        LogFormat::Text => tracing::subscriber::set_global_default(registry.with(fmt::layer())),
    };
}

/// Build the transaction store selected by `storage.backend`.
pub async fn init_store(config: &StorageConfig) -> Result<Arc<dyn TransactionStore>> {
    info!("Initializing storage backend: {}", config.backend);

    match config.backend {
        StorageBackend::Memory => {
            warn!("Using in-memory storage; rows are lost on exit");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Postgres => postgres_store(config).await,
    }
}

#[cfg(feature = "postgres")]
async fn postgres_store(config: &StorageConfig) -> Result<Arc<dyn TransactionStore>> {
    use anyhow::Context;

    let pg = config
        .postgres
        .as_ref()
        .context("storage.postgres section is required for the postgres backend")?;

    let store = crate::writer::PostgresStore::connect(pg)
        .await
        .with_context(|| format!("Failed to connect to database at {}", pg.redacted_url()))?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "postgres"))]
async fn postgres_store(_config: &StorageConfig) -> Result<Arc<dyn TransactionStore>> {
    anyhow::bail!("storage.backend = \"postgres\" but txn2pg was built without the `postgres` feature")
}

/// Build the Kafka log source.
#[cfg(feature = "kafka")]
pub fn init_source(config: &KafkaConfig) -> Result<Arc<dyn LogSource>> {
    use anyhow::Context;

    let source = crate::source::KafkaSource::connect(config)
        .with_context(|| format!("Failed to create Kafka consumer for topic {}", config.topic))?;
    Ok(Arc::new(source))
}

#[cfg(not(feature = "kafka"))]
pub fn init_source(config: &KafkaConfig) -> Result<Arc<dyn LogSource>> {
    anyhow::bail!(
        "cannot consume topic {}: txn2pg was built without the `kafka` feature \
         (rebuild with --features kafka)",
        config.topic
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_needs_no_connection() {
        let config = StorageConfig {
            backend: StorageBackend::Memory,
            postgres: None,
        };
        let store = init_store(&config).await.unwrap();
        assert!(!store.exists("trans-456").await.unwrap());
    }

    #[cfg(not(feature = "kafka"))]
    #[test]
    fn test_source_requires_kafka_feature() {
        let config = KafkaConfig {
            topic: "transactions".to_string(),
            ..KafkaConfig::default()
        };
        let err = init_source(&config).err().unwrap();
        assert!(err.to_string().contains("kafka"));
    }
}
