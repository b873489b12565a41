// Configuration validation
//
// Validates that required fields are present and values are sensible

use super::*;
use anyhow::{bail, Result};

const VALID_SSLMODES: &[&str] = &[
    "disable",
    "allow",
    "prefer",
    "require",
    "verify-ca",
    "verify-full",
];
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const VALID_OFFSET_RESETS: &[&str] = &["latest", "earliest"];

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    validate_kafka_config(&config.kafka)?;
    validate_storage_config(&config.storage)?;
    validate_ingest_config(&config.ingest)?;
    validate_app_config(&config.app)?;
    Ok(())
}

fn validate_kafka_config(config: &KafkaConfig) -> Result<()> {
    if config.brokers.is_empty() {
        bail!("kafka.brokers is required (set TXN2PG_KAFKA_BROKERS)");
    }

    if config.brokers.iter().any(|b| b.trim().is_empty()) {
        bail!("kafka.brokers contains an empty broker address");
    }

    if config.topic.trim().is_empty() {
        bail!("kafka.topic is required (set TXN2PG_KAFKA_TOPIC)");
    }

    if config.group_id.trim().is_empty() {
        bail!("kafka.group_id is required (set TXN2PG_KAFKA_GROUP_ID)");
    }

    if !VALID_OFFSET_RESETS.contains(&config.auto_offset_reset.as_str()) {
        bail!(
            "kafka.auto_offset_reset must be one of {:?}, got '{}'",
            VALID_OFFSET_RESETS,
            config.auto_offset_reset
        );
    }

    if config.fetch_max_bytes == 0 {
        bail!("kafka.fetch_max_bytes must be greater than 0");
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<()> {
    match config.backend {
        StorageBackend::Memory => Ok(()),
        StorageBackend::Postgres => {
            let Some(pg) = &config.postgres else {
                bail!("storage.postgres section is required when backend = \"postgres\"");
            };
            validate_postgres_config(pg)
        }
    }
}

fn validate_postgres_config(config: &PostgresConfig) -> Result<()> {
    if config.host.trim().is_empty() {
        bail!("storage.postgres.host is required (set TXN2PG_DB_HOST)");
    }

    if config.port == 0 {
        bail!("storage.postgres.port must be between 1 and 65535");
    }

    if config.user.trim().is_empty() {
        bail!("storage.postgres.user is required (set TXN2PG_DB_USER)");
    }

    if config.name.trim().is_empty() {
        bail!("storage.postgres.name is required (set TXN2PG_DB_NAME)");
    }

    if !VALID_SSLMODES.contains(&config.sslmode.as_str()) {
        bail!(
            "storage.postgres.sslmode must be one of {:?}, got '{}'",
            VALID_SSLMODES,
            config.sslmode
        );
    }

    if config.max_connections == 0 {
        bail!("storage.postgres.max_connections must be greater than 0");
    }

    if config.min_connections > config.max_connections {
        bail!(
            "storage.postgres.min_connections ({}) must not exceed max_connections ({})",
            config.min_connections,
            config.max_connections
        );
    }

    if config.acquire_timeout_secs == 0 {
        bail!("storage.postgres.acquire_timeout_secs must be greater than 0");
    }

    Ok(())
}

fn validate_ingest_config(config: &IngestConfig) -> Result<()> {
    if config.fetch_backoff_ms == 0 {
        bail!("ingest.fetch_backoff_ms must be greater than 0");
    }

    Ok(())
}

/// Settings that are accepted but worth flagging. Returned rather than logged
/// so callers can report them once tracing is initialized.
pub fn config_warnings(config: &RuntimeConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if let (StorageBackend::Postgres, Some(pg)) = (config.storage.backend, &config.storage.postgres) {
        if pg.password.is_empty() {
            warnings.push(
                "storage.postgres.password is empty; relying on trust or peer authentication"
                    .to_string(),
            );
        }
        if pg.sslmode == "disable" {
            warnings.push(
                "storage.postgres.sslmode is 'disable'; connections are unencrypted".to_string(),
            );
        }
    }

    if config.ingest.fetch_backoff_ms > 60_000 {
        warnings.push(format!(
            "ingest.fetch_backoff_ms is very large ({}); recovery after broker errors will be slow",
            config.ingest.fetch_backoff_ms
        ));
    }

    warnings
}

fn validate_app_config(config: &AppConfig) -> Result<()> {
    if !VALID_LOG_LEVELS.contains(&config.log_level.to_lowercase().as_str()) {
        bail!(
            "app.log_level must be one of {:?}, got '{}'",
            VALID_LOG_LEVELS,
            config.log_level
        );
    }
    Ok(())
}
