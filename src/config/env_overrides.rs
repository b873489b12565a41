use super::{LogFormat, PostgresConfig, RuntimeConfig, StorageBackend};
use anyhow::{anyhow, Context, Result};
use std::str::FromStr;

pub const ENV_PREFIX: &str = "TXN2PG_";

/// Abstraction over environment-variable lookups so tests and embedders can
/// supply their own source of overrides.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;

    /// Get an environment variable WITHOUT the TXN2PG_ prefix
    /// Used for libpq standard variables (PGPASSWORD)
    fn get_raw(&self, key: &str) -> Option<String>;
}

/// Apply environment-variable overrides (highest priority) to the runtime config.
pub fn apply_env_overrides<E: EnvSource>(config: &mut RuntimeConfig, env: &E) -> Result<()> {
    // Kafka
    if let Some(brokers) = get_env_string(env, "KAFKA_BROKERS") {
        config.kafka.brokers = brokers.split(',').map(|b| b.trim().to_string()).collect();
    }
    if let Some(topic) = get_env_string(env, "KAFKA_TOPIC") {
        config.kafka.topic = topic;
    }
    if let Some(group_id) = get_env_string(env, "KAFKA_GROUP_ID") {
        config.kafka.group_id = group_id;
    }
    if let Some(reset) = get_env_string(env, "KAFKA_AUTO_OFFSET_RESET") {
        config.kafka.auto_offset_reset = reset;
    }
    if let Some(val) = get_env_parsed::<usize, E>(env, "KAFKA_FETCH_MAX_BYTES")? {
        config.kafka.fetch_max_bytes = val;
    }

    // Storage backend
    if let Some(backend) = get_env_string(env, "STORAGE_BACKEND") {
        config.storage.backend = backend
            .parse::<StorageBackend>()
            .context("Invalid TXN2PG_STORAGE_BACKEND value")?;
    }

    // PostgreSQL
    if let Some(host) = get_env_string(env, "DB_HOST") {
        ensure_postgres(config).host = host;
    }
    if let Some(port) = get_env_parsed::<u16, E>(env, "DB_PORT")? {
        ensure_postgres(config).port = port;
    }
    if let Some(user) = get_env_string(env, "DB_USER") {
        ensure_postgres(config).user = user;
    }
    if let Some(password) = get_env_string(env, "DB_PASSWORD") {
        ensure_postgres(config).password = password;
    } else if let Some(password) = env.get_raw("PGPASSWORD") {
        ensure_postgres(config).password = password;
    }
    if let Some(name) = get_env_string(env, "DB_NAME") {
        ensure_postgres(config).name = name;
    }
    if let Some(sslmode) = get_env_string(env, "DB_SSLMODE") {
        ensure_postgres(config).sslmode = sslmode;
    }
    if let Some(val) = get_env_parsed::<u32, E>(env, "DB_MAX_CONNECTIONS")? {
        ensure_postgres(config).max_connections = val;
    }
    if let Some(val) = get_env_parsed::<u32, E>(env, "DB_MIN_CONNECTIONS")? {
        ensure_postgres(config).min_connections = val;
    }
    if let Some(val) = get_env_parsed::<u64, E>(env, "DB_CONN_MAX_LIFETIME_SECS")? {
        ensure_postgres(config).conn_max_lifetime_secs = val;
    }
    if let Some(val) = get_env_parsed::<bool, E>(env, "DB_CREATE_SCHEMA")? {
        ensure_postgres(config).create_schema = val;
    }

    // Ingestion loop
    if let Some(val) = get_env_parsed::<u64, E>(env, "FETCH_BACKOFF_MS")? {
        config.ingest.fetch_backoff_ms = val;
    }
    if let Some(val) = get_env_parsed::<u64, E>(env, "SHUTDOWN_GRACE_SECS")? {
        config.ingest.shutdown_grace_secs = val;
    }

    // Logging
    if let Some(level) = get_env_string(env, "LOG_LEVEL") {
        config.app.log_level = level;
    }
    if let Some(format) = get_env_string(env, "LOG_FORMAT") {
        config.app.log_format = match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };
    }

    Ok(())
}

fn ensure_postgres(config: &mut RuntimeConfig) -> &mut PostgresConfig {
    config
        .storage
        .postgres
        .get_or_insert_with(PostgresConfig::default)
}

fn get_env_string<E: EnvSource>(env: &E, key: &str) -> Option<String> {
    env.get(key)
}

fn get_env_parsed<T, E>(env: &E, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    E: EnvSource,
{
    match get_env_string(env, key) {
        Some(val) => {
            let parsed = val
                .trim()
                .parse::<T>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapEnv(HashMap<&'static str, &'static str>);

    impl EnvSource for MapEnv {
        fn get(&self, key: &str) -> Option<String> {
            self.0
                .get(format!("{}{}", ENV_PREFIX, key).as_str())
                .map(|v| v.to_string())
        }

        fn get_raw(&self, key: &str) -> Option<String> {
            self.0.get(key).map(|v| v.to_string())
        }
    }

    #[test]
    fn test_brokers_are_split_and_trimmed() {
        let env = MapEnv(HashMap::from([("TXN2PG_KAFKA_BROKERS", " a:9092 ,b:9092")]));
        let mut config = RuntimeConfig::default();
        apply_env_overrides(&mut config, &env).unwrap();
        assert_eq!(config.kafka.brokers, vec!["a:9092", "b:9092"]);
    }

    #[test]
    fn test_numeric_parse_error_names_variable() {
        let env = MapEnv(HashMap::from([("TXN2PG_DB_PORT", "not-a-port")]));
        let mut config = RuntimeConfig::default();
        let err = apply_env_overrides(&mut config, &env).unwrap_err();
        assert!(err.to_string().contains("TXN2PG_DB_PORT"));
    }

    #[test]
    fn test_pgpassword_fallback() {
        let env = MapEnv(HashMap::from([("PGPASSWORD", "from-libpq")]));
        let mut config = RuntimeConfig::default();
        apply_env_overrides(&mut config, &env).unwrap();
        assert_eq!(config.storage.postgres.unwrap().password, "from-libpq");

        let env = MapEnv(HashMap::from([
            ("PGPASSWORD", "from-libpq"),
            ("TXN2PG_DB_PASSWORD", "explicit"),
        ]));
        let mut config = RuntimeConfig::default();
        apply_env_overrides(&mut config, &env).unwrap();
        assert_eq!(config.storage.postgres.unwrap().password, "explicit");
    }

    #[test]
    fn test_storage_backend_and_logging() {
        let env = MapEnv(HashMap::from([
            ("TXN2PG_STORAGE_BACKEND", "memory"),
            ("TXN2PG_LOG_FORMAT", "JSON"),
            ("TXN2PG_FETCH_BACKOFF_MS", "50"),
        ]));
        let mut config = RuntimeConfig::default();
        apply_env_overrides(&mut config, &env).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.app.log_format, LogFormat::Json);
        assert_eq!(config.ingest.fetch_backoff_ms, 50);
    }

    #[test]
    fn test_no_overrides_keeps_defaults() {
        let env = MapEnv::default();
        let mut config = RuntimeConfig::default();
        apply_env_overrides(&mut config, &env).unwrap();
        assert!(config.kafka.brokers.is_empty());
        assert_eq!(config.app.log_level, "info");
    }
}
