//! PostgreSQL-backed [`TransactionStore`] using a `sqlx` connection pool.
//!
//! Rows live in `historical_transactions`; the unique index on
//! `transaction_id` backs the writer's exists-then-create check.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use sqlx::FromRow;
use tracing::{debug, info};
use txn2pg_core::{TransactionRecord, TransactionStatus, TransactionType};

use super::error::{Result, StoreError};
use super::store::{row_id_for, TransactionStore};
use crate::config::PostgresConfig;

const UNIQUE_VIOLATION: &str = "23505";
const TRANSACTION_ID_INDEX: &str = "idx_historical_transactions_transaction_id";

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS historical_transactions (
    id VARCHAR(64) PRIMARY KEY DEFAULT gen_random_uuid()::text,
    user_id BIGINT NOT NULL,
    account_id VARCHAR(255) NOT NULL,
    transaction_id VARCHAR(255) NOT NULL,
    transaction_type VARCHAR(32) NOT NULL,
    transaction_status VARCHAR(32) NOT NULL,
    amount NUMERIC(15,2) NOT NULL,
    balance_before NUMERIC(15,2) NOT NULL,
    balance_after NUMERIC(15,2) NOT NULL,
    currency VARCHAR(3) NOT NULL DEFAULT 'IDR',
    description TEXT,
    external_reference VARCHAR(255),
    payment_method VARCHAR(64),
    metadata TEXT,
    is_accessible_external BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
)
"#;

const CREATE_UNIQUE_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_historical_transactions_transaction_id
    ON historical_transactions (transaction_id)
"#;

const INSERT: &str = r#"
INSERT INTO historical_transactions (
    id, user_id, account_id, transaction_id, transaction_type, transaction_status,
    amount, balance_before, balance_after, currency, description, external_reference,
    payment_method, metadata, is_accessible_external, created_at, updated_at
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
"#;

const SELECT_BY_TRANSACTION_ID: &str = r#"
SELECT id, user_id, account_id, transaction_id, transaction_type, transaction_status,
       amount::float8 AS amount,
       balance_before::float8 AS balance_before,
       balance_after::float8 AS balance_after,
       currency, description, external_reference, payment_method, metadata,
       is_accessible_external, created_at, updated_at
FROM historical_transactions
WHERE transaction_id = $1
"#;

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: String,
    user_id: i64,
    account_id: String,
    transaction_id: String,
    transaction_type: String,
    transaction_status: String,
    amount: f64,
    balance_before: f64,
    balance_after: f64,
    currency: String,
    description: Option<String>,
    external_reference: Option<String>,
    payment_method: Option<String>,
    metadata: Option<String>,
    is_accessible_external: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TransactionRow> for TransactionRecord {
    fn from(row: TransactionRow) -> Self {
        TransactionRecord {
            id: row.id,
            user_id: row.user_id,
            account_id: row.account_id,
            transaction_id: row.transaction_id,
            transaction_type: TransactionType::from_wire(&row.transaction_type),
            transaction_status: TransactionStatus::from_wire(&row.transaction_status),
            amount: row.amount,
            balance_before: row.balance_before,
            balance_after: row.balance_after,
            currency: row.currency,
            description: row.description,
            external_reference: row.external_reference,
            payment_method: row.payment_method,
            metadata: row.metadata,
            is_accessible_from_external: row.is_accessible_external,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Open the pool and verify connectivity. Creates the table and its
    /// unique index first when `create_schema` is set.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let ssl_mode = PgSslMode::from_str(&config.sslmode)
            .map_err(|e| StoreError::unavailable(format!("invalid sslmode: {}", e)))?;

        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.name)
            .ssl_mode(ssl_mode);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .max_lifetime(config.conn_max_lifetime())
            .acquire_timeout(config.acquire_timeout())
            .connect_with(options)
            .await
            .map_err(|e| StoreError::unavailable(e.to_string()))?;

        info!(
            host = %config.host,
            port = config.port,
            database = %config.name,
            "Connected to PostgreSQL"
        );

        let store = Self { pool };
        if config.create_schema {
            store.ensure_schema().await?;
        }
        Ok(store)
    }

    /// Wrap an already-open pool. The schema is left as it is.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE)
            .execute(&self.pool)
            .await
            .map_err(map_error)?;
        sqlx::query(CREATE_UNIQUE_INDEX)
            .execute(&self.pool)
            .await
            .map_err(map_error)?;
        debug!("historical_transactions schema is in place");
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for PostgresStore {
    async fn exists(&self, transaction_id: &str) -> Result<bool> {
        let (found,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM historical_transactions WHERE transaction_id = $1)",
        )
        .bind(transaction_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_error)?;
        Ok(found)
    }

    async fn create(&self, record: &TransactionRecord) -> Result<String> {
        let id = row_id_for(record);

        sqlx::query(INSERT)
            .bind(&id)
            .bind(record.user_id)
            .bind(&record.account_id)
            .bind(&record.transaction_id)
            .bind(record.transaction_type.as_str())
            .bind(record.transaction_status.as_str())
            .bind(record.amount)
            .bind(record.balance_before)
            .bind(record.balance_after)
            .bind(&record.currency)
            .bind(&record.description)
            .bind(&record.external_reference)
            .bind(&record.payment_method)
            .bind(&record.metadata)
            .bind(record.is_accessible_from_external)
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| match unique_violation_constraint(&e) {
                Some(constraint) => {
                    classify_unique_violation(constraint.as_deref(), &record.transaction_id, &id)
                }
                None => map_error(e),
            })?;

        Ok(id)
    }

    async fn get_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<TransactionRecord>> {
        let row: Option<TransactionRow> = sqlx::query_as(SELECT_BY_TRANSACTION_ID)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_error)?;
        Ok(row.map(TransactionRecord::from))
    }
}

/// `Some(constraint)` when `err` is a unique violation, carrying the name of
/// the violated constraint if the server reported one.
fn unique_violation_constraint(err: &sqlx::Error) -> Option<Option<String>> {
    match err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            Some(db.constraint().map(str::to_string))
        }
        _ => None,
    }
}

// Only the transaction_id index means "already stored". A clash on the
// primary key is a different transaction reusing a row id and must fail.
fn classify_unique_violation(
    constraint: Option<&str>,
    transaction_id: &str,
    row_id: &str,
) -> StoreError {
    match constraint {
        Some(TRANSACTION_ID_INDEX) => StoreError::duplicate(transaction_id),
        Some(other) => StoreError::query_failure(format!(
            "unique constraint {} violated by transaction {} (row id {})",
            other, transaction_id, row_id
        )),
        None => StoreError::query_failure(format!(
            "unique violation on unnamed constraint for transaction {} (row id {})",
            transaction_id, row_id
        )),
    }
}

fn map_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StoreError::unavailable(err.to_string()),
        other => StoreError::query_failure(other.to_string()),
    }
}
