// In-process store used by `storage.backend = "memory"` and by tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use txn2pg_core::TransactionRecord;

use super::error::{Result, StoreError};
use super::store::{row_id_for, TransactionStore};

#[derive(Default)]
struct Rows {
    by_transaction_id: HashMap<String, TransactionRecord>,
    row_ids: HashSet<String>,
    insertion_order: Vec<String>,
}

/// HashMap-backed [`TransactionStore`] with the same uniqueness guarantees
/// as the PostgreSQL table: one row per transaction id and one per row id.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Rows>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().insertion_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Persisted rows in insertion order.
    pub fn records(&self) -> Vec<TransactionRecord> {
        let rows = self.rows.lock();
        rows.insertion_order
            .iter()
            .filter_map(|tx_id| rows.by_transaction_id.get(tx_id).cloned())
            .collect()
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn exists(&self, transaction_id: &str) -> Result<bool> {
        Ok(self.rows.lock().by_transaction_id.contains_key(transaction_id))
    }

    async fn create(&self, record: &TransactionRecord) -> Result<String> {
        let mut rows = self.rows.lock();
        if rows.by_transaction_id.contains_key(&record.transaction_id) {
            return Err(StoreError::duplicate(&record.transaction_id));
        }

        let id = row_id_for(record);
        if rows.row_ids.contains(&id) {
            return Err(StoreError::query_failure(format!(
                "row id {} already used by another transaction (transaction {})",
                id, record.transaction_id
            )));
        }

        let mut stored = record.clone();
        stored.id = id.clone();

        rows.row_ids.insert(id.clone());
        rows.insertion_order.push(record.transaction_id.clone());
        rows.by_transaction_id
            .insert(record.transaction_id.clone(), stored);
        Ok(id)
    }

    async fn get_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<TransactionRecord>> {
        Ok(self.rows.lock().by_transaction_id.get(transaction_id).cloned())
    }
}
