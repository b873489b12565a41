//! Canonical transaction record and its persistence invariants.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;

/// Kind of balance movement carried by a transaction.
///
/// Values outside the known vocabulary are kept verbatim in `Other` so that
/// translation never drops information; only an empty value makes a record
/// invalid.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransactionType {
    Topup,
    Payment,
    Refund,
    Transfer,
    Other(String),
}

impl TransactionType {
    pub fn from_wire(value: &str) -> Self {
        match value {
            "TOPUP" => Self::Topup,
            "PAYMENT" => Self::Payment,
            "REFUND" => Self::Refund,
            "TRANSFER" => Self::Transfer,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Topup => "TOPUP",
            Self::Payment => "PAYMENT",
            Self::Refund => "REFUND",
            Self::Transfer => "TRANSFER",
            Self::Other(value) => value,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TransactionType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Settlement state of a transaction at the time the event was emitted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
    Cancelled,
    Other(String),
}

impl TransactionStatus {
    pub fn from_wire(value: &str) -> Self {
        match value {
            "PENDING" => Self::Pending,
            "SUCCESS" => Self::Success,
            "FAILED" => Self::Failed,
            "CANCELLED" => Self::Cancelled,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "PENDING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Other(value) => value,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TransactionStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A translated transaction, ready to be checked and persisted.
///
/// `amount` is in major currency units. Balances are carried exactly as the
/// producer sent them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: String,
    pub user_id: i64,
    pub account_id: String,
    pub transaction_id: String,
    pub transaction_type: TransactionType,
    pub transaction_status: TransactionStatus,
    pub amount: f64,
    pub balance_before: f64,
    pub balance_after: f64,
    pub currency: String,
    pub description: Option<String>,
    pub external_reference: Option<String>,
    pub payment_method: Option<String>,
    pub metadata: Option<String>,
    pub is_accessible_from_external: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// Whether the record satisfies every invariant required for persistence.
    pub fn is_valid(&self) -> bool {
        self.user_id > 0
            && !self.account_id.is_empty()
            && !self.transaction_id.is_empty()
            && !self.transaction_type.as_str().is_empty()
            && self.amount > 0.0
    }

    /// A failed transaction should never have moved the balance.
    pub fn has_failed_balance_change(&self) -> bool {
        self.transaction_status == TransactionStatus::Failed
            && self.balance_before != self.balance_after
    }
}
