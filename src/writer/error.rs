//! Error types for transaction storage operations.

use thiserror::Error;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// E101: Row with this transaction id already exists
    E101Duplicate,
    /// E102: Store could not be reached (pool exhausted, connection refused)
    E102Unavailable,
    /// E103: Statement failed for any other reason
    E103QueryFailure,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E101Duplicate => "E101",
            Self::E102Unavailable => "E102",
            Self::E103QueryFailure => "E103",
        }
    }
}

/// Errors returned by a [`TransactionStore`](super::TransactionStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique constraint on transaction_id rejected the insert
    #[error("[{code}] Transaction already stored: {transaction_id}")]
    Duplicate {
        code: &'static str,
        transaction_id: String,
    },

    #[error("[{code}] Store unavailable: {message}")]
    Unavailable { code: &'static str, message: String },

    #[error("[{code}] Store query failed: {message}")]
    QueryFailure { code: &'static str, message: String },
}

impl StoreError {
    pub fn duplicate(transaction_id: impl Into<String>) -> Self {
        Self::Duplicate {
            code: ErrorCode::E101Duplicate.as_str(),
            transaction_id: transaction_id.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            code: ErrorCode::E102Unavailable.as_str(),
            message: message.into(),
        }
    }

    pub fn query_failure(message: impl Into<String>) -> Self {
        Self::QueryFailure {
            code: ErrorCode::E103QueryFailure.as_str(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Duplicate { .. } => ErrorCode::E101Duplicate,
            Self::Unavailable { .. } => ErrorCode::E102Unavailable,
            Self::QueryFailure { .. } => ErrorCode::E103QueryFailure,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

/// Result type alias for StoreError
pub type Result<T> = std::result::Result<T, StoreError>;
