//! Transaction persistence.
//!
//! A [`TransactionStore`] is the durable home for rows; the
//! [`IdempotentWriter`] decides whether a record needs writing at all.

mod error;
mod idempotent;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod store;

pub use error::{ErrorCode, StoreError};
pub use idempotent::{IdempotentWriter, WriteOutcome};
pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
pub use store::TransactionStore;
