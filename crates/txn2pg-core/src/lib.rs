// txn2pg-core - Pure transaction-event logic
//
// This crate holds everything about a transaction event that does not
// touch the network or the database: decoding the wire payload,
// translating it into a domain record, and deciding whether that record
// is fit to persist. No I/O, no async, no runtime dependencies.

pub mod event;
pub mod record;
pub mod translate;

pub use event::{parse_timestamp, DecodeError, RawEvent, TimestampError};
pub use record::{TransactionRecord, TransactionStatus, TransactionType};
pub use translate::{translate, translate_with_clock, MINOR_UNITS_PER_MAJOR};
