// Wire-level transaction event
//
// Producers publish one JSON object per log message. The structure is
// loosely typed: any key may be missing or null and still decode to its
// zero value, so that only genuinely undecodable payloads are rejected here.
// Everything else is left to translation and validation.

use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use thiserror::Error;

mod timestamp;

pub use timestamp::{parse_timestamp, TimestampError};

/// Errors produced while decoding a raw log payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty message payload")]
    Empty,

    #[error("failed to unmarshal message: {0}")]
    Json(#[from] serde_json::Error),
}

/// A transaction event exactly as it appears on the wire.
///
/// `amount` is in minor currency units; timestamps are component arrays of
/// the form `[year, month, day, hour, minute, second, nanosecond?]`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawEvent {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub user_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub account_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub transaction_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub transaction_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub transaction_status: String,
    #[serde(deserialize_with = "null_as_default")]
    pub amount: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub balance_before: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub balance_after: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub currency: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    pub external_reference: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub payment_method: String,
    pub metadata: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub is_accessible_from_external: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub created_at: Vec<JsonValue>,
    #[serde(deserialize_with = "null_as_default")]
    pub updated_at: Vec<JsonValue>,
}

impl RawEvent {
    /// Decode a log payload into a raw event.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.iter().all(u8::is_ascii_whitespace) {
            return Err(DecodeError::Empty);
        }
        Ok(serde_json::from_slice(payload)?)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
