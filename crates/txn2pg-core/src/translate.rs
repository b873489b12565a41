// RawEvent -> TransactionRecord translation
//
// Translation never fails. A malformed timestamp is replaced with the
// current instant (and reported at warn level) so that a bad clock field
// on the producer side cannot block an otherwise valid transaction.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::event::{parse_timestamp, RawEvent};
use crate::record::{TransactionRecord, TransactionStatus, TransactionType};

/// Fixed divisor between wire minor units and stored major units.
pub const MINOR_UNITS_PER_MAJOR: f64 = 100.0;

/// Translate a raw event using the system clock for timestamp fallback.
pub fn translate(event: RawEvent) -> TransactionRecord {
    translate_with_clock(event, Utc::now)
}

/// Translate a raw event, calling `now` for any timestamp that cannot be parsed.
pub fn translate_with_clock<F>(event: RawEvent, now: F) -> TransactionRecord
where
    F: Fn() -> DateTime<Utc>,
{
    let created_at = timestamp_or_now(&event.created_at, "createdAt", &event.transaction_id, &now);
    let updated_at = timestamp_or_now(&event.updated_at, "updatedAt", &event.transaction_id, &now);

    TransactionRecord {
        id: event.id,
        user_id: event.user_id,
        account_id: event.account_id,
        transaction_type: TransactionType::from_wire(&event.transaction_type),
        transaction_status: TransactionStatus::from_wire(&event.transaction_status),
        transaction_id: event.transaction_id,
        amount: event.amount / MINOR_UNITS_PER_MAJOR,
        balance_before: event.balance_before,
        balance_after: event.balance_after,
        currency: event.currency,
        description: non_empty(event.description),
        external_reference: event.external_reference,
        payment_method: non_empty(event.payment_method),
        metadata: event.metadata,
        is_accessible_from_external: event.is_accessible_from_external,
        created_at,
        updated_at,
    }
}

fn timestamp_or_now<F>(
    components: &[JsonValue],
    field: &'static str,
    transaction_id: &str,
    now: &F,
) -> DateTime<Utc>
where
    F: Fn() -> DateTime<Utc>,
{
    match parse_timestamp(components) {
        Ok(ts) => ts,
        Err(e) => {
            warn!(
                field,
                transaction_id,
                error = %e,
                "Failed to parse timestamp, using current time"
            );
            now()
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
