// Per-message handling for the ingestion loop
//
// decode -> translate -> idempotent write. Every path returns something the
// loop can log and then acknowledge.

use metrics::counter;
use thiserror::Error;
use tracing::debug;
use txn2pg_core::{translate, DecodeError, RawEvent};

use crate::source::Delivery;
use crate::writer::{IdempotentWriter, StoreError, WriteOutcome};

/// Terminal, non-error result of handling one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageDisposition {
    Written { id: String },
    Skipped,
    Rejected,
}

impl MessageDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Written { .. } => "written",
            Self::Skipped => "skipped",
            Self::Rejected => "rejected",
        }
    }
}

/// Why a message could not be handled.
#[derive(Debug, Error)]
pub enum MessageError {
    /// Payload is not a decodable event. Redelivery cannot fix this.
    #[error(transparent)]
    Malformed(#[from] DecodeError),

    /// Storage failed while checking or inserting the row.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl MessageError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::Storage(_) => "storage",
        }
    }

    /// Whether a later redelivery of the same payload could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

#[derive(Clone)]
pub struct MessageHandler {
    writer: IdempotentWriter,
}

impl MessageHandler {
    pub fn new(writer: IdempotentWriter) -> Self {
        Self { writer }
    }

    pub async fn handle(&self, delivery: &Delivery) -> Result<MessageDisposition, MessageError> {
        debug!(
            partition = delivery.token.partition,
            offset = delivery.token.offset,
            bytes = delivery.payload.len(),
            "Handling message"
        );

        let event = RawEvent::decode(&delivery.payload).inspect_err(|_| {
            counter!("txn2pg.messages.malformed").increment(1);
        })?;
        let record = translate(event);

        match self.writer.process(&record).await {
            WriteOutcome::Written { id } => Ok(MessageDisposition::Written { id }),
            WriteOutcome::Skipped => Ok(MessageDisposition::Skipped),
            WriteOutcome::Rejected => Ok(MessageDisposition::Rejected),
            WriteOutcome::Failed(e) => Err(MessageError::Storage(e)),
        }
    }
}
