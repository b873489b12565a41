//! Log sources the ingestion loop pulls messages from.
//!
//! A source hands out one [`Delivery`] at a time and is told, through
//! [`LogSource::acknowledge`], when the cursor may move past it.

use async_trait::async_trait;
use thiserror::Error;

#[cfg(feature = "kafka")]
mod kafka;
mod memory;

#[cfg(feature = "kafka")]
pub use kafka::KafkaSource;
pub use memory::MemoryLog;

/// Position of a delivered message within the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryToken {
    pub partition: i32,
    pub offset: i64,
}

/// One message pulled from the log.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub payload: Vec<u8>,
    pub token: DeliveryToken,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to fetch message: {0}")]
    Fetch(String),

    #[error("failed to acknowledge partition {partition} offset {offset}: {message}")]
    Acknowledge {
        partition: i32,
        offset: i64,
        message: String,
    },

    #[cfg(feature = "kafka")]
    #[error("kafka client error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
}

/// A partitioned, replayable log with a consumer-side cursor.
///
/// `fetch_next` must be safe to cancel: dropping the future before it
/// resolves must not lose a message.
#[async_trait]
pub trait LogSource: Send + Sync {
    async fn fetch_next(&self) -> Result<Delivery, SourceError>;

    /// Advance the cursor past `token`.
    async fn acknowledge(&self, token: DeliveryToken) -> Result<(), SourceError>;
}
