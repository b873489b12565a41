//! Kafka consumer-group source backed by `rdkafka`.
//!
//! Auto-commit is disabled; the cursor moves only when the ingestion loop
//! acknowledges a delivery, by committing `offset + 1` for its partition.

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use tracing::info;

use super::{Delivery, DeliveryToken, LogSource, SourceError};
use crate::config::KafkaConfig;

pub struct KafkaSource {
    consumer: StreamConsumer,
    topic: String,
}

impl KafkaSource {
    /// Create the consumer and subscribe to the configured topic.
    pub fn connect(config: &KafkaConfig) -> Result<Self, SourceError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", config.brokers.join(","))
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("fetch.max.bytes", config.fetch_max_bytes.to_string())
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .create()?;

        consumer.subscribe(&[config.topic.as_str()])?;

        info!(
            brokers = %config.brokers.join(","),
            topic = %config.topic,
            group_id = %config.group_id,
            "Kafka consumer subscribed"
        );

        Ok(Self {
            consumer,
            topic: config.topic.clone(),
        })
    }
}

#[async_trait]
impl LogSource for KafkaSource {
    async fn fetch_next(&self) -> Result<Delivery, SourceError> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| SourceError::Fetch(e.to_string()))?;

        Ok(Delivery {
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            token: DeliveryToken {
                partition: message.partition(),
                offset: message.offset(),
            },
        })
    }

    async fn acknowledge(&self, token: DeliveryToken) -> Result<(), SourceError> {
        let ack_error = |message: String| SourceError::Acknowledge {
            partition: token.partition,
            offset: token.offset,
            message,
        };

        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&self.topic, token.partition, Offset::Offset(token.offset + 1))
            .map_err(|e| ack_error(e.to_string()))?;

        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| ack_error(e.to_string()))
    }
}
