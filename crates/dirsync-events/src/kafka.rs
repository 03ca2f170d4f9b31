//! Kafka-backed subscription.
//!
//! Offsets are committed manually once a batch is acknowledged, so a crash
//! mid-batch redelivers it (at-least-once).

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::bus::{BusMessage, ConsumeResult, MessageSubscription};
use crate::config::KafkaConfig;
use crate::error::EventError;

/// How long to wait for more messages once a batch has started.
const BATCH_LINGER: Duration = Duration::from_millis(200);

/// Subscription to the deletion topic.
pub struct KafkaSubscription {
    consumer: StreamConsumer,
    topic: String,
    batch_size: usize,
    /// Next offset to commit, per partition, for the batch in flight.
    pending: HashMap<i32, i64>,
}

impl KafkaSubscription {
    /// Create the consumer and subscribe to the configured topic.
    pub fn new(config: &KafkaConfig) -> Result<Self, EventError> {
        let mut client_config = ClientConfig::new();
        for (key, value) in config.client_properties() {
            client_config.set(key, value);
        }

        let consumer: StreamConsumer =
            client_config
                .create()
                .map_err(|e| EventError::ConnectionFailed {
                    broker: config.bootstrap_servers.clone(),
                    cause: e.to_string(),
                })?;

        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(|e| EventError::ConsumeFailed {
                topic: config.topic.clone(),
                cause: e.to_string(),
            })?;

        info!(
            topic = %config.topic,
            group_id = %config.group_id,
            bootstrap_servers = %config.bootstrap_servers,
            "Subscribed to topic"
        );

        Ok(Self {
            consumer,
            topic: config.topic.clone(),
            batch_size: config.batch_size,
            pending: HashMap::new(),
        })
    }

    fn record(&mut self, partition: i32, offset: i64) {
        let next = offset + 1;
        let entry = self.pending.entry(partition).or_insert(next);
        if *entry < next {
            *entry = next;
        }
    }
}

#[async_trait]
impl MessageSubscription for KafkaSubscription {
    async fn next_batch(&mut self) -> Result<Option<Vec<BusMessage>>, EventError> {
        let mut batch = Vec::new();

        let first = self.consumer.recv().await?;
        let (partition, offset) = (first.partition(), first.offset());
        batch.push(BusMessage::new(
            format!("{partition}:{offset}"),
            first.payload().unwrap_or_default(),
        ));
        drop(first);
        self.record(partition, offset);

        while batch.len() < self.batch_size {
            let message = match tokio::time::timeout(BATCH_LINGER, self.consumer.recv()).await {
                Err(_) => break,
                Ok(Err(e)) => {
                    warn!(error = %e, "Error receiving message, closing batch early");
                    break;
                }
                Ok(Ok(message)) => message,
            };
            let (partition, offset) = (message.partition(), message.offset());
            batch.push(BusMessage::new(
                format!("{partition}:{offset}"),
                message.payload().unwrap_or_default(),
            ));
            drop(message);
            self.record(partition, offset);
        }

        debug!(size = batch.len(), "Received batch");
        Ok(Some(batch))
    }

    async fn ack(&mut self, _result: ConsumeResult) -> Result<(), EventError> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let mut tpl = TopicPartitionList::new();
        for (partition, offset) in self.pending.drain() {
            tpl.add_partition_offset(&self.topic, partition, Offset::Offset(offset))
                .map_err(|e| EventError::ConsumeFailed {
                    topic: self.topic.clone(),
                    cause: e.to_string(),
                })?;
        }

        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| EventError::ConsumeFailed {
                topic: self.topic.clone(),
                cause: e.to_string(),
            })
    }
}

impl std::fmt::Debug for KafkaSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaSubscription")
            .field("topic", &self.topic)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}
