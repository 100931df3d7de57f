//! Kafka consumer implementation for the change pipeline.
//!
//! Consumes change notifications from Kafka topics and forwards them to the
//! orchestrator in batches.

use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig,
    consumer::{Consumer as RdKafkaConsumer, StreamConsumer},
    message::Message as KafkaMessage,
    TopicPartitionList,
};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, instrument};

use search_sync_shared::ChangeNotification;

use crate::consumer::commit_gate::CommitGate;
use crate::consumer::messages::{parse_notifications, MessageOffset, StreamMessage};
use crate::errors::IngestError;
use crate::orchestrator::Consumer;

/// Default topic carrying change notifications.
pub const DEFAULT_CHANGES_TOPIC: &str = "entity.changes";

/// Default number of Kafka messages batched before sending.
const DEFAULT_BATCH_SIZE: usize = 50;

/// Default batch timeout in milliseconds.
const DEFAULT_BATCH_TIMEOUT_MS: u64 = 1000;

/// Kafka consumer for change notifications.
pub struct KafkaConsumer {
    consumer: StreamConsumer,
    topics: Vec<String>,
    batch_size: usize,
    batch_timeout: Duration,
}

impl KafkaConsumer {
    /// Create a new Kafka consumer reading `topic`.
    ///
    /// # Arguments
    ///
    /// * `brokers` - Kafka broker addresses (comma-separated)
    /// * `group_id` - Consumer group ID
    /// * `topic` - Topic carrying change notifications
    pub fn new(brokers: &str, group_id: &str, topic: &str) -> Result<Self, IngestError> {
        Self::with_batch_config(
            brokers,
            group_id,
            topic,
            DEFAULT_BATCH_SIZE,
            DEFAULT_BATCH_TIMEOUT_MS,
        )
    }

    /// Create a new Kafka consumer with custom batch configuration.
    ///
    /// # Arguments
    ///
    /// * `brokers` - Kafka broker addresses (comma-separated)
    /// * `group_id` - Consumer group ID
    /// * `topic` - Topic carrying change notifications
    /// * `batch_size` - Number of messages to batch before sending
    /// * `batch_timeout_ms` - Maximum time to wait before flushing a partial batch (milliseconds)
    ///
    /// # Returns
    ///
    /// * `Ok(KafkaConsumer)` - A new consumer instance
    /// * `Err(IngestError)` - If consumer creation fails
    pub fn with_batch_config(
        brokers: &str,
        group_id: &str,
        topic: &str,
        batch_size: usize,
        batch_timeout_ms: u64,
    ) -> Result<Self, IngestError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .create()
            .map_err(|e| IngestError::kafka(e.to_string()))?;

        info!(
            brokers = %brokers,
            group_id = %group_id,
            topic = %topic,
            batch_size = batch_size,
            batch_timeout_ms = batch_timeout_ms,
            "Created Kafka consumer with batching"
        );

        Ok(Self {
            consumer,
            topics: vec![topic.to_string()],
            batch_size: batch_size.max(1),
            batch_timeout: Duration::from_millis(batch_timeout_ms),
        })
    }

    /// Send the pending notifications with their offsets.
    async fn flush_batch(
        &self,
        notifications: &mut Vec<ChangeNotification>,
        offsets: &mut Vec<MessageOffset>,
        sender: &mpsc::Sender<StreamMessage>,
    ) -> Result<(), IngestError> {
        if offsets.is_empty() {
            return Ok(());
        }

        info!(
            notification_count = notifications.len(),
            offset_count = offsets.len(),
            "Sending batch of notifications to orchestrator"
        );
        sender
            .send(StreamMessage::Notifications {
                notifications: std::mem::take(notifications),
                offsets: std::mem::take(offsets),
            })
            .await
            .map_err(|e| IngestError::ChannelError(e.to_string()))
    }

    /// Commit offsets for a batch of messages.
    fn commit_offsets(&self, offsets: &[MessageOffset]) -> Result<(), IngestError> {
        if offsets.is_empty() {
            return Ok(());
        }

        let mut tpl = TopicPartitionList::new();
        for (topic, partition, offset) in offsets {
            tpl.add_partition_offset(topic, *partition, rdkafka::Offset::Offset(offset + 1))?;
        }

        self.consumer
            .commit(&tpl, rdkafka::consumer::CommitMode::Async)?;

        Ok(())
    }

    /// Decode a Kafka message.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(notifications))` - The message carried notifications
    /// * `Ok(None)` - The message carried nothing to process
    /// * `Err(IngestError)` - The payload could not be decoded
    fn parse_message(
        &self,
        msg: &rdkafka::message::BorrowedMessage<'_>,
    ) -> Result<Option<Vec<ChangeNotification>>, IngestError> {
        let payload = match msg.payload() {
            Some(p) => p,
            None => {
                debug!("Received message with empty payload");
                return Ok(None);
            }
        };

        let notifications = parse_notifications(payload)?;
        if notifications.is_empty() {
            return Ok(None);
        }

        Ok(Some(notifications))
    }
}

#[async_trait]
impl Consumer for KafkaConsumer {
    /// Subscribe to configured topics.
    fn subscribe(&self) -> Result<(), IngestError> {
        let topics: Vec<&str> = self.topics.iter().map(|s| s.as_str()).collect();
        self.consumer.subscribe(&topics)?;

        info!(topics = ?self.topics, "Subscribed to Kafka topics");
        Ok(())
    }

    /// Start consuming messages and send them through the channel.
    ///
    /// Offsets are committed only after the orchestrator acknowledges the
    /// delivery. A failed delivery or an undecodable message stops the
    /// consumer with `IngestError::DeliveryFailed` before any later offset of
    /// its partition is committed, so a restart reads it again.
    #[instrument(skip(self, sender, ack_receiver, shutdown))]
    async fn run(
        &self,
        sender: mpsc::Sender<StreamMessage>,
        mut ack_receiver: mpsc::Receiver<StreamMessage>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), IngestError> {
        use futures::StreamExt;

        let mut message_stream = self.consumer.stream();
        let mut pending: Vec<ChangeNotification> = Vec::new();
        let mut pending_offsets: Vec<MessageOffset> = Vec::with_capacity(self.batch_size);
        let mut gate = CommitGate::new();
        let mut flush_timer = tokio::time::interval(self.batch_timeout);
        flush_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        flush_timer.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Consumer received shutdown signal");
                    // Pending messages are not committed and will be re-read on restart
                    let _ = sender.send(StreamMessage::End).await;
                    break;
                }
                ack_msg = ack_receiver.recv() => {
                    match ack_msg {
                        Some(StreamMessage::Acknowledgment { offsets, success, error }) => {
                            let committable = gate.acknowledge(&offsets, success);
                            if let Err(e) = self.commit_offsets(&committable) {
                                error!(error = %e, "Failed to commit offsets after acknowledgment");
                            } else if !committable.is_empty() {
                                debug!(offset_count = committable.len(), "Committed offsets after successful processing");
                            }

                            if gate.is_blocked() {
                                let reason = error.unwrap_or_else(|| "Unknown error".to_string());
                                error!(
                                    positions = ?gate.failed_positions(),
                                    error = %reason,
                                    "Delivery failed, stopping consumer without committing past it"
                                );
                                let _ = sender.send(StreamMessage::End).await;
                                return Err(IngestError::delivery_failed(gate.failed_positions(), reason));
                            }
                        }
                        Some(StreamMessage::End) | None => {
                            info!("Acknowledgment channel closed");
                            break;
                        }
                        _ => {}
                    }
                }
                message = message_stream.next() => {
                    match message {
                        Some(Ok(msg)) => {
                            debug!(
                                topic = %msg.topic(),
                                partition = msg.partition(),
                                offset = msg.offset(),
                                "Received message from Kafka"
                            );
                            let offset = (msg.topic().to_string(), msg.partition(), msg.offset());
                            match self.parse_message(&msg) {
                                Ok(Some(notifications)) => {
                                    pending.extend(notifications);
                                    pending_offsets.push(offset);

                                    if pending_offsets.len() >= self.batch_size {
                                        self.flush_batch(&mut pending, &mut pending_offsets, &sender).await?;
                                    }
                                }
                                Ok(None) => {
                                    // Committed with the batch, never ahead of earlier messages
                                    debug!(
                                        topic = %msg.topic(),
                                        partition = msg.partition(),
                                        offset = msg.offset(),
                                        "Message carried no notifications"
                                    );
                                    pending_offsets.push(offset);
                                    if pending_offsets.len() >= self.batch_size {
                                        self.flush_batch(&mut pending, &mut pending_offsets, &sender).await?;
                                    }
                                }
                                Err(e) => {
                                    error!(
                                        topic = %msg.topic(),
                                        partition = msg.partition(),
                                        offset = msg.offset(),
                                        error = %e,
                                        "Failed to parse message, stopping consumer"
                                    );
                                    gate.reject(&[offset]);
                                    let _ = sender.send(StreamMessage::End).await;
                                    return Err(IngestError::delivery_failed(
                                        gate.failed_positions(),
                                        e.to_string(),
                                    ));
                                }
                            }
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "Kafka error");
                            let _ = sender.send(StreamMessage::Error(e.to_string())).await;
                        }
                        None => {
                            info!("Kafka stream ended");
                            self.flush_batch(&mut pending, &mut pending_offsets, &sender).await?;
                            let _ = sender.send(StreamMessage::End).await;
                            break;
                        }
                    }
                }
                _ = flush_timer.tick() => {
                    if !pending_offsets.is_empty() {
                        debug!(count = pending_offsets.len(), "Flushing batch due to timeout");
                        self.flush_batch(&mut pending, &mut pending_offsets, &sender).await?;
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(DEFAULT_CHANGES_TOPIC, "entity.changes");
        assert_eq!(DEFAULT_BATCH_SIZE, 50);
        assert_eq!(DEFAULT_BATCH_TIMEOUT_MS, 1000);
    }
}
