//! Consumer module for the change pipeline.
//!
//! Provides Kafka consumer functionality for receiving change notifications.

mod commit_gate;
mod kafka_consumer;
mod messages;

pub use commit_gate::CommitGate;
pub use kafka_consumer::{KafkaConsumer, DEFAULT_CHANGES_TOPIC};
pub use messages::{parse_notifications, MessageOffset, StreamMessage};
