//! Message types for the consumer.
//!
//! Defines the messages exchanged between the consumer and the orchestrator.

use serde::Deserialize;

use search_sync_shared::ChangeNotification;

use crate::errors::IngestError;

/// Kafka position of a consumed message: topic, partition and offset.
pub type MessageOffset = (String, i32, i64);

/// Messages that flow through the ingest.
#[derive(Debug)]
pub enum StreamMessage {
    /// A delivery of change notifications with the offsets to acknowledge.
    Notifications {
        notifications: Vec<ChangeNotification>,
        offsets: Vec<MessageOffset>,
    },
    /// Acknowledgment of a delivery.
    Acknowledgment {
        offsets: Vec<MessageOffset>,
        success: bool,
        error: Option<String>,
    },
    /// Stream has ended.
    End,
    /// An error occurred.
    Error(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Payload {
    Many(Vec<ChangeNotification>),
    One(ChangeNotification),
}

/// Decode a message payload into change notifications.
///
/// A payload holds either a single notification object or an array of them.
pub fn parse_notifications(payload: &[u8]) -> Result<Vec<ChangeNotification>, IngestError> {
    let payload: Payload = serde_json::from_slice(payload)
        .map_err(|e| IngestError::parse(format!("Failed to decode change notification: {}", e)))?;

    Ok(match payload {
        Payload::Many(notifications) => notifications,
        Payload::One(notification) => vec![notification],
    })
}
