//! Error types for the search sync pipeline.
//!
//! Configuration errors (`RegistryError`) are fatal. Handler errors come from
//! resolving or transforming targets. `SyncError` is the error of every
//! pipeline and lifecycle operation; `IngestError` is raised by the Kafka
//! worker.

use thiserror::Error;

use search_sync_repository::{EntityStoreError, SearchIndexError};

/// Handler registry misconfiguration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Two handlers were registered with the same key.
    #[error("Duplicate handler key: {0}")]
    DuplicateHandlerKey(String),

    /// No handler is registered under the key.
    #[error("Handler not found: {0}")]
    HandlerNotFound(String),

    /// The handler exists but only supports raw indexing.
    #[error("Handler '{0}' does not support document transforms")]
    HandlerNotTransformable(String),
}

/// Errors raised inside a handler while resolving or transforming targets.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The entity store could not be read.
    #[error("Store error: {0}")]
    Store(#[from] EntityStoreError),

    /// A subscription transformer failed.
    #[error("Transform error: {0}")]
    Transform(String),
}

impl HandlerError {
    /// Create a transform error.
    pub fn transform(msg: impl Into<String>) -> Self {
        Self::Transform(msg.into())
    }
}

/// Errors of the sync pipeline and of index lifecycle operations.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Handler error: {0}")]
    Handler(#[from] HandlerError),

    #[error("Search index error: {0}")]
    SearchIndex(#[from] SearchIndexError),

    #[error("Entity store error: {0}")]
    EntityStore(#[from] EntityStoreError),

    /// A subscription transformer failed for a notification.
    #[error("Transform of '{entity_class}' change failed in handler '{handler_key}': {source}")]
    Transform {
        handler_key: String,
        entity_class: String,
        #[source]
        source: HandlerError,
    },

    /// The physical index to create already exists.
    #[error("Index already exists: {0}")]
    IndexAlreadyExists(String),

    /// The root alias name is taken by a concrete index.
    #[error("'{0}' is a concrete index, not an alias")]
    AliasConflict(String),

    /// A batch could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The batch queue is closed.
    #[error("Queue error: {0}")]
    Queue(String),

    /// A lifecycle operation failed for one handler.
    #[error("{operation} failed for handler '{handler}': {source}")]
    Operation {
        operation: String,
        handler: String,
        #[source]
        source: Box<SyncError>,
    },
}

impl SyncError {
    /// Create a queue error.
    pub fn queue(msg: impl Into<String>) -> Self {
        Self::Queue(msg.into())
    }

    /// Wrap an error with the operation and handler it occurred in.
    pub fn operation(
        operation: impl Into<String>,
        handler: impl Into<String>,
        source: impl Into<SyncError>,
    ) -> Self {
        Self::Operation {
            operation: operation.into(),
            handler: handler.into(),
            source: Box::new(source.into()),
        }
    }

    /// The search index error behind this error, if any.
    pub fn search_index_error(&self) -> Option<&SearchIndexError> {
        match self {
            Self::SearchIndex(e) => Some(e),
            Self::Operation { source, .. } => source.search_index_error(),
            _ => None,
        }
    }
}

/// Errors that can occur in the Kafka ingest.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Kafka-related error.
    #[error("Kafka error: {0}")]
    KafkaError(String),

    /// Error parsing or decoding data.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Channel communication error.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Notifications could not be synced.
    #[error("Sync error: {0}")]
    SyncError(#[from] SyncError),

    /// A delivery failed; nothing from the listed positions on was committed.
    #[error("Delivery failed at {positions:?}: {reason}")]
    DeliveryFailed {
        positions: Vec<(String, i32, i64)>,
        reason: String,
    },
}

impl IngestError {
    /// Create a Kafka error.
    pub fn kafka(msg: impl Into<String>) -> Self {
        Self::KafkaError(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create a delivery failure.
    pub fn delivery_failed(positions: Vec<(String, i32, i64)>, reason: impl Into<String>) -> Self {
        Self::DeliveryFailed {
            positions,
            reason: reason.into(),
        }
    }
}

impl From<rdkafka::error::KafkaError> for IngestError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        Self::KafkaError(err.to_string())
    }
}
