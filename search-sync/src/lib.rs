//! # Search Sync
//!
//! Keeps OpenSearch indices in sync with a relational store.
//!
//! ## Architecture
//!
//! Changes flow through a subscription pipeline:
//!
//! 1. **Consumer**: Receives change notifications from Kafka
//! 2. **Matcher**: Decides which handlers care about a change and derives
//!    their change targets
//! 3. **Batching**: Targets are grouped into fixed-size batches
//! 4. **Processor**: Resolves, transforms and bulk-writes each batch
//! 5. **Orchestrator**: Coordinates the flow and acknowledges deliveries
//!
//! The [`indexer`] rebuilds indices from scratch with zero-downtime alias
//! swaps.
//!
//! ## Modules
//!
//! - [`config`]: Settings, handler definitions and dependency wiring
//! - [`consumer`]: Kafka consumer for change notifications
//! - [`handler`]: Handler traits and the table-backed handler
//! - [`registry`]: Handler registry
//! - [`pipeline`]: Matching, batching, dispatch and bulk processing
//! - [`indexer`]: Create, populate, swap and clean indices
//! - [`orchestrator`]: Coordinates the ingest flow
//! - [`errors`]: Error types

pub mod config;
pub mod consumer;
pub mod errors;
pub mod handler;
pub mod indexer;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;

pub use config::{Dependencies, Settings};
pub use errors::{HandlerError, IngestError, RegistryError, SyncError};
pub use handler::{ChangeSubscription, SearchHandler, TransformableHandler};
pub use indexer::Indexer;
pub use registry::HandlerRegistry;

use thiserror::Error;

/// Errors that can occur during initialization or while running a command.
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Ingest error.
    #[error("Ingest error: {0}")]
    IngestError(#[from] IngestError),

    /// Lifecycle or pipeline error.
    #[error("{0}")]
    SyncError(#[from] SyncError),
}

impl IndexingError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
