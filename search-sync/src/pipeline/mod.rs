//! The change-subscription and batched-update pipeline.
//!
//! notification -> [`SubscriptionMatcher`] -> handler-bound targets ->
//! batches ([`Populator`] / [`ChangeListener`]) -> [`BatchSink`] ->
//! [`UpdateProcessor`] -> one bulk request per batch.

mod listener;
mod matcher;
mod populator;
mod processor;
mod sink;

pub use listener::{ChangeListener, ListenerSummary};
pub use matcher::{match_subscriptions, SubscriptionMatcher};
pub use populator::{
    batches, BatchAccumulator, Batches, PopulateSummary, Populator, DEFAULT_BATCH_SIZE,
};
pub use processor::{DefaultIndexName, IndexNameTransformer, ProcessSummary, UpdateProcessor};
pub use sink::{
    spawn_batch_workers, BatchSink, BatchWorker, InlineBatchSink, QueueBatchSink, WorkerPool,
    WorkerReport, DEFAULT_QUEUE_CAPACITY,
};
