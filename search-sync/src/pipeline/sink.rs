//! Batch dispatch transport.
//!
//! Sealed batches are handed to a [`BatchSink`]. The inline sink processes
//! them on the caller's task; the queue sink serializes them and lets a pool
//! of [`BatchWorker`]s process them concurrently.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument};

use search_sync_shared::BatchOfUpdates;

use crate::errors::SyncError;
use crate::pipeline::processor::UpdateProcessor;

/// Default capacity of the batch queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Receiver of sealed batches.
#[async_trait]
pub trait BatchSink: Send + Sync {
    async fn dispatch(&self, batch: BatchOfUpdates) -> Result<(), SyncError>;
}

/// Processes each batch before `dispatch` returns.
pub struct InlineBatchSink {
    processor: Arc<UpdateProcessor>,
}

impl InlineBatchSink {
    pub fn new(processor: Arc<UpdateProcessor>) -> Self {
        Self { processor }
    }
}

#[async_trait]
impl BatchSink for InlineBatchSink {
    async fn dispatch(&self, batch: BatchOfUpdates) -> Result<(), SyncError> {
        self.processor
            .process(&batch.index_suffix, batch.items)
            .await
            .map(|_| ())
    }
}

/// Encodes batches onto a bounded queue drained by batch workers.
///
/// Dropping the sink closes the queue; workers finish the queued batches and
/// stop.
pub struct QueueBatchSink {
    sender: mpsc::Sender<Vec<u8>>,
}

#[async_trait]
impl BatchSink for QueueBatchSink {
    async fn dispatch(&self, batch: BatchOfUpdates) -> Result<(), SyncError> {
        let body = batch.encode()?;
        self.sender
            .send(body)
            .await
            .map_err(|e| SyncError::queue(e.to_string()))
    }
}

/// Counts reported by batch workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    /// Batches processed successfully.
    pub processed: usize,
    /// Batches that could not be decoded or processed.
    pub failed: usize,
    /// Documents written.
    pub written: usize,
}

impl WorkerReport {
    fn merge(&mut self, other: WorkerReport) {
        self.processed += other.processed;
        self.failed += other.failed;
        self.written += other.written;
    }
}

/// Processes batches taken from the shared queue.
pub struct BatchWorker {
    id: usize,
    processor: Arc<UpdateProcessor>,
    receiver: Arc<Mutex<mpsc::Receiver<Vec<u8>>>>,
}

impl BatchWorker {
    /// Run until the queue is closed and drained.
    ///
    /// Failed batches are logged and counted; redelivery is left to the
    /// operator, since processing the same batch again is safe.
    #[instrument(skip(self), fields(worker = self.id))]
    pub async fn run(self) -> WorkerReport {
        let mut report = WorkerReport::default();

        loop {
            let body = { self.receiver.lock().await.recv().await };
            let Some(body) = body else {
                break;
            };

            let batch = match BatchOfUpdates::decode(&body) {
                Ok(batch) => batch,
                Err(e) => {
                    error!(error = %e, "Failed to decode batch");
                    report.failed += 1;
                    continue;
                }
            };

            let size = batch.len();
            match self.processor.process(&batch.index_suffix, batch.items).await {
                Ok(summary) => {
                    debug!(size = size, written = summary.written, "Batch processed");
                    report.processed += 1;
                    report.written += summary.written;
                }
                Err(e) => {
                    error!(size = size, error = %e, "Failed to process batch");
                    report.failed += 1;
                }
            }
        }

        debug!(
            processed = report.processed,
            failed = report.failed,
            "Batch worker stopped"
        );
        report
    }
}

/// Handle on the running batch workers.
pub struct WorkerPool {
    tasks: JoinSet<WorkerReport>,
}

impl WorkerPool {
    /// Wait for every worker and add up their reports.
    ///
    /// The sink must be dropped first, otherwise the workers never stop.
    pub async fn join(mut self) -> WorkerReport {
        let mut total = WorkerReport::default();
        while let Some(result) = self.tasks.join_next().await {
            match result {
                Ok(report) => total.merge(report),
                Err(e) => error!(error = %e, "Batch worker panicked"),
            }
        }
        info!(
            processed = total.processed,
            failed = total.failed,
            written = total.written,
            "Batch workers finished"
        );
        total
    }
}

/// Start `workers` batch workers behind a queue of `capacity` batches.
///
/// # Returns
///
/// The sink feeding the queue and the pool to join once the sink is dropped.
pub fn spawn_batch_workers(
    processor: Arc<UpdateProcessor>,
    workers: usize,
    capacity: usize,
) -> (QueueBatchSink, WorkerPool) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let receiver = Arc::new(Mutex::new(receiver));

    let mut tasks = JoinSet::new();
    for id in 0..workers.max(1) {
        let worker = BatchWorker {
            id,
            processor: Arc::clone(&processor),
            receiver: Arc::clone(&receiver),
        };
        tasks.spawn(worker.run());
    }

    info!(workers = workers.max(1), capacity = capacity, "Started batch workers");

    (QueueBatchSink { sender }, WorkerPool { tasks })
}
