//! Fixed-size batching of change targets.
//!
//! Items are accumulated in arrival order and sealed into a batch every
//! `batch_size` items; the trailing partial batch is sealed when the source
//! ends. An empty source produces no batch.

use std::iter::Fuse;
use std::pin::pin;

use futures::{Stream, StreamExt};
use tracing::{debug, info, instrument, warn};

use search_sync_shared::{BatchOfUpdates, HandlerBoundChangeTarget};

use crate::errors::SyncError;
use crate::pipeline::sink::BatchSink;

/// Default number of change targets per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Normalize a configured batch size; zero becomes one.
fn normalize_batch_size(batch_size: usize) -> usize {
    if batch_size == 0 {
        warn!("Batch size 0 is invalid, using 1");
        1
    } else {
        batch_size
    }
}

/// The in-progress batch.
#[derive(Debug)]
pub struct BatchAccumulator<T> {
    batch_size: usize,
    current: Vec<T>,
}

impl<T> BatchAccumulator<T> {
    pub fn new(batch_size: usize) -> Self {
        let batch_size = normalize_batch_size(batch_size);
        Self {
            batch_size,
            current: Vec::with_capacity(batch_size),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Append an item; returns the sealed batch once it is full.
    pub fn push(&mut self, item: T) -> Option<Vec<T>> {
        self.current.push(item);
        if self.current.len() >= self.batch_size {
            Some(std::mem::replace(
                &mut self.current,
                Vec::with_capacity(self.batch_size),
            ))
        } else {
            None
        }
    }

    /// Seal the trailing partial batch, if any.
    pub fn finish(&mut self) -> Option<Vec<T>> {
        if self.current.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.current))
        }
    }
}

/// Iterator adapter splitting an iterator into batches.
///
/// # Example
///
/// ```
/// use search_sync::pipeline::batches;
///
/// let sizes: Vec<usize> = batches(1..=6, 5).map(|b| b.len()).collect();
/// assert_eq!(sizes, vec![5, 1]);
/// ```
pub struct Batches<I: Iterator> {
    source: Fuse<I>,
    accumulator: BatchAccumulator<I::Item>,
}

impl<I: Iterator> Iterator for Batches<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        for item in self.source.by_ref() {
            if let Some(batch) = self.accumulator.push(item) {
                return Some(batch);
            }
        }
        self.accumulator.finish()
    }
}

/// Split `source` into batches of `batch_size` items.
pub fn batches<I: IntoIterator>(source: I, batch_size: usize) -> Batches<I::IntoIter> {
    Batches {
        source: source.into_iter().fuse(),
        accumulator: BatchAccumulator::new(batch_size),
    }
}

/// Counts reported by [`Populator::populate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopulateSummary {
    pub batches: usize,
    pub items: usize,
}

/// Batches a stream of change targets and dispatches every batch.
#[derive(Debug, Clone)]
pub struct Populator {
    batch_size: usize,
}

impl Populator {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: normalize_batch_size(batch_size),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Consume `source` once and dispatch its items in batches.
    ///
    /// Only the current batch is held in memory. A source error stops
    /// population; batches dispatched before it are not retracted.
    ///
    /// # Arguments
    ///
    /// * `source` - Handler-bound targets, read lazily
    /// * `index_suffix` - Suffix carried by every emitted batch
    /// * `sink` - Receiver of the sealed batches
    #[instrument(skip(self, source, sink), fields(batch_size = self.batch_size))]
    pub async fn populate<S>(
        &self,
        source: S,
        index_suffix: &str,
        sink: &dyn BatchSink,
    ) -> Result<PopulateSummary, SyncError>
    where
        S: Stream<Item = Result<HandlerBoundChangeTarget, SyncError>> + Send,
    {
        let mut source = pin!(source);
        let mut accumulator = BatchAccumulator::new(self.batch_size);
        let mut summary = PopulateSummary::default();

        while let Some(item) = source.next().await {
            let item = item?;
            summary.items += 1;
            if let Some(items) = accumulator.push(item) {
                self.emit(items, index_suffix, sink, &mut summary).await?;
            }
        }
        if let Some(items) = accumulator.finish() {
            self.emit(items, index_suffix, sink, &mut summary).await?;
        }

        info!(
            batches = summary.batches,
            items = summary.items,
            "Population dispatched"
        );
        Ok(summary)
    }

    async fn emit(
        &self,
        items: Vec<HandlerBoundChangeTarget>,
        index_suffix: &str,
        sink: &dyn BatchSink,
        summary: &mut PopulateSummary,
    ) -> Result<(), SyncError> {
        summary.batches += 1;
        debug!(
            batch = summary.batches,
            size = items.len(),
            "Dispatching batch"
        );
        sink.dispatch(BatchOfUpdates::new(index_suffix, items)).await
    }
}
