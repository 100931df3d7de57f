//! Change listener.
//!
//! Feeds delivered notifications through the matcher and the batch
//! accumulator, and dispatches every sealed batch to a sink.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use search_sync_shared::{BatchOfUpdates, ChangeNotification, HandlerBoundChangeTarget};

use crate::errors::SyncError;
use crate::pipeline::matcher::SubscriptionMatcher;
use crate::pipeline::populator::{BatchAccumulator, DEFAULT_BATCH_SIZE};
use crate::pipeline::sink::BatchSink;

/// Counts of one delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerSummary {
    pub notifications: usize,
    pub targets: usize,
    pub batches: usize,
}

/// Turns deliveries of change notifications into dispatched batches.
pub struct ChangeListener {
    matcher: SubscriptionMatcher,
    sink: Arc<dyn BatchSink>,
    batch_size: usize,
}

impl ChangeListener {
    pub fn new(matcher: SubscriptionMatcher, sink: Arc<dyn BatchSink>) -> Self {
        Self {
            matcher,
            sink,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Handle one delivery of notifications.
    ///
    /// A notification whose transform fails is abandoned while the others are
    /// still matched and dispatched; the first such failure is then returned so
    /// the delivery is not acknowledged. Dispatch failures stop the delivery
    /// immediately.
    #[instrument(skip(self, notifications), fields(count = notifications.len()))]
    pub async fn handle(
        &self,
        notifications: &[ChangeNotification],
    ) -> Result<ListenerSummary, SyncError> {
        let mut accumulator = BatchAccumulator::new(self.batch_size);
        let mut summary = ListenerSummary {
            notifications: notifications.len(),
            ..ListenerSummary::default()
        };
        let mut first_failure: Option<SyncError> = None;

        for notification in notifications {
            let targets = match self.matcher.match_notification(notification).await {
                Ok(targets) => targets,
                Err(e) => {
                    warn!(
                        entity_class = %notification.entity_class,
                        ids = ?notification.ids,
                        error = %e,
                        "Skipping notification after failed match"
                    );
                    first_failure.get_or_insert(e);
                    continue;
                }
            };

            summary.targets += targets.len();
            for target in targets {
                if let Some(items) = accumulator.push(target) {
                    self.dispatch(items, &mut summary).await?;
                }
            }
        }
        if let Some(items) = accumulator.finish() {
            self.dispatch(items, &mut summary).await?;
        }

        debug!(
            notifications = summary.notifications,
            targets = summary.targets,
            batches = summary.batches,
            "Delivery handled"
        );

        match first_failure {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    async fn dispatch(
        &self,
        items: Vec<HandlerBoundChangeTarget>,
        summary: &mut ListenerSummary,
    ) -> Result<(), SyncError> {
        summary.batches += 1;
        self.sink.dispatch(BatchOfUpdates::new("", items)).await
    }
}
