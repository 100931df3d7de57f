//! Orchestrator module for the change pipeline.
//!
//! Coordinates the consumer and the change listener, and acknowledges every
//! delivery once its batches are dispatched.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, instrument, warn};

use search_sync_shared::ChangeNotification;

use crate::consumer::StreamMessage;
use crate::errors::IngestError;
use crate::pipeline::ChangeListener;

/// Source of change notification deliveries.
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Subscribe to the configured topics.
    fn subscribe(&self) -> Result<(), IngestError>;

    /// Send deliveries to `sender` until the stream ends or `shutdown` fires,
    /// committing the offsets acknowledged on `ack_receiver`.
    ///
    /// A refused acknowledgment must not let any later offset of the same
    /// partition be committed; the error returned here is returned by
    /// [`Orchestrator::run`].
    async fn run(
        &self,
        sender: mpsc::Sender<StreamMessage>,
        ack_receiver: mpsc::Receiver<StreamMessage>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), IngestError>;
}

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Size of the message channel buffer.
    pub channel_buffer_size: usize,
    /// Interval between progress log lines.
    pub progress_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: 1000,
            progress_interval: Duration::from_secs(10),
        }
    }
}

/// Orchestrator that coordinates the ingest components.
///
/// The orchestrator:
/// - Subscribes the consumer and runs it in the background
/// - Hands every delivery to the change listener
/// - Acknowledges deliveries, or refuses them when a notification failed
/// - Handles shutdown signals
pub struct Orchestrator {
    consumer: Arc<dyn Consumer>,
    listener: ChangeListener,
    config: OrchestratorConfig,
    shutdown_tx: broadcast::Sender<()>,
    /// Total number of notifications received since startup.
    total_notifications: Arc<AtomicU64>,
    /// Total number of change targets dispatched since startup.
    total_targets: Arc<AtomicU64>,
}

impl Orchestrator {
    /// Create a new orchestrator with the given components.
    pub fn new(consumer: Arc<dyn Consumer>, listener: ChangeListener) -> Self {
        Self::with_config(consumer, listener, OrchestratorConfig::default())
    }

    /// Create a new orchestrator with custom configuration.
    pub fn with_config(
        consumer: Arc<dyn Consumer>,
        listener: ChangeListener,
        config: OrchestratorConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            consumer,
            listener,
            config,
            shutdown_tx,
            total_notifications: Arc::new(AtomicU64::new(0)),
            total_targets: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Sender that triggers a graceful shutdown when sent to.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Total number of notifications received since startup.
    pub fn notifications_processed(&self) -> u64 {
        self.total_notifications.load(Ordering::Relaxed)
    }

    /// Total number of change targets dispatched since startup.
    pub fn targets_dispatched(&self) -> u64 {
        self.total_targets.load(Ordering::Relaxed)
    }

    /// Run the orchestrator.
    ///
    /// Blocks until the consumer stream ends, a shutdown is requested or
    /// ctrl-c is received. Fails with the consumer's error, such as
    /// `IngestError::DeliveryFailed` after a delivery could not be synced.
    #[instrument(skip(self))]
    pub async fn run(&mut self) -> Result<(), IngestError> {
        info!("Starting change pipeline orchestrator");

        self.consumer.subscribe()?;

        let (event_transmitter, mut event_receiver) =
            mpsc::channel::<StreamMessage>(self.config.channel_buffer_size);
        let (ack_transmitter, ack_receiver) =
            mpsc::channel::<StreamMessage>(self.config.channel_buffer_size);

        let consumer = Arc::clone(&self.consumer);
        let consumer_shutdown = self.shutdown_tx.subscribe();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let consumer_handle = tokio::spawn(async move {
            consumer
                .run(event_transmitter, ack_receiver, consumer_shutdown)
                .await
        });

        info!("Ready to process change notifications");

        let mut progress_timer = interval(self.config.progress_interval);
        progress_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut prev_notifications: u64 = 0;
        let mut prev_targets: u64 = 0;
        let mut prev_time = std::time::Instant::now();

        loop {
            tokio::select! {
                msg = event_receiver.recv() => {
                    match msg {
                        Some(StreamMessage::Notifications { notifications, offsets }) => {
                            debug!(
                                notification_count = notifications.len(),
                                offset_count = offsets.len(),
                                "Received notifications from consumer"
                            );
                            let ack = match self.process_notifications(&notifications).await {
                                Ok(()) => StreamMessage::Acknowledgment {
                                    offsets,
                                    success: true,
                                    error: None,
                                },
                                Err(e) => {
                                    error!(error = %e, "Failed to process notifications. Not acknowledging delivery");
                                    StreamMessage::Acknowledgment {
                                        offsets,
                                        success: false,
                                        error: Some(e.to_string()),
                                    }
                                }
                            };
                            let _ = ack_transmitter.send(ack).await;
                        }
                        Some(StreamMessage::Error(e)) => {
                            error!(error = %e, "Received error from consumer");
                        }
                        Some(StreamMessage::End) | None => {
                            info!("Consumer stream ended");
                            break;
                        }
                        Some(StreamMessage::Acknowledgment { .. }) => {
                            warn!("Received acknowledgment on event channel (should be on ack channel)");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown requested");
                    break;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    let _ = self.shutdown_tx.send(());
                    break;
                }
                _ = progress_timer.tick() => {
                    let notifications = self.total_notifications.load(Ordering::Relaxed);
                    let targets = self.total_targets.load(Ordering::Relaxed);

                    let now = std::time::Instant::now();
                    let elapsed_secs = now.duration_since(prev_time).as_secs_f64();
                    let rate = |current: u64, previous: u64| {
                        if elapsed_secs > 0.0 {
                            (current.saturating_sub(previous) as f64) / elapsed_secs
                        } else {
                            0.0
                        }
                    };

                    info!(
                        notifications_processed = notifications,
                        targets_dispatched = targets,
                        notifications_per_sec = format!("{:.2}", rate(notifications, prev_notifications)),
                        targets_per_sec = format!("{:.2}", rate(targets, prev_targets)),
                        "Processing progress"
                    );

                    prev_notifications = notifications;
                    prev_targets = targets;
                    prev_time = now;
                }
            }
        }

        // Closing the channels stops a consumer that is still running
        drop(ack_transmitter);
        drop(event_receiver);
        let consumer_result = consumer_handle
            .await
            .map_err(|e| IngestError::ChannelError(format!("Consumer task failed: {}", e)))
            .and_then(|result| result);

        info!(
            total_notifications_processed = self.notifications_processed(),
            total_targets_dispatched = self.targets_dispatched(),
            "Orchestrator shutdown complete"
        );

        if let Err(e) = &consumer_result {
            error!(error = %e, "Consumer error");
        }
        consumer_result
    }

    /// Run one delivery through the change listener.
    ///
    /// Returns Ok only once every batch of the delivery was dispatched, so the
    /// caller can acknowledge it.
    async fn process_notifications(
        &self,
        notifications: &[ChangeNotification],
    ) -> Result<(), IngestError> {
        self.total_notifications
            .fetch_add(notifications.len() as u64, Ordering::Relaxed);

        let summary = self.listener.handle(notifications).await?;
        self.total_targets
            .fetch_add(summary.targets as u64, Ordering::Relaxed);

        debug!(
            notifications = summary.notifications,
            targets = summary.targets,
            batches = summary.batches,
            "Delivery dispatched"
        );
        Ok(())
    }

    /// Trigger a graceful shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
