//! Integration tests for the change pipeline orchestrator.
//!
//! These tests use the real Orchestrator and ChangeListener but mock the
//! Kafka consumer and the search backend.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

use search_sync::consumer::{CommitGate, MessageOffset, StreamMessage};
use search_sync::errors::IngestError;
use search_sync::orchestrator::{Consumer, Orchestrator, OrchestratorConfig};
use search_sync::pipeline::{ChangeListener, InlineBatchSink, SubscriptionMatcher, UpdateProcessor};
use search_sync_shared::{single_id, ChangeNotification};

use common::{blog_registry, InMemoryEntityStore, InMemorySearchClient};

/// Acknowledgments seen by the mock consumer: (offsets, success).
type Acks = Arc<Mutex<Vec<(Vec<MessageOffset>, bool)>>>;

/// Offsets the mock consumer committed.
type Commits = Arc<Mutex<Vec<MessageOffset>>>;

// Mock Consumer for testing
struct MockConsumer {
    deliveries: Vec<Vec<ChangeNotification>>,
    error_on_subscribe: bool,
    /// Keep running after the deliveries until shutdown.
    wait_for_shutdown: bool,
    acks: Acks,
    commits: Commits,
}

impl MockConsumer {
    fn new(deliveries: Vec<Vec<ChangeNotification>>) -> Self {
        Self {
            deliveries,
            error_on_subscribe: false,
            wait_for_shutdown: false,
            acks: Arc::new(Mutex::new(Vec::new())),
            commits: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn with_subscribe_error() -> Self {
        Self {
            error_on_subscribe: true,
            ..Self::new(Vec::new())
        }
    }

    fn waiting_for_shutdown(deliveries: Vec<Vec<ChangeNotification>>) -> Self {
        Self {
            wait_for_shutdown: true,
            ..Self::new(deliveries)
        }
    }
}

#[async_trait::async_trait]
impl Consumer for MockConsumer {
    fn subscribe(&self) -> Result<(), IngestError> {
        if self.error_on_subscribe {
            Err(IngestError::KafkaError("Mock subscribe error".to_string()))
        } else {
            Ok(())
        }
    }

    async fn run(
        &self,
        sender: mpsc::Sender<StreamMessage>,
        mut ack_receiver: mpsc::Receiver<StreamMessage>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), IngestError> {
        let mut gate = CommitGate::new();
        for (offset, notifications) in self.deliveries.iter().enumerate() {
            let offsets = vec![("entity.changes".to_string(), 0, offset as i64)];
            let _ = sender
                .send(StreamMessage::Notifications {
                    notifications: notifications.clone(),
                    offsets,
                })
                .await;

            if let Some(StreamMessage::Acknowledgment {
                offsets, success, ..
            }) = ack_receiver.recv().await
            {
                let committable = gate.acknowledge(&offsets, success);
                self.commits.lock().unwrap().extend(committable);
                self.acks.lock().unwrap().push((offsets, success));
            }
        }

        if self.wait_for_shutdown {
            let _ = shutdown.recv().await;
        }
        let _ = sender.send(StreamMessage::End).await;
        if gate.is_blocked() {
            return Err(IngestError::delivery_failed(
                gate.failed_positions(),
                "delivery was refused",
            ));
        }
        Ok(())
    }
}

fn listener(store: Arc<InMemoryEntityStore>, client: Arc<InMemorySearchClient>) -> ChangeListener {
    let registry = blog_registry(store);
    let processor = Arc::new(UpdateProcessor::new(Arc::clone(&registry), client));
    ChangeListener::new(
        SubscriptionMatcher::new(registry),
        Arc::new(InlineBatchSink::new(processor)),
    )
}

fn seeded_store() -> Arc<InMemoryEntityStore> {
    let store = InMemoryEntityStore::new();
    store.put("Blog", json!({"id": 1, "title": "T", "body": "B"}));
    store.put("Blog", json!({"id": 2, "title": "Other", "body": "Text"}));
    store
}

#[tokio::test]
async fn test_orchestrator_full_integration() {
    let client = InMemorySearchClient::new();
    let consumer = Arc::new(MockConsumer::new(vec![
        vec![ChangeNotification::upsert("Blog", single_id("id", 1))],
        vec![
            ChangeNotification::upsert("Blog", single_id("id", 2)),
            ChangeNotification::delete("Blog", single_id("id", 1)),
        ],
    ]));
    let acks = Arc::clone(&consumer.acks);
    let commits = Arc::clone(&consumer.commits);
    let mut orchestrator = Orchestrator::new(consumer, listener(seeded_store(), client.clone()));

    let result = timeout(Duration::from_secs(5), orchestrator.run()).await;

    assert!(result.is_ok());
    assert!(result.unwrap().is_ok());

    assert_eq!(orchestrator.notifications_processed(), 3);
    assert_eq!(client.bulk_calls().len(), 2);
    assert!(client.document("blog", "1").is_none());
    assert_eq!(client.document("blog", "2").unwrap()["title"], "Other");

    let acks = acks.lock().unwrap();
    assert_eq!(acks.len(), 2);
    assert!(acks.iter().all(|(_, success)| *success));
    assert_eq!(acks[1].0[0].2, 1);
    assert_eq!(commits.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_failed_delivery_is_not_acknowledged() {
    let client = InMemorySearchClient::new();
    client.fail_document("1");
    let consumer = Arc::new(MockConsumer::new(vec![
        vec![ChangeNotification::upsert("Blog", single_id("id", 1))],
        vec![ChangeNotification::upsert("Blog", single_id("id", 2))],
    ]));
    let acks = Arc::clone(&consumer.acks);
    let mut orchestrator = Orchestrator::new(consumer, listener(seeded_store(), client.clone()));

    let result = timeout(Duration::from_secs(5), orchestrator.run()).await;

    match result.unwrap() {
        Err(IngestError::DeliveryFailed { positions, .. }) => {
            assert_eq!(positions, vec![("entity.changes".to_string(), 0, 0)]);
        }
        other => panic!("Expected DeliveryFailed, got {:?}", other),
    }

    let acks = acks.lock().unwrap();
    assert_eq!(*acks, vec![
        (vec![("entity.changes".to_string(), 0, 0)], false),
        (vec![("entity.changes".to_string(), 0, 1)], true),
    ]);
    assert!(client.document("blog", "2").is_some());
}

#[tokio::test]
async fn test_no_offset_past_failed_delivery_is_committed() {
    let client = InMemorySearchClient::new();
    client.fail_document("2");
    let consumer = Arc::new(MockConsumer::new(vec![
        vec![ChangeNotification::upsert("Blog", single_id("id", 1))],
        vec![ChangeNotification::upsert("Blog", single_id("id", 2))],
        vec![ChangeNotification::upsert("Blog", single_id("id", 1))],
    ]));
    let commits = Arc::clone(&consumer.commits);
    let mut orchestrator = Orchestrator::new(consumer, listener(seeded_store(), client.clone()));

    let result = timeout(Duration::from_secs(5), orchestrator.run()).await;

    assert!(matches!(result.unwrap(), Err(IngestError::DeliveryFailed { .. })));
    // Offset 2 was processed but lies past the failed offset 1
    assert_eq!(*commits.lock().unwrap(), vec![("entity.changes".to_string(), 0, 0)]);
}

#[tokio::test]
async fn test_empty_delivery_is_acknowledged() {
    let client = InMemorySearchClient::new();
    let consumer = Arc::new(MockConsumer::new(vec![vec![]]));
    let acks = Arc::clone(&consumer.acks);
    let mut orchestrator = Orchestrator::new(consumer, listener(seeded_store(), client.clone()));

    let result = timeout(Duration::from_secs(5), orchestrator.run()).await;
    assert!(result.unwrap().is_ok());

    assert!(client.bulk_calls().is_empty());
    assert_eq!(acks.lock().unwrap().len(), 1);
    assert!(acks.lock().unwrap()[0].1);
}

#[tokio::test]
async fn test_orchestrator_configuration() {
    let client = InMemorySearchClient::new();
    let consumer = Arc::new(MockConsumer::new(vec![vec![ChangeNotification::upsert(
        "Blog",
        single_id("id", 1),
    )]]));
    let config = OrchestratorConfig {
        channel_buffer_size: 1,
        progress_interval: Duration::from_millis(5),
    };
    let mut orchestrator =
        Orchestrator::with_config(consumer, listener(seeded_store(), client.clone()), config);

    let result = timeout(Duration::from_secs(5), orchestrator.run()).await;
    assert!(result.unwrap().is_ok());
    assert_eq!(client.document_count("blog"), 1);
}

#[tokio::test]
async fn test_orchestrator_shutdown() {
    let client = InMemorySearchClient::new();
    let consumer = Arc::new(MockConsumer::waiting_for_shutdown(vec![vec![
        ChangeNotification::upsert("Blog", single_id("id", 1)),
    ]]));
    let mut orchestrator = Orchestrator::new(consumer, listener(seeded_store(), client.clone()));
    let shutdown = orchestrator.shutdown_handle();

    let shutdown_task = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = shutdown.send(());
    });

    let result = timeout(Duration::from_secs(5), orchestrator.run()).await;

    assert!(shutdown_task.await.is_ok(), "Shutdown task should succeed");
    assert!(result.is_ok(), "Orchestrator should stop after shutdown");
    assert!(result.unwrap().is_ok());
    assert_eq!(client.document_count("blog"), 1);
}

#[tokio::test]
async fn test_orchestrator_error_handling() {
    let client = InMemorySearchClient::new();
    let consumer = Arc::new(MockConsumer::with_subscribe_error());
    let mut orchestrator = Orchestrator::new(consumer, listener(seeded_store(), client));

    let result = timeout(Duration::from_secs(5), orchestrator.run()).await;
    assert!(result.is_ok(), "Orchestrator should complete");

    match result.unwrap() {
        Err(IngestError::KafkaError(msg)) => assert_eq!(msg, "Mock subscribe error"),
        other => panic!("Expected KafkaError, got {:?}", other),
    }
}
