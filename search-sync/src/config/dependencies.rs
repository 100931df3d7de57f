//! Dependency initialization and wiring for the sync service.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use search_sync_repository::opensearch::IndexConfig;
use search_sync_repository::{
    EntityStore, OpenSearchProvider, PostgresEntityStore, SearchClient, SearchClientConfig,
};

use crate::config::handlers::HandlersFile;
use crate::config::settings::{ConnectionMode, Settings};
use crate::consumer::KafkaConsumer;
use crate::indexer::Indexer;
use crate::orchestrator::Orchestrator;
use crate::pipeline::{ChangeListener, InlineBatchSink, SubscriptionMatcher, UpdateProcessor};
use crate::registry::HandlerRegistry;
use crate::IndexingError;

/// Container for all initialized dependencies.
pub struct Dependencies {
    pub settings: Settings,
    pub registry: Arc<HandlerRegistry>,
    pub client: Arc<dyn SearchClient>,
    pub store: Arc<dyn EntityStore>,
}

impl Dependencies {
    /// Initialize all dependencies from `settings`.
    ///
    /// Loads the handlers file, connects to PostgreSQL and OpenSearch and
    /// builds the handler registry.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(IndexingError)` - If initialization fails (OpenSearch only in fail-fast mode)
    pub async fn new(settings: Settings) -> Result<Self, IndexingError> {
        info!(
            opensearch_url = %settings.opensearch_url,
            kafka_broker = %settings.kafka_broker,
            kafka_group_id = %settings.kafka_group_id,
            changes_topic = %settings.changes_topic,
            handlers_file = %settings.handlers_file.display(),
            connection_mode = ?settings.connection_mode,
            retry_interval_secs = settings.retry_interval.as_secs(),
            "Initializing dependencies"
        );

        let handlers_file = HandlersFile::from_path(&settings.handlers_file)?;

        let store = PostgresEntityStore::connect(
            &settings.database_url,
            settings.database_max_connections,
            handlers_file.table_bindings()?,
        )
        .await
        .map_err(|e| IndexingError::config(format!("Failed to connect to database: {}", e)))?;
        let store: Arc<dyn EntityStore> = Arc::new(store);

        let client = Self::connect_to_opensearch(
            &settings.opensearch_url,
            settings.search_client_config(),
            settings.connection_mode,
            settings.retry_interval,
        )
        .await?;
        info!("OpenSearch connection established");

        let registry = HandlerRegistry::new(handlers_file.build_handlers(Arc::clone(&store)))
            .map_err(|e| IndexingError::config(e.to_string()))?;

        Ok(Self {
            settings,
            registry: Arc::new(registry),
            client: Arc::new(client),
            store,
        })
    }

    /// Update processor writing to the configured search backend.
    pub fn processor(&self) -> Arc<UpdateProcessor> {
        Arc::new(UpdateProcessor::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.client),
        ))
    }

    /// Index lifecycle operations over every handler.
    pub fn indexer(&self) -> Indexer {
        let mut index_config = IndexConfig::default();
        if let Some(field) = &self.settings.access_control_field {
            index_config = index_config.with_access_control_field(field.clone());
        }

        Indexer::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.client),
            Arc::clone(&self.store),
            index_config,
            self.settings.batch_size,
        )
    }

    /// Orchestrator consuming change notifications from Kafka.
    ///
    /// Deliveries are processed inline, so a delivery is only acknowledged
    /// after its bulk writes succeeded.
    pub fn orchestrator(&self) -> Result<Orchestrator, IndexingError> {
        let consumer = KafkaConsumer::new(
            &self.settings.kafka_broker,
            &self.settings.kafka_group_id,
            &self.settings.changes_topic,
        )
        .map_err(|e| IndexingError::config(format!("Failed to create Kafka consumer: {}", e)))?;

        info!("Kafka consumer created");

        let listener = ChangeListener::new(
            SubscriptionMatcher::new(Arc::clone(&self.registry)),
            Arc::new(InlineBatchSink::new(self.processor())),
        )
        .with_batch_size(self.settings.batch_size);

        Ok(Orchestrator::new(Arc::new(consumer), listener))
    }

    /// Connect to OpenSearch with retry logic based on connection mode.
    async fn connect_to_opensearch(
        url: &str,
        client_config: SearchClientConfig,
        mode: ConnectionMode,
        retry_interval: Duration,
    ) -> Result<OpenSearchProvider, IndexingError> {
        loop {
            match Self::try_connect_opensearch(url, client_config.clone()).await {
                Ok(provider) => return Ok(provider),
                Err(e) => match mode {
                    ConnectionMode::FailFast => return Err(e),
                    ConnectionMode::Retry => {
                        warn!(
                            opensearch_url = %url,
                            error = %e,
                            retry_interval_secs = retry_interval.as_secs(),
                            "Failed to connect to OpenSearch, retrying..."
                        );
                        sleep(retry_interval).await;
                    }
                },
            }
        }
    }

    /// Attempt to connect to OpenSearch.
    async fn try_connect_opensearch(
        url: &str,
        client_config: SearchClientConfig,
    ) -> Result<OpenSearchProvider, IndexingError> {
        let provider = OpenSearchProvider::new(url, client_config)
            .await
            .map_err(|e| {
                IndexingError::config(format!("Failed to create OpenSearch provider: {}", e))
            })?;

        provider
            .ping()
            .await
            .map_err(|e| IndexingError::config(format!("Failed to connect to OpenSearch: {}", e)))?;

        Ok(provider)
    }
}
