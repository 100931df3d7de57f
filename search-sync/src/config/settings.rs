//! Runtime settings read from the environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use search_sync_repository::config::{SearchClientConfig, DEFAULT_MAX_BULK_ACTIONS};

use crate::consumer::DEFAULT_CHANGES_TOPIC;
use crate::pipeline::DEFAULT_BATCH_SIZE;
use crate::IndexingError;

/// Default OpenSearch URL.
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";

/// Default Kafka broker address.
const DEFAULT_KAFKA_BROKER: &str = "localhost:9092";

/// Default Kafka consumer group ID.
const DEFAULT_KAFKA_GROUP_ID: &str = "search-sync";

/// Default connection retry interval in seconds.
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 15;

/// Default size of the database connection pool.
const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Default location of the handlers file.
const DEFAULT_HANDLERS_FILE: &str = "handlers.json";

/// Connection mode for OpenSearch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Fail immediately if connection fails.
    FailFast,
    /// Retry connection until successful.
    Retry,
}

impl ConnectionMode {
    /// Parse a connection mode.
    ///
    /// Valid values: "fail-fast" or "retry" (case-insensitive).
    /// Defaults to "retry" if not set or invalid.
    fn parse(value: Option<&str>) -> Self {
        match value.unwrap_or("retry").to_lowercase().as_str() {
            "fail-fast" | "failfast" | "fail_fast" => Self::FailFast,
            "retry" => Self::Retry,
            other => {
                warn!(value = %other, "Invalid OPENSEARCH_CONNECTION_MODE, defaulting to 'retry'");
                Self::Retry
            }
        }
    }
}

/// Settings of the sync service.
#[derive(Debug, Clone)]
pub struct Settings {
    pub opensearch_url: String,
    pub connection_mode: ConnectionMode,
    pub retry_interval: Duration,
    pub database_url: String,
    pub database_max_connections: u32,
    pub kafka_broker: String,
    pub kafka_group_id: String,
    pub changes_topic: String,
    pub batch_size: usize,
    pub handlers_file: PathBuf,
    /// Keyword field added to every index mapping, if set.
    pub access_control_field: Option<String>,
}

impl Settings {
    /// Read settings from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `OPENSEARCH_CONNECTION_MODE`: "fail-fast" or "retry" (default: retry)
    /// - `OPENSEARCH_RETRY_INTERVAL_SECS`: Retry interval in seconds (default: 15)
    /// - `DATABASE_URL`: PostgreSQL connection string (required)
    /// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 5)
    /// - `KAFKA_BROKER`: Kafka broker address (default: localhost:9092)
    /// - `KAFKA_GROUP_ID`: Consumer group ID (default: search-sync)
    /// - `CHANGES_TOPIC`: Topic carrying change notifications (default: entity.changes)
    /// - `SYNC_BATCH_SIZE`: Change targets per batch (default: 100)
    /// - `HANDLERS_FILE`: Handler definitions (default: handlers.json)
    /// - `ACCESS_CONTROL_FIELD`: Keyword field added to every mapping (default: unset)
    pub fn from_env() -> Result<Self, IndexingError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read settings through `lookup`, which returns the value of a variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, IndexingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.is_empty())
            .ok_or_else(|| IndexingError::config("DATABASE_URL must be set"))?;

        Ok(Self {
            opensearch_url: lookup("OPENSEARCH_URL")
                .unwrap_or_else(|| DEFAULT_OPENSEARCH_URL.to_string()),
            connection_mode: ConnectionMode::parse(lookup("OPENSEARCH_CONNECTION_MODE").as_deref()),
            retry_interval: Duration::from_secs(parse_or(
                &lookup,
                "OPENSEARCH_RETRY_INTERVAL_SECS",
                DEFAULT_RETRY_INTERVAL_SECS,
            )?),
            database_url,
            database_max_connections: parse_or(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                DEFAULT_DATABASE_MAX_CONNECTIONS,
            )?,
            kafka_broker: lookup("KAFKA_BROKER").unwrap_or_else(|| DEFAULT_KAFKA_BROKER.to_string()),
            kafka_group_id: lookup("KAFKA_GROUP_ID")
                .unwrap_or_else(|| DEFAULT_KAFKA_GROUP_ID.to_string()),
            changes_topic: lookup("CHANGES_TOPIC")
                .unwrap_or_else(|| DEFAULT_CHANGES_TOPIC.to_string()),
            batch_size: parse_or(&lookup, "SYNC_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            handlers_file: lookup("HANDLERS_FILE")
                .unwrap_or_else(|| DEFAULT_HANDLERS_FILE.to_string())
                .into(),
            access_control_field: lookup("ACCESS_CONTROL_FIELD").filter(|field| !field.is_empty()),
        })
    }
}

impl Settings {
    /// Search client configuration whose bulk limit fits a full batch.
    ///
    /// Every target of a batch yields at most one bulk action, so the limit
    /// never drops below `batch_size`.
    pub fn search_client_config(&self) -> SearchClientConfig {
        SearchClientConfig::with_max_bulk_actions(self.batch_size.max(DEFAULT_MAX_BULK_ACTIONS))
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, IndexingError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| IndexingError::config(format!("Invalid {}='{}': {}", name, raw, e))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings =
            Settings::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/app")])).unwrap();

        assert_eq!(settings.opensearch_url, "http://localhost:9200");
        assert_eq!(settings.connection_mode, ConnectionMode::Retry);
        assert_eq!(settings.retry_interval, Duration::from_secs(15));
        assert_eq!(settings.database_max_connections, 5);
        assert_eq!(settings.kafka_group_id, "search-sync");
        assert_eq!(settings.changes_topic, "entity.changes");
        assert_eq!(settings.batch_size, 100);
        assert_eq!(settings.handlers_file, PathBuf::from("handlers.json"));
        assert!(settings.access_control_field.is_none());
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/app"),
            ("OPENSEARCH_CONNECTION_MODE", "Fail-Fast"),
            ("SYNC_BATCH_SIZE", "25"),
            ("CHANGES_TOPIC", "app.changes"),
            ("ACCESS_CONTROL_FIELD", "tenant_id"),
        ]))
        .unwrap();

        assert_eq!(settings.connection_mode, ConnectionMode::FailFast);
        assert_eq!(settings.batch_size, 25);
        assert_eq!(settings.changes_topic, "app.changes");
        assert_eq!(settings.access_control_field.as_deref(), Some("tenant_id"));
    }

    #[test]
    fn test_bulk_limit_covers_large_batches() {
        let settings = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/app"),
            ("SYNC_BATCH_SIZE", "1500"),
        ]))
        .unwrap();

        let config = settings.search_client_config();
        assert_eq!(config.max_bulk_actions, Some(1500));
        assert!(config.validate_bulk_size(1500).is_ok());
    }

    #[test]
    fn test_bulk_limit_keeps_default_for_small_batches() {
        let settings =
            Settings::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/app")])).unwrap();

        assert_eq!(
            settings.search_client_config().max_bulk_actions,
            Some(DEFAULT_MAX_BULK_ACTIONS)
        );
    }

    #[test]
    fn test_database_url_is_required() {
        let result = Settings::from_lookup(lookup(&[]));
        assert!(matches!(result, Err(IndexingError::ConfigError(_))));
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let result = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/app"),
            ("SYNC_BATCH_SIZE", "many"),
        ]));
        assert!(matches!(result, Err(IndexingError::ConfigError(_))));
    }

    #[test]
    fn test_invalid_connection_mode_defaults_to_retry() {
        assert_eq!(ConnectionMode::parse(Some("sometimes")), ConnectionMode::Retry);
        assert_eq!(ConnectionMode::parse(None), ConnectionMode::Retry);
    }
}
