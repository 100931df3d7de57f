//! Search client trait definition.
//!
//! This module defines the abstract interface for search backend operations,
//! allowing for different backend implementations (OpenSearch, Elasticsearch, etc.).

use async_trait::async_trait;
use serde_json::Value;

use search_sync_shared::IndexAction;

use crate::errors::SearchIndexError;
use crate::types::{AliasMap, BulkSummary};

/// Abstracts the underlying search backend (OpenSearch, Elasticsearch, etc.).
///
/// Implementations are injected into the update processor and the indexer to
/// enable dependency injection and easy testing with in-memory implementations.
///
/// All methods return `Result<T, SearchIndexError>` for consistent error handling
/// across different backend implementations.
///
/// # Idempotency
///
/// Document writes are keyed by document id and replace the previous version,
/// so sending the same actions twice leaves the index in the same state as
/// sending them once.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Execute index/delete actions in one bulk request.
    ///
    /// Deleting a document that does not exist is not an error. Actions are
    /// applied in order, so a later action for the same document id wins.
    ///
    /// # Returns
    ///
    /// * `Ok(BulkSummary)` - Every action was applied
    /// * `Err(SearchIndexError::BulkFailure)` - The request succeeded but some
    ///   items failed; all failing items are listed
    /// * `Err(SearchIndexError)` - The request as a whole failed
    async fn bulk(&self, actions: &[IndexAction]) -> Result<BulkSummary, SearchIndexError>;

    /// Create a physical index with the given settings/mappings body.
    async fn create_index(&self, index: &str, body: &Value) -> Result<(), SearchIndexError>;

    /// Delete a physical index.
    async fn delete_index(&self, index: &str) -> Result<(), SearchIndexError>;

    /// Point `alias` at `index` in addition to any index it already covers.
    async fn create_alias(&self, index: &str, alias: &str) -> Result<(), SearchIndexError>;

    /// Atomically make `alias` point at `index` only.
    ///
    /// The removal from previous indices and the addition happen in a single
    /// alias update so readers never observe a missing alias.
    async fn move_alias(&self, alias: &str, index: &str) -> Result<(), SearchIndexError>;

    /// Remove `alias` from every index it points to.
    async fn delete_alias(&self, alias: &str) -> Result<(), SearchIndexError>;

    /// All aliases, keyed by physical index name.
    ///
    /// Indices without aliases are included with an empty set.
    async fn get_aliases(&self) -> Result<AliasMap, SearchIndexError>;

    /// Physical indices whose name matches a wildcard pattern such as `blog_*`.
    async fn get_indices(&self, pattern: &str) -> Result<Vec<String>, SearchIndexError>;

    /// Returns true if `name` is an alias.
    async fn is_alias(&self, name: &str) -> Result<bool, SearchIndexError>;

    /// Returns true if `name` is a physical index (not an alias).
    async fn is_index(&self, name: &str) -> Result<bool, SearchIndexError>;

    /// Number of documents in an index or behind an alias.
    async fn count(&self, index: &str) -> Result<u64, SearchIndexError>;
}
