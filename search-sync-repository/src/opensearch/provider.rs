//! OpenSearch provider implementation.
//!
//! This module provides the concrete implementation of `SearchClient`
//! using the OpenSearch Rust crate.

use std::collections::BTreeSet;

use async_trait::async_trait;
use opensearch::{
    http::{
        request::JsonBody,
        response::Response,
        transport::{SingleNodeConnectionPool, TransportBuilder},
    },
    indices::{
        IndicesCreateParts, IndicesDeleteParts, IndicesExistsAliasParts, IndicesExistsParts,
        IndicesGetAliasParts, IndicesGetParts, IndicesPutAliasParts,
    },
    params::Refresh,
    BulkParts, CountParts, OpenSearch,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use url::Url;

use search_sync_shared::{DocumentAction, IndexAction};

use crate::config::SearchClientConfig;
use crate::errors::SearchIndexError;
use crate::interfaces::SearchClient;
use crate::types::{indices_for_alias, AliasMap, BulkItemError, BulkSummary};

/// OpenSearch provider implementation.
///
/// # Example
///
/// ```ignore
/// use search_sync_repository::{OpenSearchProvider, SearchClient, SearchClientConfig};
///
/// let provider = OpenSearchProvider::new("http://localhost:9200", SearchClientConfig::default()).await?;
/// let aliases = provider.get_aliases().await?;
/// ```
pub struct OpenSearchProvider {
    client: OpenSearch,
    config: SearchClientConfig,
}

impl OpenSearchProvider {
    /// Create a new OpenSearch provider connected to the specified URL.
    ///
    /// # Arguments
    ///
    /// * `url` - The OpenSearch server URL (e.g., "http://localhost:9200")
    /// * `config` - Bulk request configuration
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchProvider)` - A new provider instance
    /// * `Err(SearchIndexError)` - If connection setup fails
    pub async fn new(url: &str, config: SearchClientConfig) -> Result<Self, SearchIndexError> {
        let parsed_url =
            Url::parse(url).map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(
            url = %url,
            max_bulk_actions = ?config.max_bulk_actions,
            refresh_after_bulk = config.refresh_after_bulk,
            "Created OpenSearch provider"
        );

        Ok(Self { client, config })
    }

    /// Verify that the cluster answers.
    pub async fn ping(&self) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .ping()
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        if !response.status_code().is_success() {
            return Err(SearchIndexError::connection(format!(
                "Ping failed with status {}",
                response.status_code()
            )));
        }
        Ok(())
    }

    /// Build the newline-delimited bulk body for `actions`.
    fn bulk_body(actions: &[IndexAction]) -> Vec<JsonBody<Value>> {
        let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(actions.len() * 2);
        for action in actions {
            match &action.action {
                DocumentAction::Update {
                    document_id,
                    document,
                } => {
                    body.push(
                        json!({ "index": { "_index": action.index_name, "_id": document_id } })
                            .into(),
                    );
                    body.push(document.clone().into());
                }
                DocumentAction::Delete { document_id } => {
                    body.push(
                        json!({ "delete": { "_index": action.index_name, "_id": document_id } })
                            .into(),
                    );
                }
            }
        }
        body
    }

    /// Fail with the response body when the status is not a success.
    async fn ensure_success(
        response: Response,
        what: &str,
        to_error: fn(String) -> SearchIndexError,
    ) -> Result<Response, SearchIndexError> {
        let status = response.status_code();
        if status.is_success() {
            return Ok(response);
        }
        let error_body = response.text().await.unwrap_or_default();
        error!(status = %status, body = %error_body, "{} request failed", what);
        Err(to_error(format!(
            "{} failed with status {}: {}",
            what, status, error_body
        )))
    }

    /// Apply alias actions in a single atomic `_aliases` request.
    async fn update_aliases(&self, actions: Vec<Value>) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .indices()
            .update_aliases()
            .body(json!({ "actions": actions }))
            .send()
            .await
            .map_err(|e| SearchIndexError::transport(e.to_string()))?;

        Self::ensure_success(response, "Alias update", SearchIndexError::AliasError).await?;
        Ok(())
    }

    async fn exists(&self, response: Result<Response, opensearch::Error>) -> Result<bool, SearchIndexError> {
        let response = response.map_err(|e| SearchIndexError::transport(e.to_string()))?;
        match response.status_code().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            status => Err(SearchIndexError::transport(format!(
                "Existence check failed with status {}",
                status
            ))),
        }
    }
}

/// Collect the failing items of a bulk response.
///
/// Items of a successful response carry no `error` object; deletes of missing
/// documents report `not_found` without an error and are not failures.
pub(crate) fn parse_bulk_failures(response: &Value) -> Result<Vec<BulkItemError>, SearchIndexError> {
    if !response["errors"].as_bool().unwrap_or(false) {
        return Ok(Vec::new());
    }

    let items = response["items"]
        .as_array()
        .ok_or_else(|| SearchIndexError::parse("Bulk response has no items array"))?;

    let mut failures = Vec::new();
    for item in items {
        let Some((operation, result)) = item.as_object().and_then(|o| o.iter().next()) else {
            continue;
        };
        let Some(error) = result.get("error") else {
            continue;
        };
        let reason = match (error["type"].as_str(), error["reason"].as_str()) {
            (Some(kind), Some(reason)) => format!("{}: {}", kind, reason),
            (Some(kind), None) => kind.to_string(),
            _ => error.to_string(),
        };
        failures.push(BulkItemError {
            index_name: result["_index"].as_str().unwrap_or_default().to_string(),
            document_id: result["_id"].as_str().unwrap_or_default().to_string(),
            operation: operation.clone(),
            status: result["status"].as_u64().unwrap_or_default() as u16,
            reason,
        });
    }
    Ok(failures)
}

/// Turn a `GET _alias` response into an alias map.
pub(crate) fn parse_alias_map(response: &Value) -> Result<AliasMap, SearchIndexError> {
    let indices = response
        .as_object()
        .ok_or_else(|| SearchIndexError::parse("Alias response is not an object"))?;

    let mut aliases = AliasMap::new();
    for (index, entry) in indices {
        let names: BTreeSet<String> = entry["aliases"]
            .as_object()
            .map(|a| a.keys().cloned().collect())
            .unwrap_or_default();
        aliases.insert(index.clone(), names);
    }
    Ok(aliases)
}

#[async_trait]
impl SearchClient for OpenSearchProvider {
    /// Execute index/delete actions in one bulk request.
    ///
    /// The response is inspected item by item; every failing item is collected
    /// into a single `SearchIndexError::BulkFailure`.
    async fn bulk(&self, actions: &[IndexAction]) -> Result<BulkSummary, SearchIndexError> {
        if actions.is_empty() {
            return Ok(BulkSummary::default());
        }
        self.config.validate_bulk_size(actions.len())?;

        let mut request = self
            .client
            .bulk(BulkParts::None)
            .body(Self::bulk_body(actions));
        if self.config.refresh_after_bulk {
            request = request.refresh(Refresh::WaitFor);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SearchIndexError::transport(e.to_string()))?;
        let response =
            Self::ensure_success(response, "Bulk", SearchIndexError::TransportError).await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;

        let failures = parse_bulk_failures(&body)?;
        if !failures.is_empty() {
            warn!(
                total = actions.len(),
                failed = failures.len(),
                "Bulk request completed with failures"
            );
            return Err(SearchIndexError::bulk_failure(failures));
        }

        debug!(count = actions.len(), "Bulk request applied");
        Ok(BulkSummary {
            total: actions.len(),
            took_ms: body["took"].as_u64(),
        })
    }

    async fn create_index(&self, index: &str, body: &Value) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(body.clone())
            .send()
            .await
            .map_err(|e| SearchIndexError::transport(e.to_string()))?;

        Self::ensure_success(response, "Create index", SearchIndexError::IndexCreationError)
            .await?;
        info!(index = %index, "Index created");
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .indices()
            .delete(IndicesDeleteParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchIndexError::transport(e.to_string()))?;

        Self::ensure_success(response, "Delete index", SearchIndexError::IndexDeletionError)
            .await?;
        info!(index = %index, "Index deleted");
        Ok(())
    }

    async fn create_alias(&self, index: &str, alias: &str) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .indices()
            .put_alias(IndicesPutAliasParts::IndexName(&[index], alias))
            .send()
            .await
            .map_err(|e| SearchIndexError::transport(e.to_string()))?;

        Self::ensure_success(response, "Create alias", SearchIndexError::AliasError).await?;
        debug!(index = %index, alias = %alias, "Alias created");
        Ok(())
    }

    /// Atomically make `alias` point at `index` only.
    ///
    /// Removals from the previous indices and the addition are sent in one
    /// `_aliases` request.
    async fn move_alias(&self, alias: &str, index: &str) -> Result<(), SearchIndexError> {
        let current = indices_for_alias(&self.get_aliases().await?, alias);

        let mut actions: Vec<Value> = current
            .iter()
            .filter(|previous| previous.as_str() != index)
            .map(|previous| json!({ "remove": { "index": previous, "alias": alias } }))
            .collect();
        actions.push(json!({ "add": { "index": index, "alias": alias } }));

        self.update_aliases(actions).await?;
        info!(alias = %alias, index = %index, previous = ?current, "Alias moved");
        Ok(())
    }

    async fn delete_alias(&self, alias: &str) -> Result<(), SearchIndexError> {
        let current = indices_for_alias(&self.get_aliases().await?, alias);
        if current.is_empty() {
            debug!(alias = %alias, "Alias does not exist, nothing to delete");
            return Ok(());
        }

        let actions = current
            .iter()
            .map(|index| json!({ "remove": { "index": index, "alias": alias } }))
            .collect();
        self.update_aliases(actions).await?;
        debug!(alias = %alias, indices = ?current, "Alias deleted");
        Ok(())
    }

    async fn get_aliases(&self) -> Result<AliasMap, SearchIndexError> {
        let response = self
            .client
            .indices()
            .get_alias(IndicesGetAliasParts::None)
            .send()
            .await
            .map_err(|e| SearchIndexError::transport(e.to_string()))?;

        let response = Self::ensure_success(response, "Get aliases", SearchIndexError::AliasError)
            .await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;
        parse_alias_map(&body)
    }

    async fn get_indices(&self, pattern: &str) -> Result<Vec<String>, SearchIndexError> {
        let response = self
            .client
            .indices()
            .get(IndicesGetParts::Index(&[pattern]))
            .send()
            .await
            .map_err(|e| SearchIndexError::transport(e.to_string()))?;

        if response.status_code().as_u16() == 404 {
            return Ok(Vec::new());
        }
        let response =
            Self::ensure_success(response, "Get indices", SearchIndexError::TransportError).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;

        Ok(body
            .as_object()
            .map(|indices| indices.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn is_alias(&self, name: &str) -> Result<bool, SearchIndexError> {
        let response = self
            .client
            .indices()
            .exists_alias(IndicesExistsAliasParts::Name(&[name]))
            .send()
            .await;
        self.exists(response).await
    }

    /// `HEAD /{name}` also answers for aliases, so aliases are excluded explicitly.
    async fn is_index(&self, name: &str) -> Result<bool, SearchIndexError> {
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[name]))
            .send()
            .await;
        if !self.exists(response).await? {
            return Ok(false);
        }
        Ok(!self.is_alias(name).await?)
    }

    async fn count(&self, index: &str) -> Result<u64, SearchIndexError> {
        let response = self
            .client
            .count(CountParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchIndexError::transport(e.to_string()))?;

        let response =
            Self::ensure_success(response, "Count", SearchIndexError::TransportError).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;

        body["count"]
            .as_u64()
            .ok_or_else(|| SearchIndexError::parse("Count response has no count"))
    }
}
