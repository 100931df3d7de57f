//! Index lifecycle.
//!
//! Every handler owns a root alias. A rebuild creates a timestamped index
//! behind the staging alias `{alias}_new`, populates it from the entity store,
//! swaps the root alias onto it and eventually deletes indices no alias
//! references anymore. Each operation runs over all registered handlers and
//! can be repeated.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tracing::{info, instrument, warn};

use search_sync_repository::opensearch::{
    index_pattern, is_physical_index_of, staging_alias, timestamped_index_name, IndexConfig,
    STAGING_SUFFIX,
};
use search_sync_repository::types::{indices_for_alias, is_referenced};
use search_sync_repository::{EntityStore, SearchClient, SearchIndexError};
use search_sync_shared::{ChangeTarget, HandlerBoundChangeTarget};

use crate::errors::SyncError;
use crate::handler::{SearchHandler, TransformableHandler};
use crate::pipeline::{BatchSink, Populator};
use crate::registry::HandlerRegistry;

/// Result of creating a handler's index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateReport {
    pub handler: String,
    pub index: String,
    pub staging_alias: String,
}

/// Result of populating a handler's staging index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulateReport {
    pub handler: String,
    pub staging_alias: String,
    pub batches: usize,
    pub items: usize,
    /// Documents behind the staging alias once every batch was written.
    pub document_count: Option<u64>,
}

/// Result of swapping a handler's root alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapReport {
    pub handler: String,
    pub alias: String,
    pub index: String,
    /// Indices the root alias pointed to before the swap.
    pub previous: Vec<String>,
    pub dry_run: bool,
}

/// Current state of a handler's indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerStatus {
    pub handler: String,
    pub alias: String,
    pub live: Vec<String>,
    pub staging: Vec<String>,
    pub document_count: Option<u64>,
}

/// Runs lifecycle operations over every registered handler.
pub struct Indexer {
    registry: Arc<HandlerRegistry>,
    client: Arc<dyn SearchClient>,
    store: Arc<dyn EntityStore>,
    index_config: IndexConfig,
    populator: Populator,
}

impl Indexer {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        client: Arc<dyn SearchClient>,
        store: Arc<dyn EntityStore>,
        index_config: IndexConfig,
        batch_size: usize,
    ) -> Self {
        Self {
            registry,
            client,
            store,
            index_config,
            populator: Populator::new(batch_size),
        }
    }

    /// Create a fresh index for every handler and point its staging alias at it.
    pub async fn create(&self) -> Result<Vec<CreateReport>, SyncError> {
        self.create_at(Utc::now()).await
    }

    /// [`Indexer::create`] with an explicit creation time.
    #[instrument(skip(self))]
    pub async fn create_at(&self, at: DateTime<Utc>) -> Result<Vec<CreateReport>, SyncError> {
        let mut reports = Vec::new();
        for handler in self.registry.get_all() {
            let report = self
                .create_for(handler.as_ref(), at)
                .await
                .map_err(|e| SyncError::operation("create", handler.key(), e))?;
            reports.push(report);
        }
        Ok(reports)
    }

    async fn create_for(
        &self,
        handler: &dyn SearchHandler,
        at: DateTime<Utc>,
    ) -> Result<CreateReport, SyncError> {
        let alias = handler.index_name();
        let body =
            self.index_config
                .build_index_body(alias, &handler.settings(), &handler.mappings())?;

        let index = timestamped_index_name(alias, at);
        if self.client.is_index(&index).await? {
            return Err(SyncError::IndexAlreadyExists(index));
        }

        let staging = staging_alias(alias);
        self.client.create_index(&index, &body).await?;
        self.client.delete_alias(&staging).await?;
        self.client.create_alias(&index, &staging).await?;

        info!(handler = %handler.key(), index = %index, alias = %staging, "Index created");
        Ok(CreateReport {
            handler: handler.key().to_string(),
            index,
            staging_alias: staging,
        })
    }

    /// Stream every row id of each transformable handler's entity class into
    /// its staging index.
    ///
    /// Batches go to `sink`; with a queued sink they may still be in flight
    /// when this returns, so document counts are left to
    /// [`Indexer::count_documents`].
    #[instrument(skip(self, sink))]
    pub async fn populate(&self, sink: &dyn BatchSink) -> Result<Vec<PopulateReport>, SyncError> {
        let mut reports = Vec::new();
        for handler in self.registry.get_all() {
            match Arc::clone(handler).as_transformable() {
                Some(transformable) => {
                    let report = self
                        .populate_for(transformable.as_ref(), sink)
                        .await
                        .map_err(|e| SyncError::operation("populate", handler.key(), e))?;
                    reports.push(report);
                }
                None => {
                    warn!(handler = %handler.key(), "Handler does not support transforms, skipping population");
                }
            }
        }
        Ok(reports)
    }

    async fn populate_for(
        &self,
        handler: &dyn TransformableHandler,
        sink: &dyn BatchSink,
    ) -> Result<PopulateReport, SyncError> {
        let staging = staging_alias(handler.index_name());
        if !self.client.is_alias(&staging).await? {
            return Err(SearchIndexError::alias_not_found(staging).into());
        }

        let key = handler.key().to_string();
        let entity_class = handler.entity_class().to_string();
        let source = self
            .store
            .iterate_all_ids(handler.entity_class())
            .map(|ids| {
                ids.map(|ids| {
                    HandlerBoundChangeTarget::new(
                        key.clone(),
                        ChangeTarget::for_update(entity_class.clone(), ids),
                    )
                })
                .map_err(SyncError::from)
            });

        info!(handler = %key, alias = %staging, "Populating index");
        let summary = self.populator.populate(source, STAGING_SUFFIX, sink).await?;

        Ok(PopulateReport {
            handler: key,
            staging_alias: staging,
            batches: summary.batches,
            items: summary.items,
            document_count: None,
        })
    }

    /// Fill in the document count of each populate report.
    pub async fn count_documents(&self, reports: &mut [PopulateReport]) -> Result<(), SyncError> {
        for report in reports.iter_mut() {
            let count = self
                .client
                .count(&report.staging_alias)
                .await
                .map_err(|e| SyncError::operation("populate", report.handler.as_str(), e))?;
            info!(handler = %report.handler, alias = %report.staging_alias, documents = count, "Index populated");
            report.document_count = Some(count);
        }
        Ok(())
    }

    /// Point every handler's root alias at the index behind its staging alias.
    ///
    /// The root alias is moved in one alias update, then the staging alias is
    /// removed. With `dry_run` nothing is written.
    #[instrument(skip(self))]
    pub async fn swap(&self, dry_run: bool) -> Result<Vec<SwapReport>, SyncError> {
        let mut reports = Vec::new();
        for handler in self.registry.get_all() {
            let report = self
                .swap_for(handler.as_ref(), dry_run)
                .await
                .map_err(|e| SyncError::operation("swap", handler.key(), e))?;
            reports.push(report);
        }
        Ok(reports)
    }

    async fn swap_for(
        &self,
        handler: &dyn SearchHandler,
        dry_run: bool,
    ) -> Result<SwapReport, SyncError> {
        let alias = handler.index_name();
        let staging = staging_alias(alias);
        let aliases = self.client.get_aliases().await?;

        let mut candidates = indices_for_alias(&aliases, &staging);
        let index = match candidates.pop() {
            Some(index) => index,
            None => return Err(SearchIndexError::alias_not_found(staging).into()),
        };
        if !candidates.is_empty() {
            warn!(alias = %staging, index = %index, others = ?candidates, "Staging alias points to several indices, using the newest");
        }

        if self.client.is_index(alias).await? {
            return Err(SyncError::AliasConflict(alias.to_string()));
        }

        let previous = indices_for_alias(&aliases, alias);
        if !dry_run {
            self.client.move_alias(alias, &index).await?;
            self.client.delete_alias(&staging).await?;
        }

        info!(
            handler = %handler.key(),
            alias = %alias,
            index = %index,
            previous = ?previous,
            dry_run = dry_run,
            "Alias swapped"
        );
        Ok(SwapReport {
            handler: handler.key().to_string(),
            alias: alias.to_string(),
            index,
            previous,
            dry_run,
        })
    }

    /// Delete every handler index that no alias references.
    ///
    /// # Returns
    ///
    /// The deleted indices, or with `dry_run` the indices that would be deleted.
    #[instrument(skip(self))]
    pub async fn clean(&self, dry_run: bool) -> Result<Vec<String>, SyncError> {
        let aliases = self.client.get_aliases().await?;
        let mut orphaned = BTreeSet::new();

        for handler in self.registry.get_all() {
            let alias = handler.index_name();
            let indices = self
                .client
                .get_indices(&index_pattern(alias))
                .await
                .map_err(|e| SyncError::operation("clean", handler.key(), e))?;

            orphaned.extend(
                indices
                    .into_iter()
                    .filter(|index| is_physical_index_of(alias, index))
                    .filter(|index| !is_referenced(&aliases, index)),
            );
        }

        for index in &orphaned {
            if dry_run {
                info!(index = %index, "Would delete unreferenced index");
            } else {
                self.client.delete_index(index).await?;
                info!(index = %index, "Deleted unreferenced index");
            }
        }

        Ok(orphaned.into_iter().collect())
    }

    /// Report the indices behind every handler's aliases.
    pub async fn status(&self) -> Result<Vec<HandlerStatus>, SyncError> {
        let aliases = self.client.get_aliases().await?;
        let mut statuses = Vec::new();

        for handler in self.registry.get_all() {
            let alias = handler.index_name();
            let live = indices_for_alias(&aliases, alias);
            let staging = indices_for_alias(&aliases, &staging_alias(alias));
            let document_count = if live.is_empty() {
                None
            } else {
                Some(
                    self.client
                        .count(alias)
                        .await
                        .map_err(|e| SyncError::operation("status", handler.key(), e))?,
                )
            };

            statuses.push(HandlerStatus {
                handler: handler.key().to_string(),
                alias: alias.to_string(),
                live,
                staging,
                document_count,
            });
        }

        Ok(statuses)
    }
}
