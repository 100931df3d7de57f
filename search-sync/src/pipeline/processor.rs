//! Update processor.
//!
//! Turns one batch of handler-bound change targets into a single bulk write.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use search_sync_repository::{SearchClient, SearchIndexError};
use search_sync_shared::{ChangeTarget, HandlerBoundChangeTarget, IndexAction};

use crate::errors::SyncError;
use crate::registry::HandlerRegistry;

/// Chooses the destination index of a target.
///
/// Receives the handler's index name with the batch suffix already applied.
pub trait IndexNameTransformer: Send + Sync {
    fn transform(&self, index_name: &str, target: &ChangeTarget) -> String;
}

/// Writes every target of a handler to the same index.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultIndexName;

impl IndexNameTransformer for DefaultIndexName {
    fn transform(&self, index_name: &str, _target: &ChangeTarget) -> String {
        index_name.to_string()
    }
}

/// Outcome of processing one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    /// Targets in the batch.
    pub received: usize,
    /// Actions sent in the bulk request.
    pub written: usize,
    /// Targets whose handler returned no action.
    pub suppressed: usize,
    /// Update targets whose object could not be loaded.
    pub unresolved: usize,
}

/// Processes batches of change targets.
pub struct UpdateProcessor {
    registry: Arc<HandlerRegistry>,
    client: Arc<dyn SearchClient>,
    index_name_transformer: Arc<dyn IndexNameTransformer>,
}

impl UpdateProcessor {
    pub fn new(registry: Arc<HandlerRegistry>, client: Arc<dyn SearchClient>) -> Self {
        Self {
            registry,
            client,
            index_name_transformer: Arc::new(DefaultIndexName),
        }
    }

    pub fn with_index_name_transformer(
        mut self,
        transformer: Arc<dyn IndexNameTransformer>,
    ) -> Self {
        self.index_name_transformer = transformer;
        self
    }

    /// Process one batch.
    ///
    /// Items are grouped by handler key in order of first appearance. Every
    /// handler is looked up before anything is resolved or written, so an
    /// unknown key fails the whole batch without a partial write. All groups
    /// share one bulk request, which is skipped when no action remains.
    ///
    /// Processing the same batch again is safe: writes are keyed by document id.
    ///
    /// # Arguments
    ///
    /// * `index_suffix` - Appended to each handler's index name (`""` for live)
    /// * `batch` - The batch items
    ///
    /// # Returns
    ///
    /// * `Ok(ProcessSummary)` - The batch was written (or had nothing to write)
    /// * `Err(SyncError::Registry)` - A handler key is unknown
    /// * `Err(SyncError::SearchIndex)` - Transport failure, or a
    ///   `BulkFailure` listing every failing document
    #[instrument(skip(self, batch), fields(batch_size = batch.len()))]
    pub async fn process(
        &self,
        index_suffix: &str,
        batch: Vec<HandlerBoundChangeTarget>,
    ) -> Result<ProcessSummary, SyncError> {
        let mut summary = ProcessSummary {
            received: batch.len(),
            ..ProcessSummary::default()
        };

        let groups = group_by_handler(batch);

        let handlers = groups
            .iter()
            .map(|(key, _)| self.registry.get_transformable_handler_by_key(key))
            .collect::<Result<Vec<_>, _>>()?;

        let mut actions = Vec::with_capacity(summary.received);
        for (handler, (key, mut targets)) in handlers.iter().zip(groups) {
            handler.resolve_objects(&mut targets).await?;

            let index_name = format!("{}{}", handler.index_name(), index_suffix);
            for target in &targets {
                if target.is_unresolved() {
                    warn!(
                        handler = %key,
                        target_class = %target.target_class(),
                        document_id = %target.document_id(),
                        "Could not resolve object for update target, skipping"
                    );
                    summary.unresolved += 1;
                    continue;
                }

                match handler.transform(target) {
                    Some(action) => actions.push(IndexAction::new(
                        self.index_name_transformer.transform(&index_name, target),
                        action,
                    )),
                    None => summary.suppressed += 1,
                }
            }
        }

        if actions.is_empty() {
            debug!(
                suppressed = summary.suppressed,
                unresolved = summary.unresolved,
                "No document actions to write"
            );
            return Ok(summary);
        }

        match self.client.bulk(&actions).await {
            Ok(bulk) => {
                summary.written = actions.len();
                info!(
                    written = summary.written,
                    suppressed = summary.suppressed,
                    unresolved = summary.unresolved,
                    took_ms = ?bulk.took_ms,
                    "Batch written"
                );
                Ok(summary)
            }
            Err(e) => {
                if let SearchIndexError::BulkFailure { errors } = &e {
                    for item in errors {
                        error!(
                            index = %item.index_name,
                            document_id = %item.document_id,
                            operation = %item.operation,
                            status = item.status,
                            reason = %item.reason,
                            "Failed to write document"
                        );
                    }
                } else {
                    error!(error = %e, actions = actions.len(), "Bulk request failed");
                }
                Err(e.into())
            }
        }
    }
}

/// Group items by handler key, keeping first-appearance order of keys and
/// arrival order within each group.
fn group_by_handler(batch: Vec<HandlerBoundChangeTarget>) -> Vec<(String, Vec<ChangeTarget>)> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<ChangeTarget>)> = Vec::new();

    for item in batch {
        match positions.get(&item.handler_key) {
            Some(&position) => groups[position].1.push(item.target),
            None => {
                positions.insert(item.handler_key.clone(), groups.len());
                groups.push((item.handler_key, vec![item.target]));
            }
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use search_sync_shared::single_id;

    #[test]
    fn test_group_by_handler_keeps_order() {
        let batch = vec![
            HandlerBoundChangeTarget::new("comment", ChangeTarget::for_update("Comment", single_id("id", 1))),
            HandlerBoundChangeTarget::new("blog", ChangeTarget::for_update("Blog", single_id("id", 1))),
            HandlerBoundChangeTarget::new("comment", ChangeTarget::for_delete("Comment", single_id("id", 2))),
        ];

        let groups = group_by_handler(batch);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "comment");
        assert_eq!(groups[0].1.len(), 2);
        assert!(groups[0].1[1].is_delete());
        assert_eq!(groups[1].0, "blog");
    }

    #[test]
    fn test_default_index_name() {
        let target = ChangeTarget::for_update("Blog", single_id("id", 1));
        assert_eq!(DefaultIndexName.transform("blog_new", &target), "blog_new");
    }
}
