//! Table-backed handler configured without code.
//!
//! A `TableHandler` indexes the rows of one entity class. Rows are loaded from
//! the entity store, optionally reduced to a list of fields, and stamped with
//! the time they were indexed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use search_sync_repository::EntityStore;
use search_sync_shared::{document_id, ChangeNotification, ChangeTarget, DocumentAction};

use crate::errors::HandlerError;
use crate::handler::{ChangeSubscription, SearchHandler, TransformableHandler, Transformer};

/// Field added to every document built by a [`TableHandler`].
const INDEXED_AT_FIELD: &str = "indexed_at";

/// Handler indexing the rows of one table.
pub struct TableHandler {
    key: String,
    index_name: String,
    entity_class: String,
    fields: Option<Vec<String>>,
    mappings: Value,
    settings: Value,
    subscriptions: Vec<ChangeSubscription>,
    store: Arc<dyn EntityStore>,
}

impl TableHandler {
    /// Create a handler without subscriptions, copying every column.
    pub fn new(
        key: impl Into<String>,
        index_name: impl Into<String>,
        entity_class: impl Into<String>,
        store: Arc<dyn EntityStore>,
    ) -> Self {
        Self {
            key: key.into(),
            index_name: index_name.into(),
            entity_class: entity_class.into(),
            fields: None,
            mappings: json!({ "properties": {} }),
            settings: json!({}),
            subscriptions: Vec::new(),
            store,
        }
    }

    /// Only copy `fields` into documents.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_mappings(mut self, mappings: Value) -> Self {
        self.mappings = mappings;
        self
    }

    pub fn with_settings(mut self, settings: Value) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_subscription(mut self, subscription: ChangeSubscription) -> Self {
        self.subscriptions.push(subscription);
        self
    }

    /// Build the document body from a row.
    fn document_from(&self, object: &Value) -> Option<Value> {
        let row = object.as_object()?;
        let mut document = match &self.fields {
            Some(fields) => fields
                .iter()
                .filter_map(|field| row.get(field).map(|v| (field.clone(), v.clone())))
                .collect::<Map<String, Value>>(),
            None => row.clone(),
        };
        document.insert(
            INDEXED_AT_FIELD.to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        Some(Value::Object(document))
    }
}

impl SearchHandler for TableHandler {
    fn key(&self) -> &str {
        &self.key
    }

    fn index_name(&self) -> &str {
        &self.index_name
    }

    fn entity_class(&self) -> &str {
        &self.entity_class
    }

    fn mappings(&self) -> Value {
        self.mappings.clone()
    }

    fn settings(&self) -> Value {
        self.settings.clone()
    }

    fn as_transformable(self: Arc<Self>) -> Option<Arc<dyn TransformableHandler>> {
        Some(self)
    }
}

#[async_trait]
impl TransformableHandler for TableHandler {
    fn subscriptions(&self) -> &[ChangeSubscription] {
        &self.subscriptions
    }

    async fn resolve_objects(&self, targets: &mut [ChangeTarget]) -> Result<(), HandlerError> {
        // target class -> positions of unresolved update targets
        let mut pending: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (position, target) in targets.iter().enumerate() {
            if target.is_unresolved() {
                pending
                    .entry(target.target_class().to_string())
                    .or_default()
                    .push(position);
            }
        }

        for (class, positions) in pending {
            let ids: Vec<_> = positions.iter().map(|&p| targets[p].ids().clone()).collect();
            let rows = self.store.find_by_ids(&class, &ids).await?;

            let objects: HashMap<String, Value> = rows
                .into_iter()
                .map(|row| (document_id(&row.ids), row.object))
                .collect();

            debug!(
                handler = %self.key,
                entity_class = %class,
                requested = positions.len(),
                found = objects.len(),
                "Resolved change targets"
            );

            for position in positions {
                let target = &mut targets[position];
                if let Some(object) = objects.get(&target.document_id()) {
                    target.set_resolved_object(object.clone());
                }
            }
        }

        Ok(())
    }

    fn transform(&self, target: &ChangeTarget) -> Option<DocumentAction> {
        if target.target_class() != self.entity_class {
            warn!(
                handler = %self.key,
                target_class = %target.target_class(),
                "Target class does not match the handler's entity class, skipping"
            );
            return None;
        }

        match target {
            ChangeTarget::ForDelete { .. } => Some(DocumentAction::delete(target.document_id())),
            ChangeTarget::ForUpdate { .. } => {
                let document = self.document_from(target.resolved_object()?)?;
                Some(DocumentAction::update(target.document_id(), document))
            }
        }
    }
}

/// Fans a change out to the rows that reference the changed entity.
///
/// For a change of `Blog {id: 1}` with `target_class = "Comment"` and
/// `foreign_key = "blog_id"`, every comment with `blog_id = 1` becomes an
/// update target.
pub struct RelatedRowsTransformer {
    store: Arc<dyn EntityStore>,
    target_class: String,
    foreign_key: String,
}

impl RelatedRowsTransformer {
    pub fn new(
        store: Arc<dyn EntityStore>,
        target_class: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            store,
            target_class: target_class.into(),
            foreign_key: foreign_key.into(),
        }
    }
}

#[async_trait]
impl Transformer for RelatedRowsTransformer {
    async fn transform(
        &self,
        notification: &ChangeNotification,
    ) -> Result<Vec<ChangeTarget>, HandlerError> {
        let parent_id = match notification.ids.values().next() {
            Some(id) if notification.ids.len() == 1 => id,
            _ => {
                return Err(HandlerError::transform(format!(
                    "Related rows of {} need a single-column id, got {:?}",
                    notification.entity_class, notification.ids
                )))
            }
        };

        let related = self
            .store
            .find_ids_by(&self.target_class, &self.foreign_key, parent_id)
            .await?;

        debug!(
            entity_class = %notification.entity_class,
            target_class = %self.target_class,
            related = related.len(),
            "Fanned change out to related rows"
        );

        Ok(related
            .into_iter()
            .map(|ids| ChangeTarget::for_update(self.target_class.clone(), ids))
            .collect())
    }
}
