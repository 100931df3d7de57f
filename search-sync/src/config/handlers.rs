//! Handler definitions loaded from a JSON file.
//!
//! ```json
//! {
//!   "entities": {
//!     "Blog": { "table": "blogs" },
//!     "Comment": { "table": "comments", "id_column": "id" }
//!   },
//!   "handlers": [
//!     {
//!       "key": "comment",
//!       "index_name": "comment",
//!       "entity_class": "Comment",
//!       "fields": ["text", "blog_id"],
//!       "subscriptions": [
//!         { "entity_class": "Comment" },
//!         {
//!           "entity_class": "Blog",
//!           "properties": ["title"],
//!           "related": { "target_class": "Comment", "foreign_key": "blog_id" }
//!         }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! A handler without subscriptions follows changes of its own entity class.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use search_sync_repository::{EntityStore, TableBinding};

use crate::handler::{ChangeSubscription, RelatedRowsTransformer, SearchHandler, TableHandler};
use crate::IndexingError;

fn default_id_column() -> String {
    "id".to_string()
}

/// Table backing an entity class.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityDefinition {
    pub table: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
}

/// Fan-out of a change to rows referencing the changed entity.
#[derive(Debug, Clone, Deserialize)]
pub struct RelatedDefinition {
    pub target_class: String,
    pub foreign_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionDefinition {
    pub entity_class: String,
    #[serde(default)]
    pub properties: Option<Vec<String>>,
    #[serde(default)]
    pub related: Option<RelatedDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HandlerDefinition {
    pub key: String,
    pub index_name: String,
    pub entity_class: String,
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    #[serde(default)]
    pub mappings: Option<Value>,
    #[serde(default)]
    pub settings: Option<Value>,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionDefinition>,
}

/// Contents of the handlers file.
#[derive(Debug, Clone, Deserialize)]
pub struct HandlersFile {
    pub entities: BTreeMap<String, EntityDefinition>,
    pub handlers: Vec<HandlerDefinition>,
}

impl HandlersFile {
    /// Read and parse the handlers file at `path`.
    pub fn from_path(path: &Path) -> Result<Self, IndexingError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            IndexingError::config(format!(
                "Failed to read handlers file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, IndexingError> {
        let file: Self = serde_json::from_str(raw)
            .map_err(|e| IndexingError::config(format!("Invalid handlers file: {}", e)))?;
        file.validate()?;
        Ok(file)
    }

    /// Check that every referenced entity class has a table.
    fn validate(&self) -> Result<(), IndexingError> {
        let require = |class: &str, by: &str| {
            if self.entities.contains_key(class) {
                Ok(())
            } else {
                Err(IndexingError::config(format!(
                    "Handler '{}' references entity class '{}' which has no table",
                    by, class
                )))
            }
        };

        for handler in &self.handlers {
            require(&handler.entity_class, &handler.key)?;
            for subscription in &handler.subscriptions {
                if let Some(related) = &subscription.related {
                    require(&related.target_class, &handler.key)?;
                }
            }
        }
        Ok(())
    }

    /// Table binding per entity class.
    pub fn table_bindings(&self) -> Result<HashMap<String, TableBinding>, IndexingError> {
        self.entities
            .iter()
            .map(|(class, entity)| {
                TableBinding::new(&entity.table, &entity.id_column)
                    .map(|binding| (class.clone(), binding))
                    .map_err(|e| {
                        IndexingError::config(format!("Invalid table for '{}': {}", class, e))
                    })
            })
            .collect()
    }

    /// Build the configured handlers over `store`.
    pub fn build_handlers(&self, store: Arc<dyn EntityStore>) -> Vec<Arc<dyn SearchHandler>> {
        let handlers: Vec<Arc<dyn SearchHandler>> = self
            .handlers
            .iter()
            .map(|definition| {
                Arc::new(build_handler(definition, Arc::clone(&store))) as Arc<dyn SearchHandler>
            })
            .collect();

        info!(handlers = handlers.len(), "Loaded handler definitions");
        handlers
    }
}

fn build_handler(definition: &HandlerDefinition, store: Arc<dyn EntityStore>) -> TableHandler {
    let mut handler = TableHandler::new(
        &definition.key,
        &definition.index_name,
        &definition.entity_class,
        Arc::clone(&store),
    );
    if let Some(fields) = &definition.fields {
        handler = handler.with_fields(fields.iter().cloned());
    }
    if let Some(mappings) = &definition.mappings {
        handler = handler.with_mappings(mappings.clone());
    }
    if let Some(settings) = &definition.settings {
        handler = handler.with_settings(settings.clone());
    }

    if definition.subscriptions.is_empty() {
        return handler.with_subscription(ChangeSubscription::new(&definition.entity_class));
    }

    for subscription in &definition.subscriptions {
        let mut built = ChangeSubscription::new(&subscription.entity_class);
        if let Some(properties) = &subscription.properties {
            built = built.with_properties(properties.iter().cloned());
        }
        if let Some(related) = &subscription.related {
            built = built.with_transformer(RelatedRowsTransformer::new(
                Arc::clone(&store),
                &related.target_class,
                &related.foreign_key,
            ));
        }
        handler = handler.with_subscription(built);
    }
    handler
}
