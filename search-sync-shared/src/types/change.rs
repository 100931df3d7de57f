//! Change notification and change target types.
//!
//! A [`ChangeNotification`] describes that a row of the source-of-truth store
//! was created, updated or deleted. Handlers turn notifications into
//! [`ChangeTarget`]s, which travel through batching bound to the key of the
//! handler that emitted them.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::ids::{document_id, EntityIds};

/// Free-form metadata attached to notifications and targets.
pub type Metadata = BTreeMap<String, Value>;

/// Types of entity changes that can be received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Entity was created or updated.
    Upsert,
    /// Entity was deleted.
    Delete,
}

/// A change reported by the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeNotification {
    /// The type of change.
    pub kind: ChangeKind,
    /// Entity class (table / model name) of the changed row.
    pub entity_class: String,
    /// Identifier of the changed row.
    pub ids: EntityIds,
    /// Properties that changed, or `None` when unknown.
    #[serde(default)]
    pub changed_properties: Option<BTreeSet<String>>,
    /// Extra data captured by the producer, e.g. a snapshot of a deleted row.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

impl ChangeNotification {
    /// Create an upsert notification with unknown changed properties.
    pub fn upsert(entity_class: impl Into<String>, ids: EntityIds) -> Self {
        Self {
            kind: ChangeKind::Upsert,
            entity_class: entity_class.into(),
            ids,
            changed_properties: None,
            metadata: Metadata::new(),
        }
    }

    /// Record which properties changed.
    pub fn with_changed_properties<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.changed_properties = Some(properties.into_iter().map(Into::into).collect());
        self
    }

    /// Create a delete notification.
    pub fn delete(entity_class: impl Into<String>, ids: EntityIds) -> Self {
        Self {
            kind: ChangeKind::Delete,
            entity_class: entity_class.into(),
            ids,
            changed_properties: None,
            metadata: Metadata::new(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns true for delete notifications.
    pub fn is_delete(&self) -> bool {
        self.kind == ChangeKind::Delete
    }
}

/// A document-level unit of work produced from a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeTarget {
    /// The target document must be (re)built from the current row.
    ForUpdate {
        target_class: String,
        ids: EntityIds,
        /// Row loaded by the owning handler right before transformation.
        #[serde(skip)]
        resolved_object: Option<Value>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        metadata: Metadata,
    },
    /// The target document must be removed.
    ForDelete {
        target_class: String,
        ids: EntityIds,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        metadata: Metadata,
    },
}

impl ChangeTarget {
    /// Create an update target.
    pub fn for_update(target_class: impl Into<String>, ids: EntityIds) -> Self {
        ChangeTarget::ForUpdate {
            target_class: target_class.into(),
            ids,
            resolved_object: None,
            metadata: Metadata::new(),
        }
    }

    /// Create a delete target.
    pub fn for_delete(target_class: impl Into<String>, ids: EntityIds) -> Self {
        ChangeTarget::ForDelete {
            target_class: target_class.into(),
            ids,
            metadata: Metadata::new(),
        }
    }

    /// Replace the metadata of the target.
    pub fn with_metadata_map(mut self, new_metadata: Metadata) -> Self {
        match &mut self {
            ChangeTarget::ForUpdate { metadata, .. } | ChangeTarget::ForDelete { metadata, .. } => {
                *metadata = new_metadata;
            }
        }
        self
    }

    pub fn target_class(&self) -> &str {
        match self {
            ChangeTarget::ForUpdate { target_class, .. }
            | ChangeTarget::ForDelete { target_class, .. } => target_class,
        }
    }

    pub fn ids(&self) -> &EntityIds {
        match self {
            ChangeTarget::ForUpdate { ids, .. } | ChangeTarget::ForDelete { ids, .. } => ids,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            ChangeTarget::ForUpdate { metadata, .. } | ChangeTarget::ForDelete { metadata, .. } => {
                metadata
            }
        }
    }

    /// The resolved row, if any. Always `None` for delete targets.
    pub fn resolved_object(&self) -> Option<&Value> {
        match self {
            ChangeTarget::ForUpdate {
                resolved_object, ..
            } => resolved_object.as_ref(),
            ChangeTarget::ForDelete { .. } => None,
        }
    }

    /// Store the resolved row. Ignored for delete targets.
    pub fn set_resolved_object(&mut self, object: Value) {
        if let ChangeTarget::ForUpdate {
            resolved_object, ..
        } = self
        {
            *resolved_object = Some(object);
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, ChangeTarget::ForDelete { .. })
    }

    /// Returns true for update targets that still lack a resolved row.
    pub fn is_unresolved(&self) -> bool {
        matches!(
            self,
            ChangeTarget::ForUpdate {
                resolved_object: None,
                ..
            }
        )
    }

    /// Document ID derived from the target ids.
    pub fn document_id(&self) -> String {
        document_id(self.ids())
    }
}

/// A change target paired with the key of the handler that emitted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerBoundChangeTarget {
    pub handler_key: String,
    pub target: ChangeTarget,
}

impl HandlerBoundChangeTarget {
    pub fn new(handler_key: impl Into<String>, target: ChangeTarget) -> Self {
        Self {
            handler_key: handler_key.into(),
            target,
        }
    }
}

/// The "batch of updates" event handed from batching to update processing.
///
/// This is the message body of the batch dispatch transport. It must
/// round-trip through [`BatchOfUpdates::encode`] / [`BatchOfUpdates::decode`]
/// without loss of class names, ids, handler keys or metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOfUpdates {
    /// Suffix appended to each handler's index name (`""` for live writes).
    pub index_suffix: String,
    pub items: Vec<HandlerBoundChangeTarget>,
}

impl BatchOfUpdates {
    pub fn new(index_suffix: impl Into<String>, items: Vec<HandlerBoundChangeTarget>) -> Self {
        Self {
            index_suffix: index_suffix.into(),
            items,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Serialize the batch to a JSON message body.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize a batch from a JSON message body.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ids::single_id;
    use serde_json::json;

    #[test]
    fn test_upsert_notification_with_unknown_properties() {
        let notification = ChangeNotification::upsert("Blog", single_id("id", 1));

        assert_eq!(notification.kind, ChangeKind::Upsert);
        assert!(notification.changed_properties.is_none());
        assert!(!notification.is_delete());
    }

    #[test]
    fn test_changed_properties_builder() {
        let notification = ChangeNotification::upsert("Blog", single_id("id", 1))
            .with_changed_properties(["title", "body"]);

        let changed = notification.changed_properties.unwrap();
        assert!(changed.contains("title"));
        assert!(changed.contains("body"));
    }

    #[test]
    fn test_notification_deserializes_without_optional_fields() {
        let notification: ChangeNotification = serde_json::from_value(json!({
            "kind": "upsert",
            "entity_class": "Blog",
            "ids": {"id": 1}
        }))
        .unwrap();

        assert_eq!(notification.entity_class, "Blog");
        assert!(notification.changed_properties.is_none());
        assert!(notification.metadata.is_empty());
    }

    #[test]
    fn test_resolved_object_only_applies_to_updates() {
        let mut update = ChangeTarget::for_update("Blog", single_id("id", 1));
        assert!(update.is_unresolved());
        update.set_resolved_object(json!({"id": 1, "title": "T"}));
        assert!(!update.is_unresolved());
        assert_eq!(update.resolved_object().unwrap()["title"], "T");

        let mut delete = ChangeTarget::for_delete("Blog", single_id("id", 1));
        delete.set_resolved_object(json!({"id": 1}));
        assert!(delete.resolved_object().is_none());
        assert!(!delete.is_unresolved());
    }

    #[test]
    fn test_batch_round_trip_keeps_keys_ids_and_metadata() {
        let mut metadata = Metadata::new();
        metadata.insert("snapshot".to_string(), json!({"title": "Gone"}));

        let mut resolved = ChangeTarget::for_update("Comment", single_id("id", 9));
        resolved.set_resolved_object(json!({"id": 9}));

        let batch = BatchOfUpdates::new(
            "_new",
            vec![
                HandlerBoundChangeTarget::new("comment", resolved),
                HandlerBoundChangeTarget::new(
                    "blog",
                    ChangeTarget::for_delete("Blog", single_id("id", "a-1"))
                        .with_metadata_map(metadata.clone()),
                ),
            ],
        );

        let decoded = BatchOfUpdates::decode(&batch.encode().unwrap()).unwrap();

        assert_eq!(decoded.index_suffix, "_new");
        assert_eq!(decoded.items[0].handler_key, "comment");
        assert_eq!(decoded.items[0].target.target_class(), "Comment");
        assert_eq!(decoded.items[0].target.ids(), &single_id("id", 9));
        // Resolved rows are reloaded by the consumer, never shipped.
        assert!(decoded.items[0].target.is_unresolved());
        assert_eq!(decoded.items[1].target.metadata(), &metadata);
        assert!(decoded.items[1].target.is_delete());
    }
}
