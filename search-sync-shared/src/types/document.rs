//! Document action types for the search index.
//!
//! Handlers turn change targets into document actions; the update processor
//! pairs each action with its destination index before the bulk write.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A write to perform against a single document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DocumentAction {
    /// Index (create or fully replace) the document.
    Update { document_id: String, document: Value },
    /// Remove the document. Missing documents are not an error.
    Delete { document_id: String },
}

impl DocumentAction {
    pub fn update(document_id: impl Into<String>, document: Value) -> Self {
        DocumentAction::Update {
            document_id: document_id.into(),
            document,
        }
    }

    pub fn delete(document_id: impl Into<String>) -> Self {
        DocumentAction::Delete {
            document_id: document_id.into(),
        }
    }

    pub fn document_id(&self) -> &str {
        match self {
            DocumentAction::Update { document_id, .. } | DocumentAction::Delete { document_id } => {
                document_id
            }
        }
    }

    /// Bulk operation name for this action.
    pub fn operation(&self) -> &'static str {
        match self {
            DocumentAction::Update { .. } => "index",
            DocumentAction::Delete { .. } => "delete",
        }
    }
}

/// A document action paired with its destination index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexAction {
    pub index_name: String,
    pub action: DocumentAction,
}

impl IndexAction {
    pub fn new(index_name: impl Into<String>, action: DocumentAction) -> Self {
        Self {
            index_name: index_name.into(),
            action,
        }
    }
}
