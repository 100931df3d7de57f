//! Request and response types for search backend and entity store operations.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use search_sync_shared::EntityIds;

/// Error descriptor for a single failed item of a bulk request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItemError {
    /// Index the item was written to.
    pub index_name: String,
    /// The document's identifier.
    pub document_id: String,
    /// Bulk operation name (`index` or `delete`).
    pub operation: String,
    /// HTTP status reported for the item.
    pub status: u16,
    /// Error type and reason as reported by the backend.
    pub reason: String,
}

/// Summary of a successful bulk request.
///
/// A bulk request with failing items is reported as
/// `SearchIndexError::BulkFailure` instead, so a summary always means that
/// every action was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BulkSummary {
    /// Number of actions in the request.
    pub total: usize,
    /// Server-side processing time in milliseconds, if reported.
    pub took_ms: Option<u64>,
}

/// Aliases currently defined, keyed by physical index name.
pub type AliasMap = BTreeMap<String, BTreeSet<String>>;

/// Physical indices an alias points to, in name order.
pub fn indices_for_alias(aliases: &AliasMap, alias: &str) -> Vec<String> {
    aliases
        .iter()
        .filter(|(_, names)| names.contains(alias))
        .map(|(index, _)| index.clone())
        .collect()
}

/// Returns true if any alias points to `index`.
pub fn is_referenced(aliases: &AliasMap, index: &str) -> bool {
    aliases.get(index).is_some_and(|names| !names.is_empty())
}

/// A row loaded from the entity store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntity {
    /// Identifier of the row.
    pub ids: EntityIds,
    /// The row as a JSON object.
    pub object: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alias_map() -> AliasMap {
        let mut aliases = AliasMap::new();
        aliases.insert(
            "blog_20240101000000".to_string(),
            BTreeSet::from(["blog".to_string()]),
        );
        aliases.insert(
            "blog_20240201000000".to_string(),
            BTreeSet::from(["blog_new".to_string()]),
        );
        aliases.insert("blog_20230101000000".to_string(), BTreeSet::new());
        aliases
    }

    #[test]
    fn test_indices_for_alias() {
        let aliases = alias_map();
        assert_eq!(
            indices_for_alias(&aliases, "blog_new"),
            vec!["blog_20240201000000".to_string()]
        );
        assert!(indices_for_alias(&aliases, "comment").is_empty());
    }

    #[test]
    fn test_is_referenced() {
        let aliases = alias_map();
        assert!(is_referenced(&aliases, "blog_20240101000000"));
        assert!(!is_referenced(&aliases, "blog_20230101000000"));
        assert!(!is_referenced(&aliases, "unknown"));
    }
}
