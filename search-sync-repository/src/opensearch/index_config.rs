//! Index naming and index body construction.
//!
//! Every handler owns a root alias (its index name). Physical indices are
//! timestamped copies `{alias}_{YYYYmmddHHMMSS}`; a staging alias `{alias}_new`
//! points at the index being populated until it is swapped live.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use crate::errors::SearchIndexError;

/// Suffix of the staging alias.
pub const STAGING_SUFFIX: &str = "_new";

/// Timestamp format used in physical index names.
const INDEX_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Configuration applied to every index created by the indexer.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Default number of primary shards.
    pub number_of_shards: u32,
    /// Default number of replicas.
    pub number_of_replicas: u32,
    /// Keyword field added to every mapping for document-level access control.
    pub access_control_field: Option<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            number_of_shards: 1,
            number_of_replicas: 1,
            access_control_field: None,
        }
    }
}

impl IndexConfig {
    /// Enable access-control augmentation with the given field name.
    pub fn with_access_control_field(mut self, field: impl Into<String>) -> Self {
        self.access_control_field = Some(field.into());
        self
    }

    /// Build the create-index body for a handler.
    ///
    /// Handler settings override the defaults key by key. When an access-control
    /// field is configured, the mapping must have exactly one root key,
    /// `properties`, holding an object; anything else is rejected before the
    /// index is created.
    ///
    /// # Arguments
    ///
    /// * `index` - Index (alias) name, used for error reporting
    /// * `settings` - Handler settings (`{}` or `null` for defaults)
    /// * `mappings` - Handler mappings
    pub fn build_index_body(
        &self,
        index: &str,
        settings: &Value,
        mappings: &Value,
    ) -> Result<Value, SearchIndexError> {
        let mut merged = Map::new();
        merged.insert("number_of_shards".to_string(), json!(self.number_of_shards));
        merged.insert(
            "number_of_replicas".to_string(),
            json!(self.number_of_replicas),
        );
        match settings {
            Value::Null => {}
            Value::Object(handler_settings) => {
                for (key, value) in handler_settings {
                    merged.insert(key.clone(), value.clone());
                }
            }
            _ => {
                return Err(SearchIndexError::validation(format!(
                    "Settings for index '{}' must be an object",
                    index
                )))
            }
        }

        let mappings = match &self.access_control_field {
            Some(field) => augment_with_access_control(index, mappings, field)?,
            None => mappings.clone(),
        };

        Ok(json!({
            "settings": Value::Object(merged),
            "mappings": mappings
        }))
    }
}

/// Add a keyword access-control field to a mapping.
fn augment_with_access_control(
    index: &str,
    mappings: &Value,
    field: &str,
) -> Result<Value, SearchIndexError> {
    let root = mappings
        .as_object()
        .ok_or_else(|| SearchIndexError::malformed_mapping(index, "mapping is not an object"))?;

    if root.len() != 1 {
        return Err(SearchIndexError::malformed_mapping(
            index,
            format!("expected a single root key, found {}", root.len()),
        ));
    }

    let properties = root
        .get("properties")
        .and_then(Value::as_object)
        .ok_or_else(|| {
            SearchIndexError::malformed_mapping(index, "root key must be an object named 'properties'")
        })?;

    let mut properties = properties.clone();
    properties.insert(field.to_string(), json!({ "type": "keyword" }));

    Ok(json!({ "properties": properties }))
}

/// Name of a new physical index for `alias` created at `at`.
///
/// # Example
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use search_sync_repository::opensearch::timestamped_index_name;
///
/// let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
/// assert_eq!(timestamped_index_name("blog", at), "blog_20240301123005");
/// ```
pub fn timestamped_index_name(alias: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}", alias, at.format(INDEX_TIMESTAMP_FORMAT))
}

/// Name of the staging alias of `alias`.
pub fn staging_alias(alias: &str) -> String {
    format!("{}{}", alias, STAGING_SUFFIX)
}

/// Wildcard pattern matching every physical index of `alias`.
pub fn index_pattern(alias: &str) -> String {
    format!("{}_*", alias)
}

/// Returns true if `index` is a timestamped physical index of `alias`.
///
/// `blog_*` also matches indices of a `blog_post` handler, so the suffix must
/// be exactly one timestamp.
pub fn is_physical_index_of(alias: &str, index: &str) -> bool {
    index
        .strip_prefix(alias)
        .and_then(|rest| rest.strip_prefix('_'))
        .map(|stamp| stamp.len() == 14 && stamp.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blog_mappings() -> Value {
        json!({
            "properties": {
                "title": { "type": "text" },
                "body": { "type": "text" }
            }
        })
    }

    #[test]
    fn test_index_body_structure() {
        let body = IndexConfig::default()
            .build_index_body("blog", &json!({}), &blog_mappings())
            .unwrap();

        assert_eq!(body["settings"]["number_of_shards"], 1);
        assert_eq!(body["settings"]["number_of_replicas"], 1);
        assert_eq!(body["mappings"]["properties"]["title"]["type"], "text");
    }

    #[test]
    fn test_handler_settings_override_defaults() {
        let body = IndexConfig::default()
            .build_index_body(
                "blog",
                &json!({ "number_of_replicas": 0, "refresh_interval": "30s" }),
                &blog_mappings(),
            )
            .unwrap();

        assert_eq!(body["settings"]["number_of_shards"], 1);
        assert_eq!(body["settings"]["number_of_replicas"], 0);
        assert_eq!(body["settings"]["refresh_interval"], "30s");
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let result = IndexConfig::default().build_index_body("blog", &json!([1]), &blog_mappings());
        assert!(matches!(result, Err(SearchIndexError::ValidationError(_))));
    }

    #[test]
    fn test_access_control_field_added() {
        let body = IndexConfig::default()
            .with_access_control_field("_acl")
            .build_index_body("blog", &Value::Null, &blog_mappings())
            .unwrap();

        assert_eq!(body["mappings"]["properties"]["_acl"]["type"], "keyword");
        assert_eq!(body["mappings"]["properties"]["title"]["type"], "text");
    }

    #[test]
    fn test_access_control_rejects_multiple_root_keys() {
        let mappings = json!({
            "properties": { "title": { "type": "text" } },
            "dynamic": "strict"
        });

        let result = IndexConfig::default()
            .with_access_control_field("_acl")
            .build_index_body("blog", &json!({}), &mappings);

        assert!(matches!(
            result,
            Err(SearchIndexError::MalformedMapping { ref index, .. }) if index == "blog"
        ));
    }

    #[test]
    fn test_access_control_rejects_wrong_root_key() {
        let mappings = json!({ "doc": { "properties": {} } });

        let result = IndexConfig::default()
            .with_access_control_field("_acl")
            .build_index_body("blog", &json!({}), &mappings);

        assert!(matches!(
            result,
            Err(SearchIndexError::MalformedMapping { .. })
        ));
    }

    #[test]
    fn test_mapping_shape_not_checked_without_access_control() {
        let mappings = json!({ "dynamic": "strict", "properties": {} });
        assert!(IndexConfig::default()
            .build_index_body("blog", &json!({}), &mappings)
            .is_ok());
    }

    #[test]
    fn test_naming() {
        assert_eq!(staging_alias("blog"), "blog_new");
        assert_eq!(index_pattern("blog"), "blog_*");
    }

    #[test]
    fn test_is_physical_index_of() {
        assert!(is_physical_index_of("blog", "blog_20240301123005"));
        assert!(!is_physical_index_of("blog", "blog_post_20240301123005"));
        assert!(!is_physical_index_of("blog", "blog_new"));
        assert!(!is_physical_index_of("blog", "blog"));
    }
}
