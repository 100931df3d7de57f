//! In-memory search backend and entity store shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{json, Value};

use search_sync::handler::{ChangeSubscription, RelatedRowsTransformer, SearchHandler, TableHandler};
use search_sync::registry::HandlerRegistry;
use search_sync_repository::types::indices_for_alias;
use search_sync_repository::{
    AliasMap, BulkItemError, BulkSummary, EntityStore, EntityStoreError, SearchClient,
    SearchIndexError, StoredEntity,
};
use search_sync_shared::{single_id, DocumentAction, EntityIds, IdValue, IndexAction};

/// Search backend keeping indices, aliases and every bulk request in memory.
#[derive(Default)]
pub struct InMemorySearchClient {
    /// index -> document id -> document
    indices: Mutex<BTreeMap<String, BTreeMap<String, Value>>>,
    aliases: Mutex<AliasMap>,
    bulk_calls: Mutex<Vec<Vec<IndexAction>>>,
    created: Mutex<Vec<(String, Value)>>,
    failing_documents: Mutex<HashSet<String>>,
    transport_failure: Mutex<Option<String>>,
}

impl InMemorySearchClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every bulk request received, in order.
    pub fn bulk_calls(&self) -> Vec<Vec<IndexAction>> {
        self.bulk_calls.lock().unwrap().clone()
    }

    /// Bodies passed to `create_index`.
    pub fn created_indices(&self) -> Vec<(String, Value)> {
        self.created.lock().unwrap().clone()
    }

    /// Current document of `id` in the index behind `name`.
    pub fn document(&self, name: &str, id: &str) -> Option<Value> {
        let index = self.resolve(name);
        self.indices
            .lock()
            .unwrap()
            .get(&index)
            .and_then(|docs| docs.get(id).cloned())
    }

    /// Number of documents in the index behind `name`.
    pub fn document_count(&self, name: &str) -> usize {
        let index = self.resolve(name);
        self.indices
            .lock()
            .unwrap()
            .get(&index)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    pub fn aliases(&self) -> AliasMap {
        self.aliases.lock().unwrap().clone()
    }

    pub fn index_names(&self) -> Vec<String> {
        self.indices.lock().unwrap().keys().cloned().collect()
    }

    /// Create a physical index directly, optionally behind an alias.
    pub fn seed_index(&self, index: &str, alias: Option<&str>) {
        self.indices
            .lock()
            .unwrap()
            .entry(index.to_string())
            .or_default();
        let mut aliases = self.aliases.lock().unwrap();
        let names = aliases.entry(index.to_string()).or_default();
        if let Some(alias) = alias {
            names.insert(alias.to_string());
        }
    }

    /// Make bulk writes of `document_id` fail.
    pub fn fail_document(&self, document_id: &str) {
        self.failing_documents
            .lock()
            .unwrap()
            .insert(document_id.to_string());
    }

    /// Make every bulk request fail as a whole with `reason`.
    pub fn fail_transport(&self, reason: &str) {
        *self.transport_failure.lock().unwrap() = Some(reason.to_string());
    }

    /// Physical index behind `name`, or `name` itself.
    fn resolve(&self, name: &str) -> String {
        let aliases = self.aliases.lock().unwrap();
        indices_for_alias(&aliases, name)
            .into_iter()
            .next()
            .unwrap_or_else(|| name.to_string())
    }
}

#[async_trait]
impl SearchClient for InMemorySearchClient {
    async fn bulk(&self, actions: &[IndexAction]) -> Result<BulkSummary, SearchIndexError> {
        self.bulk_calls.lock().unwrap().push(actions.to_vec());

        if let Some(reason) = self.transport_failure.lock().unwrap().clone() {
            return Err(SearchIndexError::transport(reason));
        }

        let failing = self.failing_documents.lock().unwrap().clone();
        let mut errors = Vec::new();
        for action in actions {
            let document_id = action.action.document_id().to_string();
            if failing.contains(&document_id) {
                errors.push(BulkItemError {
                    index_name: action.index_name.clone(),
                    document_id,
                    operation: action.action.operation().to_string(),
                    status: 400,
                    reason: "mapper_parsing_exception: failed to parse".to_string(),
                });
                continue;
            }

            let index = self.resolve(&action.index_name);
            let mut indices = self.indices.lock().unwrap();
            let docs = indices.entry(index).or_default();
            match &action.action {
                DocumentAction::Update {
                    document_id,
                    document,
                } => {
                    docs.insert(document_id.clone(), document.clone());
                }
                DocumentAction::Delete { document_id } => {
                    docs.remove(document_id);
                }
            }
        }

        if errors.is_empty() {
            Ok(BulkSummary {
                total: actions.len(),
                took_ms: Some(1),
            })
        } else {
            Err(SearchIndexError::bulk_failure(errors))
        }
    }

    async fn create_index(&self, index: &str, body: &Value) -> Result<(), SearchIndexError> {
        let mut indices = self.indices.lock().unwrap();
        if indices.contains_key(index) {
            return Err(SearchIndexError::index_creation(format!(
                "resource_already_exists_exception: {}",
                index
            )));
        }
        indices.insert(index.to_string(), BTreeMap::new());
        self.aliases
            .lock()
            .unwrap()
            .insert(index.to_string(), BTreeSet::new());
        self.created
            .lock()
            .unwrap()
            .push((index.to_string(), body.clone()));
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<(), SearchIndexError> {
        self.indices.lock().unwrap().remove(index);
        self.aliases.lock().unwrap().remove(index);
        Ok(())
    }

    async fn create_alias(&self, index: &str, alias: &str) -> Result<(), SearchIndexError> {
        let mut aliases = self.aliases.lock().unwrap();
        match aliases.get_mut(index) {
            Some(names) => {
                names.insert(alias.to_string());
                Ok(())
            }
            None => Err(SearchIndexError::alias(format!("no such index: {}", index))),
        }
    }

    async fn move_alias(&self, alias: &str, index: &str) -> Result<(), SearchIndexError> {
        let mut aliases = self.aliases.lock().unwrap();
        if !aliases.contains_key(index) {
            return Err(SearchIndexError::alias(format!("no such index: {}", index)));
        }
        for names in aliases.values_mut() {
            names.remove(alias);
        }
        if let Some(names) = aliases.get_mut(index) {
            names.insert(alias.to_string());
        }
        Ok(())
    }

    async fn delete_alias(&self, alias: &str) -> Result<(), SearchIndexError> {
        for names in self.aliases.lock().unwrap().values_mut() {
            names.remove(alias);
        }
        Ok(())
    }

    async fn get_aliases(&self) -> Result<AliasMap, SearchIndexError> {
        Ok(self.aliases())
    }

    async fn get_indices(&self, pattern: &str) -> Result<Vec<String>, SearchIndexError> {
        let prefix = pattern.trim_end_matches('*');
        Ok(self
            .index_names()
            .into_iter()
            .filter(|index| index.starts_with(prefix))
            .collect())
    }

    async fn is_alias(&self, name: &str) -> Result<bool, SearchIndexError> {
        Ok(self
            .aliases
            .lock()
            .unwrap()
            .values()
            .any(|names| names.contains(name)))
    }

    async fn is_index(&self, name: &str) -> Result<bool, SearchIndexError> {
        Ok(self.indices.lock().unwrap().contains_key(name))
    }

    async fn count(&self, index: &str) -> Result<u64, SearchIndexError> {
        Ok(self.document_count(index) as u64)
    }
}

/// Entity store holding rows in memory, keyed by class and `id`.
#[derive(Default)]
pub struct InMemoryEntityStore {
    rows: Mutex<BTreeMap<String, BTreeMap<IdValue, Value>>>,
}

impl InMemoryEntityStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Insert or replace a row; the row's `id` field is its key.
    pub fn put(&self, class: &str, row: Value) {
        let id = IdValue::from_json(&row["id"]).expect("row needs an integer or string id");
        self.rows
            .lock()
            .unwrap()
            .entry(class.to_string())
            .or_default()
            .insert(id, row);
    }

    pub fn remove(&self, class: &str, id: impl Into<IdValue>) {
        if let Some(rows) = self.rows.lock().unwrap().get_mut(class) {
            rows.remove(&id.into());
        }
    }

    fn ids_of(&self, class: &str) -> Vec<IdValue> {
        self.rows
            .lock()
            .unwrap()
            .get(class)
            .map(|rows| rows.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    fn iterate_all_ids<'a>(
        &'a self,
        entity_class: &'a str,
    ) -> BoxStream<'a, Result<EntityIds, EntityStoreError>> {
        stream::iter(
            self.ids_of(entity_class)
                .into_iter()
                .map(|id| Ok(single_id("id", id))),
        )
        .boxed()
    }

    async fn find_by_ids(
        &self,
        entity_class: &str,
        ids: &[EntityIds],
    ) -> Result<Vec<StoredEntity>, EntityStoreError> {
        let rows = self.rows.lock().unwrap();
        let Some(rows) = rows.get(entity_class) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|entity_ids| {
                let row = rows.get(entity_ids.get("id")?)?;
                Some(StoredEntity {
                    ids: entity_ids.clone(),
                    object: row.clone(),
                })
            })
            .collect())
    }

    async fn find_ids_by(
        &self,
        entity_class: &str,
        property: &str,
        value: &IdValue,
    ) -> Result<Vec<EntityIds>, EntityStoreError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .get(entity_class)
            .map(|rows| {
                rows.iter()
                    .filter(|(_, row)| IdValue::from_json(&row[property]).as_ref() == Some(value))
                    .map(|(id, _)| single_id("id", id.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Blog handler indexing `title` and `body` of `Blog` rows into `blog`.
pub fn blog_handler(store: Arc<dyn EntityStore>) -> TableHandler {
    TableHandler::new("blog", "blog", "Blog", store)
        .with_fields(["title", "body"])
        .with_mappings(json!({
            "properties": {
                "title": { "type": "text" },
                "body": { "type": "text" }
            }
        }))
        .with_subscription(ChangeSubscription::new("Blog"))
}

/// Comment handler following its own rows and blog title changes.
pub fn comment_handler(store: Arc<dyn EntityStore>) -> TableHandler {
    TableHandler::new("comment", "comment", "Comment", Arc::clone(&store))
        .with_fields(["text", "blog_id"])
        .with_subscription(ChangeSubscription::new("Comment"))
        .with_subscription(
            ChangeSubscription::new("Blog")
                .with_properties(["title"])
                .with_transformer(RelatedRowsTransformer::new(store, "Comment", "blog_id")),
        )
}

/// Registry with the blog and comment handlers over `store`.
pub fn blog_registry(store: Arc<InMemoryEntityStore>) -> Arc<HandlerRegistry> {
    let store: Arc<dyn EntityStore> = store;
    let handlers: Vec<Arc<dyn SearchHandler>> = vec![
        Arc::new(blog_handler(Arc::clone(&store))),
        Arc::new(comment_handler(store)),
    ];
    Arc::new(HandlerRegistry::new(handlers).unwrap())
}
