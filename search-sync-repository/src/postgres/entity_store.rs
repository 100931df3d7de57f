//! PostgreSQL-backed entity store.
//!
//! Each entity class is bound to one table with a single id column. Rows are
//! read as JSON objects with `to_jsonb`, so handlers see every column without
//! a compile-time schema.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info};

use search_sync_shared::{single_id, EntityIds, IdValue};

use crate::errors::EntityStoreError;
use crate::interfaces::EntityStore;
use crate::types::StoredEntity;
use crate::utils::validate_identifier;

/// Binding of an entity class to its table.
///
/// The SQL statements are built once when the binding is created; table and
/// column names are validated first since they cannot be bound as parameters.
#[derive(Debug, Clone)]
pub struct TableBinding {
    table: String,
    id_column: String,
    select_ids_sql: String,
    select_rows_sql: String,
}

impl TableBinding {
    /// Bind a table whose rows are identified by `id_column`.
    pub fn new(
        table: impl Into<String>,
        id_column: impl Into<String>,
    ) -> Result<Self, EntityStoreError> {
        let table = table.into();
        let id_column = id_column.into();
        validate_identifier(&table).map_err(EntityStoreError::InvalidIdentifier)?;
        validate_identifier(&id_column).map_err(EntityStoreError::InvalidIdentifier)?;

        Ok(Self {
            select_ids_sql: format!(
                "SELECT to_jsonb(t.{id}) FROM {table} t ORDER BY t.{id}",
                id = id_column,
                table = table
            ),
            select_rows_sql: format!(
                "SELECT to_jsonb(t) FROM {table} t WHERE t.{id}::text = ANY($1)",
                id = id_column,
                table = table
            ),
            table,
            id_column,
        })
    }

    /// Table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Id column name.
    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    fn select_ids_by_sql(&self, property: &str) -> Result<String, EntityStoreError> {
        validate_identifier(property).map_err(EntityStoreError::InvalidIdentifier)?;
        Ok(format!(
            "SELECT to_jsonb(t.{id}) FROM {table} t WHERE t.{property}::text = $1 ORDER BY t.{id}",
            id = self.id_column,
            table = self.table,
            property = property
        ))
    }

    fn ids_from_value(&self, value: &Value) -> Result<EntityIds, EntityStoreError> {
        IdValue::from_json(value)
            .map(|id| single_id(self.id_column.clone(), id))
            .ok_or_else(|| {
                EntityStoreError::decode(format!(
                    "Column {}.{} holds an unsupported id value: {}",
                    self.table, self.id_column, value
                ))
            })
    }

    /// Text form of the id column of each requested id set.
    fn id_texts(&self, ids: &[EntityIds]) -> Result<Vec<String>, EntityStoreError> {
        ids.iter()
            .map(|entity_ids| {
                entity_ids
                    .get(&self.id_column)
                    .map(ToString::to_string)
                    .ok_or_else(|| {
                        EntityStoreError::decode(format!(
                            "Ids {:?} do not contain column '{}'",
                            entity_ids, self.id_column
                        ))
                    })
            })
            .collect()
    }
}

/// Entity store reading rows from PostgreSQL tables.
pub struct PostgresEntityStore {
    pool: sqlx::PgPool,
    bindings: HashMap<String, TableBinding>,
}

impl PostgresEntityStore {
    /// Creates a store over an existing pool.
    ///
    /// # Arguments
    ///
    /// * `pool` - PostgreSQL connection pool
    /// * `bindings` - Table binding per entity class
    pub fn new(pool: sqlx::PgPool, bindings: HashMap<String, TableBinding>) -> Self {
        Self { pool, bindings }
    }

    /// Connects to `url` and creates a store.
    ///
    /// # Returns
    ///
    /// * `Ok(PostgresEntityStore)` - Ready-to-use store
    /// * `Err(EntityStoreError)` - If the pool cannot be created
    pub async fn connect(
        url: &str,
        max_connections: u32,
        bindings: HashMap<String, TableBinding>,
    ) -> Result<Self, EntityStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        info!(
            max_connections = max_connections,
            entity_classes = bindings.len(),
            "Connected to entity store"
        );

        Ok(Self::new(pool, bindings))
    }

    fn binding(&self, entity_class: &str) -> Result<&TableBinding, EntityStoreError> {
        self.bindings
            .get(entity_class)
            .ok_or_else(|| EntityStoreError::UnboundEntityClass(entity_class.to_string()))
    }
}

#[async_trait]
impl EntityStore for PostgresEntityStore {
    fn iterate_all_ids<'a>(
        &'a self,
        entity_class: &'a str,
    ) -> BoxStream<'a, Result<EntityIds, EntityStoreError>> {
        let binding = match self.binding(entity_class) {
            Ok(binding) => binding,
            Err(e) => return stream::iter(vec![Err(e)]).boxed(),
        };

        sqlx::query_scalar::<_, Value>(&binding.select_ids_sql)
            .fetch(&self.pool)
            .map(move |row| match row {
                Ok(value) => binding.ids_from_value(&value),
                Err(e) => Err(EntityStoreError::DatabaseError(e)),
            })
            .boxed()
    }

    async fn find_by_ids(
        &self,
        entity_class: &str,
        ids: &[EntityIds],
    ) -> Result<Vec<StoredEntity>, EntityStoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let binding = self.binding(entity_class)?;
        let id_texts = binding.id_texts(ids)?;

        let rows: Vec<Value> = sqlx::query_scalar(&binding.select_rows_sql)
            .bind(&id_texts)
            .fetch_all(&self.pool)
            .await?;

        debug!(
            entity_class = %entity_class,
            requested = ids.len(),
            found = rows.len(),
            "Loaded rows by id"
        );

        rows.into_iter()
            .map(|object| {
                let id = object.get(binding.id_column()).ok_or_else(|| {
                    EntityStoreError::decode(format!(
                        "Row of {} has no column '{}'",
                        binding.table(),
                        binding.id_column()
                    ))
                })?;
                Ok(StoredEntity {
                    ids: binding.ids_from_value(id)?,
                    object,
                })
            })
            .collect()
    }

    async fn find_ids_by(
        &self,
        entity_class: &str,
        property: &str,
        value: &IdValue,
    ) -> Result<Vec<EntityIds>, EntityStoreError> {
        let binding = self.binding(entity_class)?;
        let sql = binding.select_ids_by_sql(property)?;

        let values: Vec<Value> = sqlx::query_scalar(&sql)
            .bind(value.to_string())
            .fetch_all(&self.pool)
            .await?;

        values
            .iter()
            .map(|value| binding.ids_from_value(value))
            .collect()
    }
}
