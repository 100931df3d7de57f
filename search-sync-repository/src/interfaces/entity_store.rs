//! Entity store trait definition.
//!
//! The entity store is the source of truth the search index is synchronized
//! with. The pipeline only reads from it.

use async_trait::async_trait;
use futures::stream::BoxStream;

use search_sync_shared::{EntityIds, IdValue};

use crate::errors::EntityStoreError;
use crate::types::StoredEntity;

/// Read access to the source-of-truth store.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Stream the ids of every row of an entity class.
    ///
    /// The stream is a single forward pass and is not restartable. Ids are
    /// produced as they are read, never collected up front.
    fn iterate_all_ids<'a>(
        &'a self,
        entity_class: &'a str,
    ) -> BoxStream<'a, Result<EntityIds, EntityStoreError>>;

    /// Load the rows matching `ids`.
    ///
    /// Rows that no longer exist are simply absent from the result.
    async fn find_by_ids(
        &self,
        entity_class: &str,
        ids: &[EntityIds],
    ) -> Result<Vec<StoredEntity>, EntityStoreError>;

    /// Ids of the rows whose `property` equals `value`.
    ///
    /// Used to fan a change out to related rows (e.g. every comment of a blog).
    async fn find_ids_by(
        &self,
        entity_class: &str,
        property: &str,
        value: &IdValue,
    ) -> Result<Vec<EntityIds>, EntityStoreError>;
}
