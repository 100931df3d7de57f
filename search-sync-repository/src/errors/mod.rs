//! Error types for the search sync repository.
//!
//! This module provides the error types of both boundaries: the search backend
//! and the entity store.

mod entity_store_error;
mod search_index_error;

pub use entity_store_error::EntityStoreError;
pub use search_index_error::SearchIndexError;
