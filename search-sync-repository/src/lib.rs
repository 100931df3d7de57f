//! # Search Sync Repository
//!
//! This crate provides the two boundaries of the search sync pipeline: the
//! search backend (`SearchClient`, implemented for OpenSearch) and the
//! source-of-truth store (`EntityStore`, implemented for PostgreSQL).

pub mod config;
pub mod errors;
pub mod interfaces;
pub mod opensearch;
pub mod postgres;
pub mod types;
pub mod utils;

pub use config::SearchClientConfig;
pub use errors::{EntityStoreError, SearchIndexError};
pub use interfaces::{EntityStore, SearchClient};
pub use opensearch::{IndexConfig, OpenSearchProvider};
pub use postgres::{PostgresEntityStore, TableBinding};
pub use types::{AliasMap, BulkItemError, BulkSummary, StoredEntity};
pub use utils::validate_identifier;
