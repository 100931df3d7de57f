//! OpenSearch implementation of the search client.
//!
//! This module provides a concrete implementation of `SearchClient`
//! using OpenSearch as the backend, plus index naming and index body helpers.

mod index_config;
mod provider;

pub use index_config::{
    index_pattern, is_physical_index_of, staging_alias, timestamped_index_name, IndexConfig,
    STAGING_SUFFIX,
};
pub use provider::OpenSearchProvider;
