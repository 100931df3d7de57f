//! Interface definitions for the search sync boundaries.
//!
//! This module defines the abstract `SearchClient` and `EntityStore` traits that
//! allow for dependency injection and swappable backend implementations.

mod entity_store;
mod search_client;

pub use entity_store::EntityStore;
pub use search_client::SearchClient;
