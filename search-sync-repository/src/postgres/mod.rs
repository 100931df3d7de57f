//! PostgreSQL implementation of the entity store.

mod entity_store;

pub use entity_store::{PostgresEntityStore, TableBinding};
