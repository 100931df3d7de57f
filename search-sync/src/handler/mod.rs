//! Search handlers.
//!
//! A handler owns one search index. Every handler declares its index name,
//! mappings and settings; transformable handlers additionally subscribe to
//! entity changes and turn change targets into document actions.

mod subscription;
mod table_handler;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use search_sync_shared::{ChangeTarget, DocumentAction};

use crate::errors::HandlerError;

pub use subscription::{ChangeSubscription, FnTransformer, Transformer};
pub use table_handler::{RelatedRowsTransformer, TableHandler};

/// A registered component owning one search index.
pub trait SearchHandler: Send + Sync {
    /// Stable unique key of the handler.
    fn key(&self) -> &str;

    /// Root alias of the handler's index.
    fn index_name(&self) -> &str;

    /// Entity class whose rows populate the index.
    fn entity_class(&self) -> &str;

    /// Index mappings.
    fn mappings(&self) -> Value;

    /// Index settings, merged over the defaults.
    fn settings(&self) -> Value {
        json!({})
    }

    /// The handler as a transformable handler, if it takes part in the change
    /// pipeline. Handlers that only support raw indexing keep the default.
    fn as_transformable(self: Arc<Self>) -> Option<Arc<dyn TransformableHandler>> {
        None
    }
}

/// A handler that turns change targets into document actions.
#[async_trait]
pub trait TransformableHandler: SearchHandler {
    /// Subscriptions declared by the handler.
    fn subscriptions(&self) -> &[ChangeSubscription];

    /// Load the current row of every unresolved update target.
    ///
    /// Targets whose row no longer exists stay unresolved.
    async fn resolve_objects(&self, targets: &mut [ChangeTarget]) -> Result<(), HandlerError>;

    /// Build the document action for a target; `None` suppresses the target.
    fn transform(&self, target: &ChangeTarget) -> Option<DocumentAction>;
}
