//! This module defines the core data structures and types used across the search sync pipeline.
//! It re-exports identifiers, change notifications/targets and document actions.

pub mod change;
pub mod document;
pub mod ids;

pub use change::{
    BatchOfUpdates, ChangeKind, ChangeNotification, ChangeTarget, HandlerBoundChangeTarget,
    Metadata,
};
pub use document::{DocumentAction, IndexAction};
pub use ids::{document_id, single_id, EntityIds, IdValue};
