//! # Search Sync Shared
//!
//! This crate defines shared data structures used across the search sync workspace:
//! entity identifiers, change notifications, change targets, batches of updates and
//! the document actions sent to the search backend.

pub mod types;

pub use types::{
    document_id, single_id, BatchOfUpdates, ChangeKind, ChangeNotification, ChangeTarget,
    DocumentAction, EntityIds, HandlerBoundChangeTarget, IdValue, IndexAction, Metadata,
};
