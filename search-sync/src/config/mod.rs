//! Configuration: environment settings, handler definitions and dependency
//! wiring.

mod dependencies;
mod handlers;
mod settings;

pub use dependencies::Dependencies;
pub use handlers::{
    EntityDefinition, HandlerDefinition, HandlersFile, RelatedDefinition, SubscriptionDefinition,
};
pub use settings::{ConnectionMode, Settings};
