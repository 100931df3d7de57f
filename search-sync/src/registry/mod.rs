//! Handler registry.
//!
//! The registry is built once at startup from the static list of handlers and
//! is immutable afterwards, so it can be shared between workers through an
//! `Arc` without locking.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::info;

use crate::errors::RegistryError;
use crate::handler::{ChangeSubscription, SearchHandler, TransformableHandler};

/// A subscription paired with the key of the handler that declared it.
#[derive(Debug, Clone)]
pub struct HandlerBoundSubscription {
    pub handler_key: String,
    pub subscription: ChangeSubscription,
}

/// Holds every registered handler.
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn SearchHandler>>,
    transformable: Vec<Arc<dyn TransformableHandler>>,
    by_key: HashMap<String, Arc<dyn TransformableHandler>>,
    raw_keys: HashSet<String>,
    subscriptions_by_class: HashMap<String, Vec<HandlerBoundSubscription>>,
}

impl HandlerRegistry {
    /// Build the registry.
    ///
    /// # Returns
    ///
    /// * `Ok(HandlerRegistry)` - Key index and subscriptions are ready
    /// * `Err(RegistryError::DuplicateHandlerKey)` - Two handlers share a key
    pub fn new(handlers: Vec<Arc<dyn SearchHandler>>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        let mut transformable = Vec::new();
        let mut by_key = HashMap::new();
        let mut raw_keys = HashSet::new();
        let mut subscriptions_by_class: HashMap<String, Vec<HandlerBoundSubscription>> =
            HashMap::new();

        for handler in &handlers {
            let key = handler.key().to_string();
            if !seen.insert(key.clone()) {
                return Err(RegistryError::DuplicateHandlerKey(key));
            }

            match Arc::clone(handler).as_transformable() {
                Some(transformable_handler) => {
                    for subscription in transformable_handler.subscriptions() {
                        subscriptions_by_class
                            .entry(subscription.entity_class().to_string())
                            .or_default()
                            .push(HandlerBoundSubscription {
                                handler_key: key.clone(),
                                subscription: subscription.clone(),
                            });
                    }
                    by_key.insert(key, Arc::clone(&transformable_handler));
                    transformable.push(transformable_handler);
                }
                None => {
                    raw_keys.insert(key);
                }
            }
        }

        info!(
            handlers = handlers.len(),
            transformable = transformable.len(),
            subscribed_classes = subscriptions_by_class.len(),
            "Handler registry built"
        );

        Ok(Self {
            handlers,
            transformable,
            by_key,
            raw_keys,
            subscriptions_by_class,
        })
    }

    /// Every registered handler, in registration order.
    pub fn get_all(&self) -> &[Arc<dyn SearchHandler>] {
        &self.handlers
    }

    /// Handlers taking part in the change pipeline, in registration order.
    pub fn get_transformable_handlers(&self) -> &[Arc<dyn TransformableHandler>] {
        &self.transformable
    }

    /// Subscriptions of all transformable handlers, bucketed by entity class.
    ///
    /// Within a class, subscriptions keep handler registration order and then
    /// declaration order.
    pub fn get_subscriptions_grouped_by_class(
        &self,
    ) -> &HashMap<String, Vec<HandlerBoundSubscription>> {
        &self.subscriptions_by_class
    }

    /// Look a transformable handler up by key.
    pub fn get_transformable_handler_by_key(
        &self,
        key: &str,
    ) -> Result<Arc<dyn TransformableHandler>, RegistryError> {
        if let Some(handler) = self.by_key.get(key) {
            return Ok(Arc::clone(handler));
        }
        if self.raw_keys.contains(key) {
            return Err(RegistryError::HandlerNotTransformable(key.to_string()));
        }
        Err(RegistryError::HandlerNotFound(key.to_string()))
    }
}
