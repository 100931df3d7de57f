//! Change subscriptions and the transformer strategy.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use search_sync_shared::{ChangeNotification, ChangeTarget};

use crate::errors::HandlerError;

/// Turns one change notification into derived change targets.
///
/// A transformer owns all class and id decisions for the targets it returns,
/// which lets a change of one entity re-index documents of another class.
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Produce the targets affected by `notification`.
    async fn transform(
        &self,
        notification: &ChangeNotification,
    ) -> Result<Vec<ChangeTarget>, HandlerError>;
}

/// Adapter turning a plain closure into a [`Transformer`].
///
/// # Example
///
/// ```
/// use search_sync::handler::{ChangeSubscription, FnTransformer};
/// use search_sync_shared::{single_id, ChangeTarget};
///
/// let subscription = ChangeSubscription::new("Blog").with_transformer(FnTransformer::new(
///     |_notification| Ok(vec![ChangeTarget::for_update("Feed", single_id("id", 1))]),
/// ));
/// assert!(subscription.transformer().is_some());
/// ```
pub struct FnTransformer<F> {
    f: F,
}

impl<F> FnTransformer<F>
where
    F: Fn(&ChangeNotification) -> Result<Vec<ChangeTarget>, HandlerError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Transformer for FnTransformer<F>
where
    F: Fn(&ChangeNotification) -> Result<Vec<ChangeTarget>, HandlerError> + Send + Sync,
{
    async fn transform(
        &self,
        notification: &ChangeNotification,
    ) -> Result<Vec<ChangeTarget>, HandlerError> {
        (self.f)(notification)
    }
}

/// A handler's declared interest in changes of one entity class.
///
/// `properties == None` matches any change; `transformer == None` passes the
/// notification through as a target of the same class and ids.
#[derive(Clone)]
pub struct ChangeSubscription {
    entity_class: String,
    properties: Option<BTreeSet<String>>,
    transformer: Option<Arc<dyn Transformer>>,
}

impl ChangeSubscription {
    /// Subscribe to every change of `entity_class`.
    pub fn new(entity_class: impl Into<String>) -> Self {
        Self {
            entity_class: entity_class.into(),
            properties: None,
            transformer: None,
        }
    }

    /// Only match changes touching at least one of `properties`.
    pub fn with_properties<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.properties = Some(properties.into_iter().map(Into::into).collect());
        self
    }

    /// Derive targets with `transformer` instead of passing the change through.
    pub fn with_transformer(mut self, transformer: impl Transformer + 'static) -> Self {
        self.transformer = Some(Arc::new(transformer));
        self
    }

    pub fn entity_class(&self) -> &str {
        &self.entity_class
    }

    pub fn properties(&self) -> Option<&BTreeSet<String>> {
        self.properties.as_ref()
    }

    pub fn transformer(&self) -> Option<&Arc<dyn Transformer>> {
        self.transformer.as_ref()
    }

    /// Decide whether `notification` concerns this subscription's properties.
    ///
    /// A notification without a changed-property set is treated as touching
    /// everything.
    pub fn should_notify(&self, notification: &ChangeNotification) -> bool {
        match (&self.properties, &notification.changed_properties) {
            (None, _) => true,
            (Some(_), None) => true,
            (Some(wanted), Some(changed)) => !wanted.is_disjoint(changed),
        }
    }
}

impl fmt::Debug for ChangeSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeSubscription")
            .field("entity_class", &self.entity_class)
            .field("properties", &self.properties)
            .field("transformer", &self.transformer.is_some())
            .finish()
    }
}
