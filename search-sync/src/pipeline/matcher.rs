//! Subscription matching.
//!
//! Decides which subscriptions a change notification concerns and turns it
//! into handler-bound change targets.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error};

use search_sync_shared::{ChangeNotification, ChangeTarget, HandlerBoundChangeTarget};

use crate::errors::SyncError;
use crate::registry::{HandlerBoundSubscription, HandlerRegistry};

/// Matches notifications against the registry's subscriptions.
pub struct SubscriptionMatcher {
    registry: Arc<HandlerRegistry>,
}

impl SubscriptionMatcher {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    /// Match one notification against every subscription of its class.
    pub async fn match_notification(
        &self,
        notification: &ChangeNotification,
    ) -> Result<Vec<HandlerBoundChangeTarget>, SyncError> {
        match_subscriptions(
            notification,
            self.registry.get_subscriptions_grouped_by_class(),
        )
        .await
    }
}

/// Match `notification` against `subscriptions_by_class`.
///
/// Targets are concatenated in subscription order and never deduplicated: two
/// subscriptions producing the same document both emit it, and the bulk write
/// keeps the last one.
///
/// # Returns
///
/// * `Ok(targets)` - Possibly empty when nothing is subscribed or nothing matched
/// * `Err(SyncError::Transform)` - A transformer failed; the whole notification
///   is abandoned
pub async fn match_subscriptions(
    notification: &ChangeNotification,
    subscriptions_by_class: &HashMap<String, Vec<HandlerBoundSubscription>>,
) -> Result<Vec<HandlerBoundChangeTarget>, SyncError> {
    let Some(subscriptions) = subscriptions_by_class.get(&notification.entity_class) else {
        return Ok(Vec::new());
    };

    let mut targets = Vec::new();
    for bound in subscriptions {
        let subscription = &bound.subscription;
        if !subscription.should_notify(notification) {
            continue;
        }

        match subscription.transformer() {
            None => {
                targets.push(HandlerBoundChangeTarget::new(
                    bound.handler_key.clone(),
                    passthrough_target(notification),
                ));
            }
            Some(transformer) => {
                let derived = transformer.transform(notification).await.map_err(|e| {
                    error!(
                        handler = %bound.handler_key,
                        entity_class = %notification.entity_class,
                        error = %e,
                        "Subscription transform failed"
                    );
                    SyncError::Transform {
                        handler_key: bound.handler_key.clone(),
                        entity_class: notification.entity_class.clone(),
                        source: e,
                    }
                })?;
                targets.extend(
                    derived
                        .into_iter()
                        .map(|target| HandlerBoundChangeTarget::new(bound.handler_key.clone(), target)),
                );
            }
        }
    }

    debug!(
        entity_class = %notification.entity_class,
        target_count = targets.len(),
        "Matched notification"
    );

    Ok(targets)
}

/// Same-entity target for subscriptions without a transformer.
fn passthrough_target(notification: &ChangeNotification) -> ChangeTarget {
    let target = if notification.is_delete() {
        ChangeTarget::for_delete(notification.entity_class.clone(), notification.ids.clone())
    } else {
        ChangeTarget::for_update(notification.entity_class.clone(), notification.ids.clone())
    };
    target.with_metadata_map(notification.metadata.clone())
}
