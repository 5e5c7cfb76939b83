//! Publish/subscribe dispatcher between the use cases and delivery.
//!
//! Use cases only see [`EventDispatcher`]. Delivery components (the Hub,
//! or anything else interested in domain events) implement
//! [`EventHandler`] and subscribe to an [`InMemoryEventDispatcher`].

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::ChatEvent;
use crate::shared::error::AppError;

/// Handle returned by [`InMemoryEventDispatcher::subscribe`].
pub type SubscriptionId = Uuid;

/// Consumer of dispatched domain events.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &ChatEvent) -> Result<(), AppError>;
}

/// Publisher side used by the use-case layer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    /// Deliver `event` to every current subscriber. Handler failures are
    /// logged and never reach the publisher.
    async fn dispatch(&self, event: ChatEvent);
}

/// Dispatcher fanning out to handlers in subscription order.
#[derive(Default)]
pub struct InMemoryEventDispatcher {
    handlers: RwLock<Vec<(SubscriptionId, Arc<dyn EventHandler>)>>,
}

impl InMemoryEventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        let id = Uuid::new_v4();
        debug!(handler = handler.name(), subscription = %id, "Event handler subscribed");
        self.handlers.write().push((id, handler));
        id
    }

    /// Returns false when the subscription was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(sub, _)| *sub != id);
        handlers.len() != before
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }
}

#[async_trait]
impl EventDispatcher for InMemoryEventDispatcher {
    async fn dispatch(&self, event: ChatEvent) {
        // Snapshot so the lock is not held across handler awaits.
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .handlers
            .read()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();

        debug!(
            event = event.event_type(),
            channel_id = event.channel_id(),
            handlers = handlers.len(),
            "Dispatching event"
        );

        for handler in handlers {
            if let Err(e) = handler.handle(&event).await {
                warn!(
                    handler = handler.name(),
                    event = event.event_type(),
                    error = %e,
                    "Event handler failed"
                );
            }
        }
    }
}

impl std::fmt::Debug for InMemoryEventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventDispatcher")
            .field("handlers", &self.handler_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::MessageDeleted;

    fn event() -> ChatEvent {
        ChatEvent::MessageDeleted(MessageDeleted {
            message_id: 1,
            channel_id: 7,
            thread_id: None,
        })
    }

    fn handler(times: usize) -> MockEventHandler {
        let mut handler = MockEventHandler::new();
        handler.expect_name().return_const("test");
        handler.expect_handle().times(times).returning(|_| Ok(()));
        handler
    }

    #[tokio::test]
    async fn test_dispatch_reaches_every_subscriber() {
        let dispatcher = InMemoryEventDispatcher::new();
        dispatcher.subscribe(Arc::new(handler(1)));
        dispatcher.subscribe(Arc::new(handler(1)));

        dispatcher.dispatch(event()).await;
    }

    #[tokio::test]
    async fn test_unsubscribed_handler_is_skipped() {
        let dispatcher = InMemoryEventDispatcher::new();
        let id = dispatcher.subscribe(Arc::new(handler(0)));

        assert!(dispatcher.unsubscribe(id));
        assert!(!dispatcher.unsubscribe(id));
        dispatcher.dispatch(event()).await;
        assert_eq!(dispatcher.handler_count(), 0);
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_stop_fanout() {
        let mut failing = MockEventHandler::new();
        failing.expect_name().return_const("failing");
        failing
            .expect_handle()
            .times(1)
            .returning(|_| Err(AppError::Internal("boom".into())));

        let dispatcher = InMemoryEventDispatcher::new();
        dispatcher.subscribe(Arc::new(failing));
        dispatcher.subscribe(Arc::new(handler(1)));

        dispatcher.dispatch(event()).await;
    }
}
