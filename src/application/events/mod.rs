//! Domain event fan-out.

mod dispatcher;

pub use dispatcher::{
    EventDispatcher, EventHandler, InMemoryEventDispatcher, SubscriptionId,
};

#[cfg(test)]
pub use dispatcher::{MockEventDispatcher, MockEventHandler};
