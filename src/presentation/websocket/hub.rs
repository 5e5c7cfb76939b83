//! Realtime Hub
//!
//! Owns the client registry, the channel subscriber index and the presence
//! table. Every mutation and every fan-out happens while holding one lock,
//! so per-channel delivery order matches call order.
//!
//! Delivery never blocks: each recipient gets a `try_send` onto its bounded
//! buffer. A recipient whose buffer is full (or already closed) is queued
//! for eviction and removed once the fan-out loop finishes, still inside the
//! same critical section. Removing a client announces its offline presence,
//! which can surface further evictions; the queue is drained until empty.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use super::client::{ClientHandle, ClientId};
use super::messages::{
    encode, BroadcastMessage, EventEnvelope, Frame, ReadReceiptEvent, TypingEvent,
};
use crate::application::events::EventHandler;
use crate::domain::{ChatEvent, PresenceRecord};
use crate::infrastructure::metrics;
use crate::shared::error::AppError;

/// Outcome of one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Frames enqueued
    pub delivered: usize,
    /// Clients removed because their buffer could not take the frame
    pub evicted: Vec<ClientId>,
}

#[derive(Debug, Clone, Copy)]
enum Audience {
    Channel {
        channel_id: i64,
        exclude_user: Option<i64>,
    },
    Everyone,
}

struct ClientEntry {
    handle: ClientHandle,
    channels: HashSet<i64>,
}

#[derive(Default)]
struct HubState {
    clients: HashMap<ClientId, ClientEntry>,
    channels: HashMap<i64, HashSet<ClientId>>,
    presence: HashMap<i64, PresenceRecord>,
}

fn try_deliver(
    entry: &ClientEntry,
    frame: &Frame,
    delivered: &mut usize,
    failed: &mut Vec<ClientId>,
) {
    match entry.handle.sender.try_send(frame.clone()) {
        Ok(()) => *delivered += 1,
        Err(TrySendError::Full(_)) => {
            warn!(
                client_id = %entry.handle.id,
                user_id = entry.handle.user_id,
                "Outbound buffer full, evicting client"
            );
            failed.push(entry.handle.id);
        }
        Err(TrySendError::Closed(_)) => {
            debug!(client_id = %entry.handle.id, "Outbound buffer closed, evicting client");
            failed.push(entry.handle.id);
        }
    }
}

impl HubState {
    /// Enqueue `frame` for the audience. Returns the delivered count and the
    /// clients that could not take it.
    fn deliver(&self, audience: Audience, frame: &Frame) -> (usize, Vec<ClientId>) {
        let mut delivered = 0;
        let mut failed = Vec::new();
        match audience {
            Audience::Channel {
                channel_id,
                exclude_user,
            } => {
                let Some(subscribers) = self.channels.get(&channel_id) else {
                    return (0, failed);
                };
                for id in subscribers {
                    let Some(entry) = self.clients.get(id) else {
                        continue;
                    };
                    if exclude_user == Some(entry.handle.user_id) {
                        continue;
                    }
                    try_deliver(entry, frame, &mut delivered, &mut failed);
                }
            }
            Audience::Everyone => {
                for entry in self.clients.values() {
                    try_deliver(entry, frame, &mut delivered, &mut failed);
                }
            }
        }
        (delivered, failed)
    }

    /// Drop a client from the registry and every channel it joined. Dropping
    /// the entry closes its outbound buffer. Returns its user id.
    fn remove_client(&mut self, id: ClientId) -> Option<i64> {
        let entry = self.clients.remove(&id)?;
        for channel_id in &entry.channels {
            if let Some(subscribers) = self.channels.get_mut(channel_id) {
                subscribers.remove(&id);
                if subscribers.is_empty() {
                    self.channels.remove(channel_id);
                }
            }
        }
        Some(entry.handle.user_id)
    }

    /// Record a presence change and announce it to every client.
    fn announce_presence(&mut self, record: PresenceRecord) -> (usize, Vec<ClientId>) {
        let frame = encode(&EventEnvelope::new("presence", &record));
        self.presence.insert(record.user_id, record);
        match frame {
            Ok(frame) => self.deliver(Audience::Everyone, &frame),
            Err(e) => {
                warn!(error = %e, "Failed to encode presence frame");
                (0, Vec::new())
            }
        }
    }

    fn drain_evictions(&mut self, failed: Vec<ClientId>, report: &mut DeliveryReport) {
        let mut queue: VecDeque<ClientId> = failed.into();
        while let Some(id) = queue.pop_front() {
            let Some(user_id) = self.remove_client(id) else {
                continue;
            };
            metrics::record_eviction();
            report.evicted.push(id);
            let (_, more) = self.announce_presence(PresenceRecord::offline(user_id));
            queue.extend(more);
        }
        if !report.evicted.is_empty() {
            metrics::set_realtime_clients(self.clients.len());
        }
    }
}

/// Registry and fan-out point for every connected client.
pub struct Hub {
    state: Mutex<HubState>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HubState::default()),
        }
    }

    /// Add a client and announce its user as online. Registering an id that
    /// is already present does nothing and returns `false`.
    pub fn register(&self, client: ClientHandle) -> bool {
        let mut state = self.state.lock();
        if state.clients.contains_key(&client.id) {
            return false;
        }

        let (id, user_id) = (client.id, client.user_id);
        state.clients.insert(
            id,
            ClientEntry {
                handle: client,
                channels: HashSet::new(),
            },
        );
        info!(client_id = %id, user_id, "Client registered");

        let (_, failed) = state.announce_presence(PresenceRecord::online(user_id));
        let mut report = DeliveryReport::default();
        state.drain_evictions(failed, &mut report);
        metrics::set_realtime_clients(state.clients.len());
        true
    }

    /// Remove a client, close its buffer and announce its user as offline.
    /// Returns `false` when the client was already gone.
    pub fn unregister(&self, client_id: ClientId) -> bool {
        let mut state = self.state.lock();
        let Some(user_id) = state.remove_client(client_id) else {
            return false;
        };
        info!(client_id = %client_id, user_id, "Client unregistered");

        let (_, failed) = state.announce_presence(PresenceRecord::offline(user_id));
        let mut report = DeliveryReport::default();
        state.drain_evictions(failed, &mut report);
        metrics::set_realtime_clients(state.clients.len());
        true
    }

    /// Subscribe a registered client to a channel. Returns whether the
    /// subscription was added.
    pub fn subscribe(&self, client_id: ClientId, channel_id: i64) -> bool {
        let mut state = self.state.lock();
        let Some(entry) = state.clients.get_mut(&client_id) else {
            return false;
        };
        if !entry.channels.insert(channel_id) {
            return false;
        }
        state.channels.entry(channel_id).or_default().insert(client_id);
        debug!(client_id = %client_id, channel_id, "Subscribed");
        true
    }

    pub fn unsubscribe(&self, client_id: ClientId, channel_id: i64) -> bool {
        let mut state = self.state.lock();
        let removed = state
            .clients
            .get_mut(&client_id)
            .is_some_and(|entry| entry.channels.remove(&channel_id));
        if removed {
            if let Some(subscribers) = state.channels.get_mut(&channel_id) {
                subscribers.remove(&client_id);
                if subscribers.is_empty() {
                    state.channels.remove(&channel_id);
                }
            }
            debug!(client_id = %client_id, channel_id, "Unsubscribed");
        }
        removed
    }

    /// Deliver a message to every subscriber of its channel.
    pub fn broadcast(&self, message: &BroadcastMessage) -> DeliveryReport {
        self.publish(
            Audience::Channel {
                channel_id: message.channel_id,
                exclude_user: None,
            },
            &message.event_type,
            message,
        )
    }

    /// Record a presence change and deliver it to every connected client.
    pub fn presence_update(&self, record: PresenceRecord) -> DeliveryReport {
        let mut state = self.state.lock();
        let (delivered, failed) = state.announce_presence(record);
        let mut report = DeliveryReport {
            delivered,
            evicted: Vec::new(),
        };
        state.drain_evictions(failed, &mut report);
        metrics::record_deliveries("presence", delivered);
        report
    }

    /// Typing indicators skip the typing user's own clients.
    pub fn typing(&self, event: TypingEvent) -> DeliveryReport {
        self.publish(
            Audience::Channel {
                channel_id: event.channel_id,
                exclude_user: Some(event.user_id),
            },
            "typing",
            &EventEnvelope::new("typing", &event),
        )
    }

    pub fn read_receipt(&self, event: ReadReceiptEvent) -> DeliveryReport {
        self.publish(
            Audience::Channel {
                channel_id: event.channel_id,
                exclude_user: None,
            },
            "read_receipt",
            &EventEnvelope::new("read_receipt", &event),
        )
    }

    fn publish<T: Serialize>(
        &self,
        audience: Audience,
        event: &str,
        envelope: &T,
    ) -> DeliveryReport {
        let frame = match encode(envelope) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(event, error = %e, "Failed to encode outbound frame, dropping");
                return DeliveryReport::default();
            }
        };

        let mut state = self.state.lock();
        let (delivered, failed) = state.deliver(audience, &frame);
        let mut report = DeliveryReport {
            delivered,
            evicted: Vec::new(),
        };
        state.drain_evictions(failed, &mut report);
        drop(state);

        metrics::record_deliveries(event, delivered);
        report
    }

    pub fn client_count(&self) -> usize {
        self.state.lock().clients.len()
    }

    pub fn subscriber_count(&self, channel_id: i64) -> usize {
        self.state
            .lock()
            .channels
            .get(&channel_id)
            .map_or(0, HashSet::len)
    }

    pub fn is_subscribed(&self, client_id: ClientId, channel_id: i64) -> bool {
        self.state
            .lock()
            .channels
            .get(&channel_id)
            .is_some_and(|subscribers| subscribers.contains(&client_id))
    }

    /// Channels a client is subscribed to, ascending.
    pub fn client_channels(&self, client_id: ClientId) -> Vec<i64> {
        let state = self.state.lock();
        let mut channels: Vec<i64> = state
            .clients
            .get(&client_id)
            .map(|entry| entry.channels.iter().copied().collect())
            .unwrap_or_default();
        channels.sort_unstable();
        channels
    }

    pub fn presence(&self, user_id: i64) -> Option<PresenceRecord> {
        self.state.lock().presence.get(&user_id).cloned()
    }

    /// Users whose latest presence is online, ascending.
    pub fn online_users(&self) -> Vec<i64> {
        let state = self.state.lock();
        let mut users: Vec<i64> = state
            .presence
            .values()
            .filter(|record| record.is_online())
            .map(|record| record.user_id)
            .collect();
        users.sort_unstable();
        users
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventHandler for Hub {
    fn name(&self) -> &'static str {
        "hub"
    }

    async fn handle(&self, event: &ChatEvent) -> Result<(), AppError> {
        let event_type = event.event_type();
        let data = event
            .payload()
            .map_err(|e| AppError::Internal(format!("Cannot encode {}: {}", event_type, e)))?;

        let report = if event.is_read_receipt() {
            self.publish(
                Audience::Channel {
                    channel_id: event.channel_id(),
                    exclude_user: None,
                },
                event_type,
                &EventEnvelope::new(event_type, data),
            )
        } else {
            self.broadcast(&BroadcastMessage::new(event_type, event.channel_id(), data))
        };

        debug!(
            event = event_type,
            channel_id = event.channel_id(),
            delivered = report.delivered,
            evicted = report.evicted.len(),
            "Event fanned out"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::MessageRead;
    use crate::domain::{Message, PresenceStatus};
    use crate::presentation::websocket::client::ConnectionInfo;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    fn client(user_id: i64, buffer: usize) -> (ClientHandle, mpsc::Receiver<Frame>) {
        ClientHandle::new(user_id, ConnectionInfo::default(), buffer)
    }

    fn drain(rx: &mut mpsc::Receiver<Frame>) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(serde_json::from_str(&frame).unwrap());
        }
        frames
    }

    fn types(frames: &[Value]) -> Vec<String> {
        frames
            .iter()
            .map(|f| f["type"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn test_broadcast_reaches_only_subscribers() {
        let hub = Hub::new();
        let (a, mut rx_a) = client(1, 16);
        let (b, mut rx_b) = client(2, 16);
        let (c, mut rx_c) = client(3, 16);
        let (id_a, id_b, id_c) = (a.id, b.id, c.id);
        for handle in [a, b, c] {
            hub.register(handle);
        }
        hub.subscribe(id_a, 7);
        hub.subscribe(id_b, 7);
        hub.subscribe(id_c, 8);
        for rx in [&mut rx_a, &mut rx_b, &mut rx_c] {
            drain(rx);
        }

        let report = hub.broadcast(&BroadcastMessage::new("message_created", 7, json!({"id": 1})));

        assert_eq!(report.delivered, 2);
        assert!(report.evicted.is_empty());
        assert_eq!(drain(&mut rx_a)[0]["channelId"], 7);
        assert_eq!(drain(&mut rx_b).len(), 1);
        assert!(drain(&mut rx_c).is_empty());
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let hub = Hub::new();
        let (a, _rx) = client(1, 16);
        let id = a.id;
        hub.register(a);
        hub.subscribe(id, 7);

        assert!(hub.unregister(id));
        assert!(!hub.unregister(id));
        assert_eq!(hub.client_count(), 0);
        assert_eq!(hub.subscriber_count(7), 0);
        assert_eq!(hub.presence(1).unwrap().status, PresenceStatus::Offline);
    }

    #[test]
    fn test_register_twice_is_noop() {
        let hub = Hub::new();
        let (a, _rx) = client(1, 16);
        let duplicate = ClientHandle {
            id: a.id,
            user_id: 1,
            info: ConnectionInfo::default(),
            sender: a.sender.clone(),
        };
        assert!(hub.register(a));
        assert!(!hub.register(duplicate));
        assert_eq!(hub.client_count(), 1);
    }

    #[test]
    fn test_full_buffer_evicts_without_blocking_others() {
        let hub = Hub::new();
        let (slow, mut rx_slow) = client(1, 1);
        let (fast, mut rx_fast) = client(2, 16);
        let (slow_id, fast_id) = (slow.id, fast.id);
        // One-slot buffer: drain after each presence announcement.
        hub.register(slow);
        drain(&mut rx_slow);
        hub.register(fast);
        drain(&mut rx_slow);
        drain(&mut rx_fast);
        hub.subscribe(slow_id, 7);
        hub.subscribe(fast_id, 7);

        let first = hub.broadcast(&BroadcastMessage::new("message_created", 7, json!(1)));
        let second = hub.broadcast(&BroadcastMessage::new("message_created", 7, json!(2)));

        assert_eq!(first.delivered, 2);
        assert_eq!(second.delivered, 1);
        assert_eq!(second.evicted, vec![slow_id]);
        assert!(!hub.is_subscribed(slow_id, 7));
        assert_eq!(hub.client_count(), 1);

        // Fast client saw both messages plus the slow user's offline presence.
        let frames = drain(&mut rx_fast);
        assert_eq!(
            types(&frames),
            vec!["message_created", "message_created", "presence"]
        );
        assert_eq!(frames[2]["data"]["status"], "offline");

        // The evicted buffer is closed after its queued frame.
        assert_eq!(drain(&mut rx_slow).len(), 1);
        assert!(rx_slow.try_recv().is_err());
    }

    #[test]
    fn test_subscription_index_matches_client_channels() {
        let hub = Hub::new();
        let (a, _rx) = client(1, 16);
        let id = a.id;
        hub.register(a);

        assert!(hub.subscribe(id, 7));
        assert!(!hub.subscribe(id, 7));
        assert!(hub.subscribe(id, 9));
        assert_eq!(hub.client_channels(id), vec![7, 9]);
        assert_eq!(hub.subscriber_count(7), 1);

        assert!(hub.unsubscribe(id, 7));
        assert!(!hub.unsubscribe(id, 7));
        assert_eq!(hub.client_channels(id), vec![9]);
        assert_eq!(hub.subscriber_count(7), 0);
        assert!(!hub.subscribe(uuid::Uuid::new_v4(), 7));
    }

    #[test]
    fn test_presence_goes_to_everyone() {
        let hub = Hub::new();
        let (a, mut rx_a) = client(1, 16);
        let (b, mut rx_b) = client(2, 16);
        hub.register(a);
        hub.register(b);
        drain(&mut rx_a);
        drain(&mut rx_b);

        let report = hub.presence_update(PresenceRecord::offline(1));

        assert_eq!(report.delivered, 2);
        assert_eq!(drain(&mut rx_b)[0]["data"]["userId"], 1);
        assert_eq!(hub.online_users(), vec![2]);
    }

    #[test]
    fn test_typing_skips_author() {
        let hub = Hub::new();
        let (a, mut rx_a) = client(1, 16);
        let (a2, mut rx_a2) = client(1, 16);
        let (b, mut rx_b) = client(2, 16);
        let ids = [a.id, a2.id, b.id];
        for handle in [a, a2, b] {
            hub.register(handle);
        }
        for id in ids {
            hub.subscribe(id, 7);
        }
        for rx in [&mut rx_a, &mut rx_a2, &mut rx_b] {
            drain(rx);
        }

        let report = hub.typing(TypingEvent {
            channel_id: 7,
            user_id: 1,
            typing: true,
        });

        assert_eq!(report.delivered, 1);
        assert!(drain(&mut rx_a).is_empty());
        assert!(drain(&mut rx_a2).is_empty());
        let frames = drain(&mut rx_b);
        assert_eq!(
            frames[0],
            json!({"type": "typing", "data": {"channelId": 7, "userId": 1, "typing": true}})
        );
    }

    #[tokio::test]
    async fn test_dispatched_events_become_envelopes() {
        let hub = Hub::new();
        let (a, mut rx) = client(2, 16);
        let id = a.id;
        hub.register(a);
        hub.subscribe(id, 7);
        drain(&mut rx);

        let message = Message {
            id: 10,
            channel_id: 7,
            sender_id: 1,
            content: "hello".into(),
            ..Default::default()
        };
        hub.handle(&ChatEvent::MessagePinned(message)).await.unwrap();
        hub.handle(&ChatEvent::MessageRead(MessageRead {
            channel_id: 7,
            message_id: 10,
            user_id: 3,
            read_at: Utc::now(),
        }))
        .await
        .unwrap();

        let frames = drain(&mut rx);
        assert_eq!(frames[0]["type"], "message_pinned");
        assert_eq!(frames[0]["channelId"], 7);
        assert_eq!(frames[0]["data"]["content"], "hello");
        assert_eq!(frames[1]["type"], "message_read");
        assert!(frames[1].get("channelId").is_none());
        assert_eq!(frames[1]["data"]["messageId"], 10);
    }
}
