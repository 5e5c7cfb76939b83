//! In-memory repository implementations.
//!
//! A single [`InMemoryStore`] implements every repository trait over one
//! lock-guarded state, mirroring the relational constraints of the
//! PostgreSQL schema (cascading deletes, unique reactions and receipts,
//! owner-as-first-member). Used for single-node runs and tests.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::domain::{
    Attachment, AttachmentRepository, Channel, ChannelRepository, Message, MessageFilter,
    MessageRepository, Reaction, ReactionRepository, ReadReceipt, ReadReceiptRepository,
    SearchPage,
};
use crate::shared::error::AppError;

#[derive(Debug, Default)]
struct State {
    channels: BTreeMap<i64, Channel>,
    members: HashMap<i64, Vec<i64>>,
    /// Pinned index per channel, most recently pinned first
    pins: HashMap<i64, Vec<i64>>,
    messages: BTreeMap<i64, Message>,
    attachments: BTreeMap<i64, Attachment>,
    reactions: BTreeMap<i64, Reaction>,
    receipts: Vec<ReadReceipt>,
}

impl State {
    fn remove_message_cascade(&mut self, id: i64) {
        let Some(message) = self.messages.remove(&id) else {
            return;
        };
        self.attachments.retain(|_, a| a.message_id != id);
        self.reactions.retain(|_, r| r.message_id != id);
        self.receipts.retain(|r| r.message_id != id);
        if let Some(pins) = self.pins.get_mut(&message.channel_id) {
            pins.retain(|m| *m != id);
        }
        for other in self.messages.values_mut() {
            if other.reply_to_id == Some(id) {
                other.reply_to_id = None;
            }
        }
        let replies: Vec<i64> = self
            .messages
            .values()
            .filter(|m| m.thread_id == Some(id))
            .map(|m| m.id)
            .collect();
        for reply in replies {
            self.remove_message_cascade(reply);
        }
    }

    fn matches(&self, message: &Message, filter: &MessageFilter) -> bool {
        if filter.channel_id.is_some_and(|c| c != message.channel_id) {
            return false;
        }
        if filter.sender_id.is_some_and(|s| s != message.sender_id) {
            return false;
        }
        if let Some(query) = filter.query.as_deref().filter(|q| !q.is_empty()) {
            if !message
                .content
                .to_lowercase()
                .contains(&query.to_lowercase())
            {
                return false;
            }
        }
        if filter.after.is_some_and(|t| message.created_at <= t) {
            return false;
        }
        if filter.before.is_some_and(|t| message.created_at >= t) {
            return false;
        }
        if let Some(has) = filter.has_attachments {
            let found = self.attachments.values().any(|a| a.message_id == message.id);
            if found != has {
                return false;
            }
        }
        if filter
            .has_mentions
            .is_some_and(|has| message.mentions.is_empty() == has)
        {
            return false;
        }
        if filter.pinned.is_some_and(|p| p != message.pinned) {
            return false;
        }
        if filter.nsfw.is_some_and(|n| n != message.flags.nsfw) {
            return false;
        }
        if filter.spoiler.is_some_and(|s| s != message.flags.spoiler) {
            return false;
        }
        true
    }
}

/// Newest first, ties broken by id.
fn newest_first(a: &Message, b: &Message) -> std::cmp::Ordering {
    b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
}

fn page<T>(items: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    items
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

/// In-memory implementation of every repository trait.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChannelRepository for InMemoryStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Channel>, AppError> {
        Ok(self.state.read().channels.get(&id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<Channel>, AppError> {
        Ok(self.state.read().channels.values().cloned().collect())
    }

    async fn find_by_user(&self, user_id: i64) -> Result<Vec<Channel>, AppError> {
        let state = self.state.read();
        Ok(state
            .channels
            .values()
            .filter(|c| {
                state
                    .members
                    .get(&c.id)
                    .is_some_and(|m| m.contains(&user_id))
            })
            .cloned()
            .collect())
    }

    async fn create(&self, channel: &Channel) -> Result<Channel, AppError> {
        let mut state = self.state.write();
        if state.channels.contains_key(&channel.id) {
            return Err(AppError::Conflict(
                "Channel with this ID already exists".to_string(),
            ));
        }
        state.channels.insert(channel.id, channel.clone());
        state.members.insert(channel.id, vec![channel.owner_id]);
        Ok(channel.clone())
    }

    async fn update(&self, channel: &Channel) -> Result<Channel, AppError> {
        let mut state = self.state.write();
        let stored = state
            .channels
            .get_mut(&channel.id)
            .ok_or_else(|| AppError::NotFound(format!("Channel {} not found", channel.id)))?;
        stored.name = channel.name.clone();
        stored.description = channel.description.clone();
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete(&self, id: i64, owner_id: i64) -> Result<Option<Channel>, AppError> {
        let mut state = self.state.write();
        if !state.channels.get(&id).is_some_and(|c| c.owner_id == owner_id) {
            return Ok(None);
        }
        let removed = state.channels.remove(&id);
        state.members.remove(&id);
        state.pins.remove(&id);
        let messages: Vec<i64> = state
            .messages
            .values()
            .filter(|m| m.channel_id == id)
            .map(|m| m.id)
            .collect();
        for message_id in messages {
            state.remove_message_cascade(message_id);
        }
        Ok(removed)
    }

    async fn members(&self, channel_id: i64) -> Result<Vec<i64>, AppError> {
        Ok(self
            .state
            .read()
            .members
            .get(&channel_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn is_member(&self, channel_id: i64, user_id: i64) -> Result<bool, AppError> {
        Ok(self
            .state
            .read()
            .members
            .get(&channel_id)
            .is_some_and(|m| m.contains(&user_id)))
    }

    async fn add_member(&self, channel_id: i64, user_id: i64) -> Result<(), AppError> {
        let mut state = self.state.write();
        if !state.channels.contains_key(&channel_id) {
            return Err(AppError::NotFound(format!("Channel {} not found", channel_id)));
        }
        let members = state.members.entry(channel_id).or_default();
        if !members.contains(&user_id) {
            members.push(user_id);
        }
        Ok(())
    }

    async fn remove_member(&self, channel_id: i64, user_id: i64) -> Result<bool, AppError> {
        let mut state = self.state.write();
        let Some(members) = state.members.get_mut(&channel_id) else {
            return Ok(false);
        };
        let before = members.len();
        members.retain(|m| *m != user_id);
        Ok(members.len() != before)
    }

    async fn pinned_message_ids(&self, channel_id: i64) -> Result<Vec<i64>, AppError> {
        Ok(self
            .state
            .read()
            .pins
            .get(&channel_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_pin(
        &self,
        channel_id: i64,
        message_id: i64,
        limit: usize,
    ) -> Result<bool, AppError> {
        let mut state = self.state.write();
        if !state.channels.contains_key(&channel_id) {
            return Err(AppError::NotFound(format!("Channel {} not found", channel_id)));
        }
        let pins = state.pins.entry(channel_id).or_default();
        if pins.contains(&message_id) {
            return Ok(true);
        }
        if pins.len() >= limit {
            return Ok(false);
        }
        pins.insert(0, message_id);
        Ok(true)
    }

    async fn remove_pin(&self, channel_id: i64, message_id: i64) -> Result<(), AppError> {
        if let Some(pins) = self.state.write().pins.get_mut(&channel_id) {
            pins.retain(|m| *m != message_id);
        }
        Ok(())
    }
}

#[async_trait]
impl MessageRepository for InMemoryStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Message>, AppError> {
        Ok(self.state.read().messages.get(&id).cloned())
    }

    async fn find_by_channel(
        &self,
        channel_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, AppError> {
        let mut messages: Vec<Message> = self
            .state
            .read()
            .messages
            .values()
            .filter(|m| m.channel_id == channel_id)
            .cloned()
            .collect();
        messages.sort_by(newest_first);
        Ok(page(messages, limit, offset))
    }

    async fn find_by_thread(&self, thread_id: i64) -> Result<Vec<Message>, AppError> {
        let mut messages: Vec<Message> = self
            .state
            .read()
            .messages
            .values()
            .filter(|m| m.thread_id == Some(thread_id))
            .cloned()
            .collect();
        messages.sort_by(|a, b| newest_first(b, a));
        Ok(messages)
    }

    async fn find_referencing(&self, message_id: i64) -> Result<Vec<Message>, AppError> {
        Ok(self
            .state
            .read()
            .messages
            .values()
            .filter(|m| m.thread_id == Some(message_id) || m.reply_to_id == Some(message_id))
            .cloned()
            .collect())
    }

    async fn find_pinned(&self, channel_id: i64) -> Result<Vec<Message>, AppError> {
        let mut messages: Vec<Message> = self
            .state
            .read()
            .messages
            .values()
            .filter(|m| m.channel_id == channel_id && m.pinned)
            .cloned()
            .collect();
        messages.sort_by(|a, b| b.pinned_at.cmp(&a.pinned_at));
        Ok(messages)
    }

    async fn search(&self, filter: &MessageFilter) -> Result<SearchPage, AppError> {
        let state = self.state.read();
        let mut matches: Vec<Message> = state
            .messages
            .values()
            .filter(|m| state.matches(m, filter))
            .cloned()
            .collect();
        matches.sort_by(newest_first);
        let total = matches.len() as i64;
        Ok(SearchPage {
            messages: page(matches, filter.limit, filter.offset),
            total,
        })
    }

    async fn create(&self, message: &Message) -> Result<Message, AppError> {
        let mut state = self.state.write();
        if !state.channels.contains_key(&message.channel_id) {
            return Err(AppError::NotFound(format!(
                "Channel {} not found",
                message.channel_id
            )));
        }
        if state.messages.contains_key(&message.id) {
            return Err(AppError::Conflict(
                "Message with this ID already exists".to_string(),
            ));
        }
        state.messages.insert(message.id, message.clone());
        Ok(message.clone())
    }

    async fn update(&self, message: &Message) -> Result<Message, AppError> {
        let mut state = self.state.write();
        let stored = state
            .messages
            .get_mut(&message.id)
            .ok_or_else(|| AppError::NotFound(format!("Message {} not found", message.id)))?;
        stored.content = message.content.clone();
        stored.pinned = message.pinned;
        stored.pinned_by = message.pinned_by;
        stored.pinned_at = message.pinned_at;
        stored.mentions = message.mentions.clone();
        stored.flags = message.flags;
        stored.edited_at = message.edited_at;
        stored.updated_at = message.updated_at;
        Ok(stored.clone())
    }

    async fn delete(&self, id: i64, sender_id: i64) -> Result<Option<Message>, AppError> {
        let mut state = self.state.write();
        let owned = state
            .messages
            .get(&id)
            .filter(|m| m.sender_id == sender_id)
            .cloned();
        if owned.is_some() {
            state.remove_message_cascade(id);
        }
        Ok(owned)
    }
}

#[async_trait]
impl ReactionRepository for InMemoryStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Reaction>, AppError> {
        Ok(self.state.read().reactions.get(&id).cloned())
    }

    async fn find_by_message(&self, message_id: i64) -> Result<Vec<Reaction>, AppError> {
        let mut reactions: Vec<Reaction> = self
            .state
            .read()
            .reactions
            .values()
            .filter(|r| r.message_id == message_id)
            .cloned()
            .collect();
        reactions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(reactions)
    }

    async fn create(&self, reaction: &Reaction) -> Result<Reaction, AppError> {
        let mut state = self.state.write();
        if !state.messages.contains_key(&reaction.message_id) {
            return Err(AppError::NotFound(format!(
                "Message {} not found",
                reaction.message_id
            )));
        }
        let duplicate = state.reactions.values().any(|r| {
            r.message_id == reaction.message_id
                && r.user_id == reaction.user_id
                && r.emoji == reaction.emoji
        });
        if duplicate {
            return Err(AppError::Conflict("Reaction already exists".to_string()));
        }
        state.reactions.insert(reaction.id, reaction.clone());
        Ok(reaction.clone())
    }

    async fn delete(&self, id: i64, user_id: i64) -> Result<Option<Reaction>, AppError> {
        let mut state = self.state.write();
        if !state.reactions.get(&id).is_some_and(|r| r.user_id == user_id) {
            return Ok(None);
        }
        Ok(state.reactions.remove(&id))
    }
}

#[async_trait]
impl AttachmentRepository for InMemoryStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Attachment>, AppError> {
        Ok(self.state.read().attachments.get(&id).cloned())
    }

    async fn find_by_message(&self, message_id: i64) -> Result<Vec<Attachment>, AppError> {
        Ok(self
            .state
            .read()
            .attachments
            .values()
            .filter(|a| a.message_id == message_id)
            .cloned()
            .collect())
    }

    async fn create(&self, attachment: &Attachment) -> Result<Attachment, AppError> {
        let mut state = self.state.write();
        if !state.messages.contains_key(&attachment.message_id) {
            return Err(AppError::NotFound(format!(
                "Message {} not found",
                attachment.message_id
            )));
        }
        state.attachments.insert(attachment.id, attachment.clone());
        Ok(attachment.clone())
    }

    async fn delete(&self, id: i64) -> Result<Option<Attachment>, AppError> {
        Ok(self.state.write().attachments.remove(&id))
    }
}

#[async_trait]
impl ReadReceiptRepository for InMemoryStore {
    async fn create_if_absent(&self, receipt: &ReadReceipt) -> Result<bool, AppError> {
        let mut state = self.state.write();
        let exists = state
            .receipts
            .iter()
            .any(|r| r.message_id == receipt.message_id && r.user_id == receipt.user_id);
        if exists {
            return Ok(false);
        }
        state.receipts.push(receipt.clone());
        Ok(true)
    }

    async fn find_by_message(&self, message_id: i64) -> Result<Vec<ReadReceipt>, AppError> {
        Ok(self
            .state
            .read()
            .receipts
            .iter()
            .filter(|r| r.message_id == message_id)
            .cloned()
            .collect())
    }

    async fn mark_channel_read(
        &self,
        channel_id: i64,
        user_id: i64,
        read_at: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let mut state = self.state.write();
        let unread: Vec<i64> = state
            .messages
            .values()
            .filter(|m| m.channel_id == channel_id && m.sender_id != user_id)
            .filter(|m| {
                !state
                    .receipts
                    .iter()
                    .any(|r| r.message_id == m.id && r.user_id == user_id)
            })
            .map(|m| m.id)
            .collect();
        for message_id in &unread {
            state.receipts.push(ReadReceipt {
                message_id: *message_id,
                user_id,
                read_at,
            });
        }
        Ok(unread.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        ChannelRepository::create(&store, &Channel::new(7, "general", 1))
            .await
            .unwrap();
        store.add_member(7, 2).await.unwrap();
        store
    }

    fn message(id: i64, sender_id: i64) -> Message {
        Message {
            id,
            channel_id: 7,
            sender_id,
            content: format!("hello {}", id),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_owner_is_first_member() {
        let store = seeded().await;
        assert_eq!(store.members(7).await.unwrap(), vec![1, 2]);
        assert_eq!(store.find_by_user(2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pin_cap_is_enforced() {
        let store = seeded().await;
        assert!(store.add_pin(7, 1, 2).await.unwrap());
        assert!(store.add_pin(7, 2, 2).await.unwrap());
        assert!(!store.add_pin(7, 3, 2).await.unwrap());
        assert_eq!(store.pinned_message_ids(7).await.unwrap(), vec![2, 1]);
    }

    #[tokio::test]
    async fn test_delete_requires_sender() {
        let store = seeded().await;
        MessageRepository::create(&store, &message(10, 1)).await.unwrap();

        assert!(MessageRepository::delete(&store, 10, 2).await.unwrap().is_none());
        assert!(MessageRepository::delete(&store, 10, 1).await.unwrap().is_some());
        assert!(MessageRepository::find_by_id(&store, 10).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_reaction_conflicts() {
        let store = seeded().await;
        MessageRepository::create(&store, &message(10, 1)).await.unwrap();
        ReactionRepository::create(&store, &Reaction::new(1, 10, 2, "👍".into()))
            .await
            .unwrap();

        let err = ReactionRepository::create(&store, &Reaction::new(2, 10, 2, "👍".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_mark_channel_read_skips_own_and_already_read() {
        let store = seeded().await;
        for (id, sender) in [(10, 1), (11, 2), (12, 1)] {
            MessageRepository::create(&store, &message(id, sender)).await.unwrap();
        }
        store
            .create_if_absent(&ReadReceipt {
                message_id: 10,
                user_id: 2,
                read_at: Utc::now(),
            })
            .await
            .unwrap();

        let marked = store.mark_channel_read(7, 2, Utc::now()).await.unwrap();
        assert_eq!(marked, 1);
        assert_eq!(store.mark_channel_read(7, 2, Utc::now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_counts_all_matches() {
        let store = seeded().await;
        for id in 1..=25 {
            MessageRepository::create(&store, &message(id, 1)).await.unwrap();
        }

        let page = store
            .search(&MessageFilter {
                channel_id: Some(7),
                query: Some("HELLO".into()),
                limit: 10,
                offset: 20,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(page.total, 25);
        assert_eq!(page.messages.len(), 5);
    }
}
