//! Reaction Service

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::Repositories;
use crate::application::events::EventDispatcher;
use crate::domain::events::ReactionChanged;
use crate::domain::{summarize, ChatEvent, Reaction, ReactionCount};
use crate::shared::error::AppError;
use crate::shared::snowflake::SnowflakeGenerator;

const MAX_EMOJI_LENGTH: usize = 64;

#[async_trait]
pub trait ReactionService: Send + Sync {
    /// Add an emoji reaction. A user reacts with a given emoji at most once.
    async fn add_reaction(
        &self,
        message_id: i64,
        user_id: i64,
        emoji: &str,
    ) -> Result<Reaction, AppError>;

    /// Remove a reaction the user added.
    async fn remove_reaction(&self, reaction_id: i64, user_id: i64) -> Result<(), AppError>;

    /// Per-emoji counts for a message as seen by `viewer_id`.
    async fn get_reactions(
        &self,
        message_id: i64,
        viewer_id: i64,
    ) -> Result<Vec<ReactionCount>, AppError>;
}

pub struct ReactionServiceImpl {
    repos: Repositories,
    dispatcher: Arc<dyn EventDispatcher>,
    id_generator: Arc<SnowflakeGenerator>,
}

impl ReactionServiceImpl {
    pub fn new(
        repos: Repositories,
        dispatcher: Arc<dyn EventDispatcher>,
        id_generator: Arc<SnowflakeGenerator>,
    ) -> Self {
        Self {
            repos,
            dispatcher,
            id_generator,
        }
    }

    async fn channel_of(&self, message_id: i64) -> Result<i64, AppError> {
        self.repos
            .messages
            .find_by_id(message_id)
            .await?
            .map(|m| m.channel_id)
            .ok_or_else(|| AppError::NotFound(format!("Message {} not found", message_id)))
    }
}

#[async_trait]
impl ReactionService for ReactionServiceImpl {
    #[instrument(skip(self))]
    async fn add_reaction(
        &self,
        message_id: i64,
        user_id: i64,
        emoji: &str,
    ) -> Result<Reaction, AppError> {
        let emoji = emoji.trim();
        let len = emoji.chars().count();
        if len == 0 || len > MAX_EMOJI_LENGTH {
            return Err(AppError::Validation(format!(
                "Emoji must be 1 to {} characters",
                MAX_EMOJI_LENGTH
            )));
        }

        let channel_id = self.channel_of(message_id).await?;

        let existing = self.repos.reactions.find_by_message(message_id).await?;
        if existing
            .iter()
            .any(|r| r.user_id == user_id && r.emoji == emoji)
        {
            return Err(AppError::Conflict("Reaction already exists".into()));
        }

        let reaction = Reaction::new(
            self.id_generator.generate(),
            message_id,
            user_id,
            emoji.to_string(),
        );
        let reaction = self.repos.reactions.create(&reaction).await?;
        debug!(reaction_id = reaction.id, "Reaction added");

        self.dispatcher
            .dispatch(ChatEvent::ReactionAdded(ReactionChanged {
                channel_id,
                reaction: reaction.clone(),
            }))
            .await;

        Ok(reaction)
    }

    #[instrument(skip(self))]
    async fn remove_reaction(&self, reaction_id: i64, user_id: i64) -> Result<(), AppError> {
        let reaction = self
            .repos
            .reactions
            .delete(reaction_id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reaction {} not found", reaction_id)))?;

        // The message may be gone already; the event is still scoped by channel.
        let channel_id = match self.repos.messages.find_by_id(reaction.message_id).await? {
            Some(message) => message.channel_id,
            None => return Ok(()),
        };

        self.dispatcher
            .dispatch(ChatEvent::ReactionRemoved(ReactionChanged {
                channel_id,
                reaction,
            }))
            .await;

        Ok(())
    }

    async fn get_reactions(
        &self,
        message_id: i64,
        viewer_id: i64,
    ) -> Result<Vec<ReactionCount>, AppError> {
        let reactions = self.repos.reactions.find_by_message(message_id).await?;
        Ok(summarize(&reactions, viewer_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::test_support::Fixture;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn service(fx: &Fixture) -> ReactionServiceImpl {
        ReactionServiceImpl::new(fx.repos.clone(), fx.dispatcher.clone(), fx.ids.clone())
    }

    #[tokio::test]
    async fn test_add_and_summarize() {
        let fx = Fixture::new().await;
        fx.message(10, 1).await;
        let svc = service(&fx);

        svc.add_reaction(10, 1, "👍").await.unwrap();
        svc.add_reaction(10, 2, " 👍 ").await.unwrap();
        svc.add_reaction(10, 2, "🎉").await.unwrap();

        let counts = svc.get_reactions(10, 1).await.unwrap();
        assert_eq!(
            counts,
            vec![
                ReactionCount { emoji: "👍".into(), count: 2, me: true },
                ReactionCount { emoji: "🎉".into(), count: 1, me: false },
            ]
        );
        assert_eq!(fx.recorder.types(), vec!["reaction_added"; 3]);
    }

    #[tokio::test]
    async fn test_duplicate_reaction_conflicts() {
        let fx = Fixture::new().await;
        fx.message(10, 1).await;
        let svc = service(&fx);

        svc.add_reaction(10, 2, "👍").await.unwrap();
        let err = svc.add_reaction(10, 2, "👍").await.unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(svc.get_reactions(10, 2).await.unwrap()[0].count, 1);
    }

    #[test_case("" ; "empty")]
    #[test_case("   " ; "blank")]
    #[tokio::test]
    async fn test_invalid_emoji(emoji: &str) {
        let fx = Fixture::new().await;
        fx.message(10, 1).await;

        let err = service(&fx).add_reaction(10, 2, emoji).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_remove_only_own_reaction() {
        let fx = Fixture::new().await;
        fx.message(10, 1).await;
        let svc = service(&fx);
        let reaction = svc.add_reaction(10, 2, "👍").await.unwrap();

        assert!(svc.remove_reaction(reaction.id, 1).await.unwrap_err().is_not_found());
        svc.remove_reaction(reaction.id, 2).await.unwrap();

        assert!(svc.get_reactions(10, 2).await.unwrap().is_empty());
        assert_eq!(
            fx.recorder.types(),
            vec!["reaction_added", "reaction_removed"]
        );
    }
}
