//! Search Service
//!
//! Filtered message search with offset paging.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use validator::Validate;

use crate::domain::{Message, MessageFilter, MessageRepository};
use crate::shared::error::AppError;
use crate::shared::validation::validation_error;

pub const DEFAULT_SEARCH_LIMIT: i64 = 20;
pub const MAX_SEARCH_LIMIT: i64 = 100;

/// Search request. Every unset field is unconstrained.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SearchInput {
    pub channel_id: Option<i64>,
    /// Restrict to messages sent by this user
    pub user_id: Option<i64>,
    #[validate(length(max = 200, message = "Query must be at most 200 characters"))]
    pub query: Option<String>,
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub has_attachments: Option<bool>,
    pub has_mentions: Option<bool>,
    pub pinned: Option<bool>,
    pub nsfw: Option<bool>,
    pub spoiler: Option<bool>,
    pub limit: Option<i64>,
    #[validate(range(min = 0, message = "Offset must not be negative"))]
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub messages: Vec<Message>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

/// Whether results exist past the current page.
pub fn has_more(total: i64, offset: i64, limit: i64) -> bool {
    total > offset + limit
}

#[async_trait]
pub trait SearchService: Send + Sync {
    async fn search_messages(&self, input: SearchInput) -> Result<SearchResult, AppError>;
}

pub struct SearchServiceImpl {
    messages: Arc<dyn MessageRepository>,
}

impl SearchServiceImpl {
    pub fn new(messages: Arc<dyn MessageRepository>) -> Self {
        Self { messages }
    }
}

#[async_trait]
impl SearchService for SearchServiceImpl {
    #[instrument(skip(self))]
    async fn search_messages(&self, input: SearchInput) -> Result<SearchResult, AppError> {
        input.validate().map_err(validation_error)?;
        if let (Some(after), Some(before)) = (input.after, input.before) {
            if after >= before {
                return Err(AppError::Validation(
                    "`after` must be earlier than `before`".into(),
                ));
            }
        }

        let limit = input
            .limit
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(1, MAX_SEARCH_LIMIT);
        let offset = input.offset.unwrap_or(0);

        let filter = MessageFilter {
            channel_id: input.channel_id,
            sender_id: input.user_id,
            query: input.query.map(|q| q.trim().to_string()).filter(|q| !q.is_empty()),
            after: input.after,
            before: input.before,
            has_attachments: input.has_attachments,
            has_mentions: input.has_mentions,
            pinned: input.pinned,
            nsfw: input.nsfw,
            spoiler: input.spoiler,
            limit,
            offset,
        };

        let page = self.messages.search(&filter).await?;

        Ok(SearchResult {
            has_more: has_more(page.total, offset, limit),
            messages: page.messages,
            total: page.total,
            limit,
            offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MockMessageRepository, SearchPage};
    use test_case::test_case;

    #[test_case(45, 20, 20, true ; "middle page")]
    #[test_case(45, 40, 20, false ; "last page")]
    #[test_case(40, 20, 20, false ; "exact fit")]
    #[test_case(0, 0, 20, false ; "no results")]
    fn test_has_more(total: i64, offset: i64, limit: i64, expected: bool) {
        assert_eq!(has_more(total, offset, limit), expected);
    }

    #[tokio::test]
    async fn test_limit_defaults_and_clamps() {
        let mut repo = MockMessageRepository::new();
        repo.expect_search()
            .withf(|f| f.limit == DEFAULT_SEARCH_LIMIT && f.offset == 0)
            .times(1)
            .returning(|_| Ok(SearchPage::default()));
        repo.expect_search()
            .withf(|f| f.limit == MAX_SEARCH_LIMIT)
            .times(1)
            .returning(|_| Ok(SearchPage::default()));

        let svc = SearchServiceImpl::new(Arc::new(repo));
        svc.search_messages(SearchInput::default()).await.unwrap();
        svc.search_messages(SearchInput {
            limit: Some(5000),
            ..Default::default()
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_filter_is_passed_through() {
        let mut repo = MockMessageRepository::new();
        repo.expect_search()
            .withf(|f| {
                f.channel_id == Some(7)
                    && f.sender_id == Some(2)
                    && f.query.as_deref() == Some("deploy")
                    && f.has_attachments == Some(true)
                    && f.nsfw == Some(false)
            })
            .returning(|_| {
                Ok(SearchPage {
                    messages: vec![],
                    total: 45,
                })
            });

        let result = SearchServiceImpl::new(Arc::new(repo))
            .search_messages(SearchInput {
                channel_id: Some(7),
                user_id: Some(2),
                query: Some("  deploy ".into()),
                has_attachments: Some(true),
                nsfw: Some(false),
                limit: Some(20),
                offset: Some(20),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(result.has_more);
        assert_eq!(result.total, 45);
    }

    #[tokio::test]
    async fn test_inverted_time_range_rejected() {
        let now = Utc::now();
        let svc = SearchServiceImpl::new(Arc::new(MockMessageRepository::new()));
        let err = svc
            .search_messages(SearchInput {
                after: Some(now),
                before: Some(now - chrono::Duration::hours(1)),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
    }
}
