use crate::adapters::store::records::{decode_instant, encode_instant};
use crate::adapters::store::{ConsumeOutcome, ContinuationToken, MessageRepository, Page, StoreError};
use crate::domain::message::Message;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Process-local store with the same paging contract as the networked one.
/// Queries walk the `(expiration_date, id)` order of a user's messages.
#[derive(Clone, Debug)]
pub struct InMemoryMessageRepository {
    messages: Arc<DashMap<Uuid, StoredMessage>>,
    page_size: usize,
}

#[derive(Debug)]
struct StoredMessage {
    message: Message,
    consumed: bool,
    consumed_by: Option<Uuid>,
}

#[derive(Serialize, Deserialize)]
struct Cursor {
    expiration_date: String,
    id: Uuid,
}

impl InMemoryMessageRepository {
    #[must_use]
    pub fn new(page_size: Option<usize>) -> Self {
        Self { messages: Arc::new(DashMap::new()), page_size: page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1) }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn encode_cursor(message: &Message) -> Result<ContinuationToken, StoreError> {
        let cursor = Cursor { expiration_date: encode_instant(message.expiration_date), id: message.id };
        let json = serde_json::to_vec(&cursor).map_err(|e| StoreError::Malformed(e.to_string()))?;
        Ok(ContinuationToken::new(URL_SAFE_NO_PAD.encode(json)))
    }

    fn decode_cursor(token: &ContinuationToken) -> Result<(OffsetDateTime, Uuid), StoreError> {
        let json = URL_SAFE_NO_PAD.decode(token.as_str()).map_err(|_| StoreError::InvalidToken)?;
        let cursor: Cursor = serde_json::from_slice(&json).map_err(|_| StoreError::InvalidToken)?;
        let expiration_date = decode_instant(&cursor.expiration_date).map_err(|_| StoreError::InvalidToken)?;
        Ok((expiration_date, cursor.id))
    }
}

impl Default for InMemoryMessageRepository {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn put(&self, message: &Message) -> Result<(), StoreError> {
        let stored = StoredMessage { message: message.clone(), consumed: false, consumed_by: None };
        self.messages.insert(message.id, stored);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Message>, StoreError> {
        Ok(self.messages.get(&id).map(|entry| entry.message.clone()))
    }

    #[tracing::instrument(level = "debug", skip(self, token))]
    async fn query_live_for_user(
        &self,
        username: &str,
        as_of: OffsetDateTime,
        token: Option<ContinuationToken>,
    ) -> Result<Page, StoreError> {
        let after = token.as_ref().map(Self::decode_cursor).transpose()?;

        let mut live: Vec<Message> = self
            .messages
            .iter()
            .filter(|entry| entry.message.username == username && entry.message.is_live_at(as_of))
            .filter(|entry| after.is_none_or(|key| (entry.message.expiration_date, entry.message.id) > key))
            .map(|entry| entry.message.clone())
            .collect();
        live.sort_by_key(|m| (m.expiration_date, m.id));

        let has_more = live.len() > self.page_size;
        live.truncate(self.page_size);

        let next = match live.last() {
            Some(last) if has_more => Some(Self::encode_cursor(last)?),
            _ => None,
        };

        Ok(Page { messages: live, next })
    }

    async fn mark_consumed(&self, id: Uuid, at: OffsetDateTime) -> Result<(), StoreError> {
        if let Some(mut entry) = self.messages.get_mut(&id) {
            entry.message.expiration_date = at;
            entry.consumed = true;
        }
        Ok(())
    }

    async fn claim_consumption(
        &self,
        id: Uuid,
        reader: Uuid,
        at: OffsetDateTime,
    ) -> Result<ConsumeOutcome, StoreError> {
        match self.messages.get_mut(&id) {
            Some(mut entry) if !entry.consumed || entry.consumed_by == Some(reader) => {
                entry.message.expiration_date = at;
                entry.consumed = true;
                entry.consumed_by = Some(reader);
                Ok(ConsumeOutcome::Marked)
            }
            _ => Ok(ConsumeOutcome::AlreadyConsumed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn message(username: &str, text: &str, expiration_date: OffsetDateTime) -> Message {
        Message { id: Uuid::new_v4(), username: username.to_string(), text: text.to_string(), expiration_date }
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let repo = InMemoryMessageRepository::default();
        let msg = message("alice", "hi", OffsetDateTime::now_utc());

        repo.put(&msg).await.unwrap();

        assert_eq!(repo.get(msg.id).await.unwrap(), Some(msg));
        assert_eq!(repo.get(Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_query_filters_owner_and_liveness() {
        let repo = InMemoryMessageRepository::default();
        let now = OffsetDateTime::now_utc();
        let live = message("alice", "live", now + Duration::minutes(1));
        repo.put(&live).await.unwrap();
        repo.put(&message("alice", "expired", now - Duration::seconds(1))).await.unwrap();
        repo.put(&message("bob", "other", now + Duration::minutes(1))).await.unwrap();

        let page = repo.query_live_for_user("alice", now, None).await.unwrap();

        assert_eq!(page.messages, vec![live]);
        assert!(page.next.is_none());
    }

    #[tokio::test]
    async fn test_query_pages_through_all_messages() {
        let repo = InMemoryMessageRepository::new(Some(2));
        let now = OffsetDateTime::now_utc();
        for i in 0..5 {
            repo.put(&message("alice", &i.to_string(), now + Duration::seconds(i + 1))).await.unwrap();
        }

        let mut texts = Vec::new();
        let mut token = None;
        let mut pages = 0;
        loop {
            let page = repo.query_live_for_user("alice", now, token).await.unwrap();
            pages += 1;
            texts.extend(page.messages.into_iter().map(|m| m.text));
            token = page.next;
            if token.is_none() {
                break;
            }
        }

        assert_eq!(pages, 3);
        assert_eq!(texts, ["0", "1", "2", "3", "4"]);
    }

    #[tokio::test]
    async fn test_exact_page_fill_issues_no_token() {
        let repo = InMemoryMessageRepository::new(Some(2));
        let now = OffsetDateTime::now_utc();
        repo.put(&message("alice", "a", now + Duration::seconds(1))).await.unwrap();
        repo.put(&message("alice", "b", now + Duration::seconds(2))).await.unwrap();

        let page = repo.query_live_for_user("alice", now, None).await.unwrap();

        assert_eq!(page.messages.len(), 2);
        assert!(page.next.is_none());
    }

    #[tokio::test]
    async fn test_mark_consumed_makes_message_non_live() {
        let repo = InMemoryMessageRepository::default();
        let now = OffsetDateTime::now_utc();
        let msg = message("alice", "hi", now + Duration::minutes(1));
        repo.put(&msg).await.unwrap();

        repo.mark_consumed(msg.id, now).await.unwrap();

        let later = now + Duration::nanoseconds(1);
        assert!(repo.query_live_for_user("alice", later, None).await.unwrap().messages.is_empty());
        assert_eq!(repo.get(msg.id).await.unwrap().unwrap().expiration_date, now);
    }

    #[tokio::test]
    async fn test_mark_consumed_of_missing_id_does_not_create_it() {
        let repo = InMemoryMessageRepository::default();

        repo.mark_consumed(Uuid::new_v4(), OffsetDateTime::now_utc()).await.unwrap();

        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn test_claim_loses_to_earlier_reader() {
        let repo = InMemoryMessageRepository::default();
        let now = OffsetDateTime::now_utc();
        let msg = message("alice", "hi", now + Duration::minutes(1));
        repo.put(&msg).await.unwrap();

        let first = repo.claim_consumption(msg.id, Uuid::new_v4(), now).await.unwrap();
        let second = repo.claim_consumption(msg.id, Uuid::new_v4(), now).await.unwrap();

        assert_eq!(first, ConsumeOutcome::Marked);
        assert_eq!(second, ConsumeOutcome::AlreadyConsumed);
    }

    #[tokio::test]
    async fn test_claim_fails_when_consumed_at_a_later_instant() {
        // An earlier reader still sees the message live after a later reader
        // consumed it, since the new expiration is after its read instant.
        let repo = InMemoryMessageRepository::default();
        let earlier = OffsetDateTime::now_utc();
        let later = earlier + Duration::milliseconds(5);
        let msg = message("alice", "hi", earlier + Duration::minutes(1));
        repo.put(&msg).await.unwrap();

        repo.claim_consumption(msg.id, Uuid::new_v4(), later).await.unwrap();
        let still_visible = repo.query_live_for_user("alice", earlier, None).await.unwrap().messages;
        let outcome = repo.claim_consumption(msg.id, Uuid::new_v4(), earlier).await.unwrap();

        assert_eq!(still_visible.len(), 1);
        assert_eq!(outcome, ConsumeOutcome::AlreadyConsumed);
    }

    #[tokio::test]
    async fn test_claim_fails_after_unconditional_mark() {
        let repo = InMemoryMessageRepository::default();
        let now = OffsetDateTime::now_utc();
        let msg = message("alice", "hi", now + Duration::minutes(1));
        repo.put(&msg).await.unwrap();

        repo.mark_consumed(msg.id, now).await.unwrap();

        assert_eq!(repo.claim_consumption(msg.id, Uuid::new_v4(), now).await.unwrap(), ConsumeOutcome::AlreadyConsumed);
    }

    #[tokio::test]
    async fn test_claim_is_repeatable_by_same_reader() {
        let repo = InMemoryMessageRepository::default();
        let now = OffsetDateTime::now_utc();
        let msg = message("alice", "hi", now + Duration::minutes(1));
        repo.put(&msg).await.unwrap();
        let reader = Uuid::new_v4();

        repo.claim_consumption(msg.id, reader, now).await.unwrap();
        let retried = repo.claim_consumption(msg.id, reader, now).await.unwrap();

        assert_eq!(retried, ConsumeOutcome::Marked);
    }

    #[tokio::test]
    async fn test_claim_of_missing_id_does_not_create_it() {
        let repo = InMemoryMessageRepository::default();

        let outcome = repo.claim_consumption(Uuid::new_v4(), Uuid::new_v4(), OffsetDateTime::now_utc()).await.unwrap();

        assert_eq!(outcome, ConsumeOutcome::AlreadyConsumed);
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn test_foreign_token_is_rejected() {
        let repo = InMemoryMessageRepository::default();
        let token = ContinuationToken::new("bogus".to_string());

        let result = repo.query_live_for_user("alice", OffsetDateTime::now_utc(), Some(token)).await;

        assert!(matches!(result, Err(StoreError::InvalidToken)));
    }
}
