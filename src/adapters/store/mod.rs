use crate::domain::message::Message;
use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

pub mod dynamodb;
pub mod memory;
pub mod records;

pub use dynamodb::DynamoMessageRepository;
pub use memory::InMemoryMessageRepository;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store call timed out")]
    Timeout,
    #[error("Store request failed: {0}")]
    Backend(String),
    #[error("Malformed store item: {0}")]
    Malformed(String),
    #[error("Continuation token was not issued by this store")]
    InvalidToken,
}

/// Opaque cursor for resuming a paginated query. Only the store that issued it
/// can interpret it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    #[must_use]
    pub const fn new(raw: String) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One bounded page of a live-message query.
#[derive(Debug, Default)]
pub struct Page {
    pub messages: Vec<Message>,
    pub next: Option<ContinuationToken>,
}

/// Result of a consumption claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// The message was unconsumed, or already claimed by this reader, and is now marked.
    Marked,
    /// The message carries another reader's consumption marker, or no longer exists.
    AlreadyConsumed,
}

/// Persistence for messages over a store with single-item atomic writes and
/// no cross-item transactions.
///
/// Implementations are shared by every concurrent request and must be safe for
/// concurrent use.
#[async_trait]
pub trait MessageRepository: Send + Sync + std::fmt::Debug + 'static {
    /// Unconditionally writes the message under its id.
    async fn put(&self, message: &Message) -> Result<(), StoreError>;

    /// Point lookup. `Ok(None)` means no such message.
    async fn get(&self, id: Uuid) -> Result<Option<Message>, StoreError>;

    /// Returns one page of `username`'s messages whose expiration is at or
    /// after `as_of`, plus a token when more pages remain.
    async fn query_live_for_user(
        &self,
        username: &str,
        as_of: OffsetDateTime,
        token: Option<ContinuationToken>,
    ) -> Result<Page, StoreError>;

    /// Sets the expiration to `at` and records the message as consumed, whatever
    /// its current state. Marking an id that no longer exists is a no-op.
    async fn mark_consumed(&self, id: Uuid, at: OffsetDateTime) -> Result<(), StoreError>;

    /// Marks the message consumed by `reader` at `at`, unless it already carries a
    /// consumption marker. The expiration alone cannot tell a consumed message from
    /// a live one, because consuming sets it to the consuming reader's instant.
    ///
    /// A marker left by the same `reader` counts as [`ConsumeOutcome::Marked`], so
    /// a retry after a lost response does not disown the reader's own write.
    async fn claim_consumption(
        &self,
        id: Uuid,
        reader: Uuid,
        at: OffsetDateTime,
    ) -> Result<ConsumeOutcome, StoreError>;
}
