use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// A short-lived text message addressed to a username.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub username: String,
    pub text: String,
    pub expiration_date: OffsetDateTime,
}

impl Message {
    /// A message is live at `instant` while its expiration has not passed.
    #[must_use]
    pub fn is_live_at(&self, instant: OffsetDateTime) -> bool {
        self.expiration_date >= instant
    }
}

/// Creation input that has passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub username: String,
    pub text: String,
    pub ttl_seconds: f64,
}

impl NewMessage {
    /// Absolute expiration for a message created at `created_at`.
    ///
    /// Returns `None` when the time-to-live pushes the instant out of range.
    #[must_use]
    pub fn expiration_from(&self, created_at: OffsetDateTime) -> Option<OffsetDateTime> {
        created_at.checked_add(Duration::checked_seconds_f64(self.ttl_seconds)?)
    }
}

/// What a consuming reader gets back for each message it was shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredMessage {
    pub id: Uuid,
    pub text: String,
}

impl From<Message> for DeliveredMessage {
    fn from(message: Message) -> Self {
        Self { id: message.id, text: message.text }
    }
}
