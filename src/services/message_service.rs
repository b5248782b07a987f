use crate::adapters::store::MessageRepository;
use crate::config::MessagingConfig;
use crate::domain::ids::new_id;
use crate::domain::message::{DeliveredMessage, Message};
use crate::domain::validation::{ValidationErrors, validate};
use crate::error::{AppError, Result};
use crate::services::consumption::ConsumptionPipeline;
use crate::services::with_deadline;
use opentelemetry::{KeyValue, global, metrics::Counter};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    created_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("fleeting-server");
        Self {
            created_total: meter
                .u64_counter("fleeting_messages_created_total")
                .with_description("Message creation attempts that reached the store")
                .build(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct MessageService {
    repo: Arc<dyn MessageRepository>,
    pipeline: ConsumptionPipeline,
    default_ttl_secs: u64,
    call_timeout: Duration,
    metrics: Metrics,
}

impl MessageService {
    #[must_use]
    pub fn new(repo: Arc<dyn MessageRepository>, config: &MessagingConfig, call_timeout: Duration) -> Self {
        let pipeline = ConsumptionPipeline::new(Arc::clone(&repo), config, call_timeout);
        Self { repo, pipeline, default_ttl_secs: config.default_ttl_secs, call_timeout, metrics: Metrics::new() }
    }

    /// Validates and stores a new message, returning its id.
    ///
    /// # Errors
    /// Returns `AppError::Validation` with every failed rule if the input is malformed.
    /// Returns `AppError::Store` if the message cannot be written.
    #[tracing::instrument(err(level = "warn"), skip(self, raw))]
    pub async fn create(&self, raw: &Value) -> Result<Uuid> {
        let input = validate(raw, self.default_ttl_secs)?;

        let created_at = OffsetDateTime::now_utc();
        let expiration_date =
            input.expiration_from(created_at).ok_or_else(|| ValidationErrors::single("Timeout is out of range"))?;

        let message = Message { id: new_id(), username: input.username, text: input.text, expiration_date };

        match with_deadline(self.call_timeout, self.repo.put(&message)).await {
            Ok(()) => {
                tracing::debug!(id = %message.id, "Message stored");
                self.metrics.created_total.add(1, &[KeyValue::new("status", "success")]);
                Ok(message.id)
            }
            Err(e) => {
                self.metrics.created_total.add(1, &[KeyValue::new("status", "failure")]);
                Err(e.into())
            }
        }
    }

    /// Reads a message without consuming it.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if no message has this id.
    /// Returns `AppError::Store` if the lookup fails.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn get_by_id(&self, id: Uuid) -> Result<Message> {
        with_deadline(self.call_timeout, self.repo.get(id)).await?.ok_or(AppError::NotFound)
    }

    /// Returns and consumes every live message addressed to `username`.
    ///
    /// # Errors
    /// Returns `AppError::Store` if the live-message query fails.
    pub async fn list_and_consume(&self, username: &str) -> Result<Vec<DeliveredMessage>> {
        let messages = self.pipeline.list_and_consume(username).await?;
        Ok(messages.into_iter().map(DeliveredMessage::from).collect())
    }
}
