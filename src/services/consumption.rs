use crate::adapters::store::{ConsumeOutcome, MessageRepository, StoreError};
use crate::config::{DeliveryMode, MessagingConfig};
use crate::domain::message::Message;
use crate::services::with_deadline;
use backon::{ExponentialBuilder, Retryable};
use futures::{StreamExt, stream};
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    delivered: Counter<u64>,
    misses: Counter<u64>,
    lost_claims: Counter<u64>,
    pages: Histogram<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("fleeting-server");
        Self {
            delivered: meter
                .u64_counter("fleeting_messages_delivered_total")
                .with_description("Messages returned to a consuming reader")
                .build(),
            misses: meter
                .u64_counter("fleeting_consumption_misses_total")
                .with_description("Delivered messages whose consumption mark could not be written")
                .build(),
            lost_claims: meter
                .u64_counter("fleeting_consumption_lost_claims_total")
                .with_description("Messages withheld because another reader consumed them first")
                .build(),
            pages: meter
                .u64_histogram("fleeting_list_pages")
                .with_description("Query pages walked by a single list-and-consume call")
                .build(),
        }
    }
}

/// Drives the paginated live-message query for a user and consumes what it finds.
///
/// Delivery and consumption are decoupled: every message a query returns is
/// delivered, and its consumption mark is best effort. A failed mark leaves the
/// message live, so it may be delivered again later. Concurrent readers of the
/// same user can both receive a message unless [`DeliveryMode::Exclusive`] is
/// selected, in which case each call claims messages under its own reader id and
/// only the first claim on a message delivers it.
#[derive(Clone, Debug)]
pub struct ConsumptionPipeline {
    repo: Arc<dyn MessageRepository>,
    delivery: DeliveryMode,
    concurrency: usize,
    backoff: ExponentialBuilder,
    call_timeout: Duration,
    metrics: Metrics,
}

impl ConsumptionPipeline {
    #[must_use]
    pub fn new(repo: Arc<dyn MessageRepository>, config: &MessagingConfig, call_timeout: Duration) -> Self {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(10))
            .with_max_delay(Duration::from_millis(200))
            .with_max_times(config.consume_retries)
            .with_jitter();

        Self {
            repo,
            delivery: config.delivery,
            concurrency: config.consume_concurrency.max(1),
            backoff,
            call_timeout,
            metrics: Metrics::new(),
        }
    }

    /// Returns every message live for `username` at the moment of the call and
    /// marks each one consumed at that same instant.
    ///
    /// # Errors
    /// Returns `StoreError` if any page of the query fails. Failures of
    /// individual consumption marks are logged and never fail the call.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self),
        fields(pages = tracing::field::Empty, delivered = tracing::field::Empty)
    )]
    pub async fn list_and_consume(&self, username: &str) -> Result<Vec<Message>, StoreError> {
        let now = OffsetDateTime::now_utc();
        let reader = Uuid::new_v4();
        let mut delivered = Vec::new();
        let mut token = None;
        let mut pages: u64 = 0;

        loop {
            let page = with_deadline(self.call_timeout, self.repo.query_live_for_user(username, now, token)).await?;
            pages += 1;

            tracing::debug!(page = pages, size = page.messages.len(), "Consuming query page");
            delivered.extend(self.consume_page(page.messages, reader, now).await);

            match page.next {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        let span = tracing::Span::current();
        span.record("pages", pages);
        span.record("delivered", delivered.len());
        self.metrics.pages.record(pages, &[]);
        self.metrics.delivered.add(delivered.len() as u64, &[]);

        Ok(delivered)
    }

    /// Marks a page concurrently, at most `concurrency` in flight, and waits for
    /// every mark before returning. Page order is preserved.
    async fn consume_page(&self, messages: Vec<Message>, reader: Uuid, now: OffsetDateTime) -> Vec<Message> {
        stream::iter(messages)
            .map(|message| self.consume_one(message, reader, now))
            .buffered(self.concurrency)
            .filter_map(|kept| async move { kept })
            .collect()
            .await
    }

    async fn consume_one(&self, message: Message, reader: Uuid, now: OffsetDateTime) -> Option<Message> {
        match self.delivery {
            DeliveryMode::AtLeastOnce => {
                let id = message.id;
                let marked = (|| async { with_deadline(self.call_timeout, self.repo.mark_consumed(id, now)).await })
                    .retry(&self.backoff)
                    .notify(|e, delay| {
                        tracing::debug!(%id, error = %e, ?delay, "Retrying consumption mark");
                    })
                    .await;

                if let Err(e) = marked {
                    self.record_miss(&message, &e);
                }
                Some(message)
            }
            DeliveryMode::Exclusive => {
                let id = message.id;
                let claimed = (|| async {
                    with_deadline(self.call_timeout, self.repo.claim_consumption(id, reader, now)).await
                })
                .retry(&self.backoff)
                .notify(|e, delay| {
                    tracing::debug!(%id, error = %e, ?delay, "Retrying conditional consumption mark");
                })
                .await;

                match claimed {
                    Ok(ConsumeOutcome::Marked) => Some(message),
                    Ok(ConsumeOutcome::AlreadyConsumed) => {
                        tracing::debug!(%id, "Message consumed by a concurrent reader");
                        self.metrics.lost_claims.add(1, &[]);
                        None
                    }
                    Err(e) => {
                        self.record_miss(&message, &e);
                        Some(message)
                    }
                }
            }
        }
    }

    fn record_miss(&self, message: &Message, error: &StoreError) {
        tracing::warn!(id = %message.id, error = %error, "Delivered message could not be marked consumed");
        let mode = match self.delivery {
            DeliveryMode::AtLeastOnce => "at_least_once",
            DeliveryMode::Exclusive => "exclusive",
        };
        self.metrics.misses.add(1, &[KeyValue::new("delivery", mode)]);
    }
}
