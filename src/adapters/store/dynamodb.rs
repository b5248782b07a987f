use crate::adapters::store::records::{self, CONSUMED_AT, CONSUMED_BY, EXPIRATION_DATE, ID, USERNAME, encode_instant};
use crate::adapters::store::{ConsumeOutcome, ContinuationToken, MessageRepository, Page, StoreError};
use crate::domain::message::Message;
use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::error::{BuildError, DisplayErrorContext, SdkError};
use aws_sdk_dynamodb::operation::create_table::CreateTableError;
use aws_sdk_dynamodb::operation::describe_table::DescribeTableError;
use aws_sdk_dynamodb::operation::update_item::UpdateItemError;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, GlobalSecondaryIndex, KeySchemaElement, KeyType, Projection,
    ProjectionType, ScalarAttributeType,
};
use time::OffsetDateTime;
use uuid::Uuid;

/// Messages in a DynamoDB table keyed by `id`, with a global secondary index on
/// `(username, expiration_date)` serving the live-message query.
///
/// Index reads are eventually consistent, so a query may briefly miss a fresh
/// write or still see a message another reader just consumed.
#[derive(Clone, Debug)]
pub struct DynamoMessageRepository {
    client: Client,
    table: String,
    index: String,
    page_size: Option<i32>,
}

impl DynamoMessageRepository {
    #[must_use]
    pub const fn new(client: Client, table: String, index: String, page_size: Option<i32>) -> Self {
        Self { client, table, index, page_size }
    }

    /// Creates the table and its index unless the table already exists.
    ///
    /// # Errors
    /// Returns `StoreError` if the table cannot be described or created.
    #[tracing::instrument(skip(self), fields(table = %self.table, index = %self.index))]
    pub async fn ensure_table(&self) -> Result<(), StoreError> {
        match self.client.describe_table().table_name(&self.table).send().await {
            Ok(_) => {
                tracing::debug!("Table already exists");
                return Ok(());
            }
            Err(e) if e.as_service_error().is_some_and(DescribeTableError::is_resource_not_found_exception) => {}
            Err(e) => return Err(classify("DescribeTable", e)),
        }

        // The query returns message text, so the index projects every attribute.
        let index = GlobalSecondaryIndex::builder()
            .index_name(&self.index)
            .key_schema(key_element(USERNAME, KeyType::Hash)?)
            .key_schema(key_element(EXPIRATION_DATE, KeyType::Range)?)
            .projection(Projection::builder().projection_type(ProjectionType::All).build())
            .build()
            .map_err(build_failed)?;

        let result = self
            .client
            .create_table()
            .table_name(&self.table)
            .key_schema(key_element(ID, KeyType::Hash)?)
            .attribute_definitions(attribute(ID, ScalarAttributeType::S)?)
            .attribute_definitions(attribute(USERNAME, ScalarAttributeType::S)?)
            .attribute_definitions(attribute(EXPIRATION_DATE, ScalarAttributeType::N)?)
            .global_secondary_indexes(index)
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await;

        match result {
            Ok(_) => {
                tracing::info!("Created message table");
                Ok(())
            }
            Err(e) if e.as_service_error().is_some_and(CreateTableError::is_resource_in_use_exception) => Ok(()),
            Err(e) => Err(classify("CreateTable", e)),
        }
    }
}

/// Fresh items carry no consumption marker. A marker left by the same reader
/// means an earlier attempt landed and only its response was lost.
const UNCLAIMED_OR_OURS: &str = "attribute_exists(#id) AND (attribute_not_exists(#consumed_at) OR #consumed_by = :reader)";

fn key_element(name: &str, key_type: KeyType) -> Result<KeySchemaElement, StoreError> {
    KeySchemaElement::builder().attribute_name(name).key_type(key_type).build().map_err(build_failed)
}

fn attribute(name: &str, kind: ScalarAttributeType) -> Result<AttributeDefinition, StoreError> {
    AttributeDefinition::builder().attribute_name(name).attribute_type(kind).build().map_err(build_failed)
}

fn build_failed(e: BuildError) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn classify<E, R>(operation: &'static str, err: SdkError<E, R>) -> StoreError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    tracing::error!(error = %DisplayErrorContext(&err), operation, "DynamoDB request failed");
    match err {
        SdkError::TimeoutError(_) => StoreError::Timeout,
        other => StoreError::Backend(DisplayErrorContext(&other).to_string()),
    }
}

fn id_key(id: Uuid) -> AttributeValue {
    AttributeValue::S(id.to_string())
}

fn is_condition_failure<R>(err: &SdkError<UpdateItemError, R>) -> bool {
    err.as_service_error().is_some_and(UpdateItemError::is_conditional_check_failed_exception)
}

#[async_trait]
impl MessageRepository for DynamoMessageRepository {
    #[tracing::instrument(level = "debug", skip(self, message), fields(id = %message.id))]
    async fn put(&self, message: &Message) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(records::to_item(message)))
            .send()
            .await
            .map_err(|e| classify("PutItem", e))?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn get(&self, id: Uuid) -> Result<Option<Message>, StoreError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table)
            .key(ID, id_key(id))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| classify("GetItem", e))?;

        output.item().map(records::from_item).transpose()
    }

    #[tracing::instrument(level = "debug", skip(self, token), fields(resumed = token.is_some()))]
    async fn query_live_for_user(
        &self,
        username: &str,
        as_of: OffsetDateTime,
        token: Option<ContinuationToken>,
    ) -> Result<Page, StoreError> {
        let start_key = token.as_ref().map(records::decode_token).transpose()?;

        let output = self
            .client
            .query()
            .table_name(&self.table)
            .index_name(&self.index)
            .key_condition_expression("#username = :username AND #expiration >= :as_of")
            .expression_attribute_names("#username", USERNAME)
            .expression_attribute_names("#expiration", EXPIRATION_DATE)
            .expression_attribute_values(":username", AttributeValue::S(username.to_string()))
            .expression_attribute_values(":as_of", AttributeValue::N(encode_instant(as_of)))
            .set_limit(self.page_size)
            .set_exclusive_start_key(start_key)
            .send()
            .await
            .map_err(|e| classify("Query", e))?;

        let messages = output
            .items()
            .iter()
            .filter_map(|item| match records::from_item(item) {
                Ok(message) => Some(message),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping undecodable message item");
                    None
                }
            })
            .collect();
        let next = output.last_evaluated_key().map(records::encode_token).transpose()?;

        Ok(Page { messages, next })
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn mark_consumed(&self, id: Uuid, at: OffsetDateTime) -> Result<(), StoreError> {
        // The existence guard keeps an update from resurrecting an item the store already reaped.
        let result = self
            .client
            .update_item()
            .table_name(&self.table)
            .key(ID, id_key(id))
            .update_expression("SET #expiration = :at, #consumed_at = :at")
            .condition_expression("attribute_exists(#id)")
            .expression_attribute_names("#expiration", EXPIRATION_DATE)
            .expression_attribute_names("#consumed_at", CONSUMED_AT)
            .expression_attribute_names("#id", ID)
            .expression_attribute_values(":at", AttributeValue::N(encode_instant(at)))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_condition_failure(&e) => {
                tracing::debug!("Message vanished before it could be marked");
                Ok(())
            }
            Err(e) => Err(classify("UpdateItem", e)),
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn claim_consumption(
        &self,
        id: Uuid,
        reader: Uuid,
        at: OffsetDateTime,
    ) -> Result<ConsumeOutcome, StoreError> {
        let result = self
            .client
            .update_item()
            .table_name(&self.table)
            .key(ID, id_key(id))
            .update_expression("SET #expiration = :at, #consumed_at = :at, #consumed_by = :reader")
            .condition_expression(UNCLAIMED_OR_OURS)
            .expression_attribute_names("#id", ID)
            .expression_attribute_names("#expiration", EXPIRATION_DATE)
            .expression_attribute_names("#consumed_at", CONSUMED_AT)
            .expression_attribute_names("#consumed_by", CONSUMED_BY)
            .expression_attribute_values(":at", AttributeValue::N(encode_instant(at)))
            .expression_attribute_values(":reader", AttributeValue::S(reader.to_string()))
            .send()
            .await;

        match result {
            Ok(_) => Ok(ConsumeOutcome::Marked),
            Err(e) if is_condition_failure(&e) => Ok(ConsumeOutcome::AlreadyConsumed),
            Err(e) => Err(classify("UpdateItem", e)),
        }
    }
}
