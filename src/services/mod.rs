use crate::adapters::store::StoreError;
use std::time::Duration;

pub mod consumption;
pub mod message_service;

/// Bounds a single store call; an elapsed deadline is a store fault like any other.
pub(crate) async fn with_deadline<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    tokio::time::timeout(limit, call).await.unwrap_or(Err(StoreError::Timeout))
}
