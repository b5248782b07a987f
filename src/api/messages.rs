use crate::api::AppState;
use crate::api::dto::messages::{CreatedResponse, DeliveredResponse, MessageResponse};
use crate::domain::ids::looks_like_message_id;
use crate::error::{AppError, Result};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Creates a message from a JSON body of `{username, text, timeout?}`.
///
/// # Errors
/// Returns `AppError::BadRequest` if the body is not valid JSON.
/// Returns `AppError::Validation` if the body fails validation.
pub async fn create_message(State(state): State<AppState>, body: Bytes) -> Result<impl IntoResponse> {
    let raw = if body.trim_ascii().is_empty() {
        Value::Object(Map::new())
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            tracing::debug!(error = %e, "Rejected malformed JSON body");
            AppError::BadRequest("Malformed JSON body".to_string())
        })?
    };

    let id = state.message_service.create(&raw).await?;

    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

/// Reads one message by id, or consumes every live message for a username.
///
/// A segment shaped like a generated id is looked up without consuming;
/// anything else is treated as a username.
///
/// # Errors
/// Returns `AppError::NotFound` if an id lookup finds nothing.
/// Returns `AppError::Store` if the store fails.
pub async fn read_messages(State(state): State<AppState>, Path(id_or_username): Path<String>) -> Result<Response> {
    if looks_like_message_id(&id_or_username) {
        let id = Uuid::parse_str(&id_or_username).map_err(|_| AppError::NotFound)?;
        let message = state.message_service.get_by_id(id).await?;
        return Ok(Json(MessageResponse::try_from(message)?).into_response());
    }

    let delivered: Vec<DeliveredResponse> = state
        .message_service
        .list_and_consume(&id_or_username)
        .await?
        .into_iter()
        .map(DeliveredResponse::from)
        .collect();

    Ok(Json(delivered).into_response())
}

/// Liveness probe.
pub async fn ping() -> &'static str {
    "Hello World"
}
