use crate::domain::message::{DeliveredMessage, Message};
use crate::error::AppError;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub username: String,
    pub text: String,
    pub expiration_date: String,
}

impl TryFrom<Message> for MessageResponse {
    type Error = AppError;

    fn try_from(message: Message) -> Result<Self, Self::Error> {
        let expiration_date = message.expiration_date.format(&Rfc3339).map_err(|e| {
            tracing::error!(error = %e, id = %message.id, "Expiration date is not representable as RFC 3339");
            AppError::Internal
        })?;

        Ok(Self { id: message.id, username: message.username, text: message.text, expiration_date })
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct DeliveredResponse {
    pub id: Uuid,
    pub text: String,
}

impl From<DeliveredMessage> for DeliveredResponse {
    fn from(message: DeliveredMessage) -> Self {
        Self { id: message.id, text: message.text }
    }
}
