//! Encoding between domain messages and store items.
//!
//! Expiration instants are epoch milliseconds. Sub-millisecond precision is
//! kept as a fractional part so that two instants inside the same millisecond
//! still order correctly in the index.

use crate::adapters::store::{ContinuationToken, StoreError};
use crate::domain::message::Message;
use aws_sdk_dynamodb::types::AttributeValue;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use time::OffsetDateTime;
use uuid::Uuid;

pub const ID: &str = "id";
pub const USERNAME: &str = "username";
pub const TEXT: &str = "text";
pub const EXPIRATION_DATE: &str = "expiration_date";
/// Set once a message has been consumed; absent on fresh items.
pub const CONSUMED_AT: &str = "consumed_at";
/// The reader that claimed the message in exclusive delivery.
pub const CONSUMED_BY: &str = "consumed_by";

const NANOS_PER_MILLI: i128 = 1_000_000;
const FRACTION_DIGITS: usize = 6;

pub type Item = HashMap<String, AttributeValue>;

/// Formats an instant as epoch milliseconds. Instants before the epoch clamp to it.
#[must_use]
pub fn encode_instant(instant: OffsetDateTime) -> String {
    let nanos = instant.unix_timestamp_nanos().max(0);
    let millis = nanos / NANOS_PER_MILLI;
    let fraction = nanos % NANOS_PER_MILLI;
    if fraction == 0 { millis.to_string() } else { format!("{millis}.{fraction:06}") }
}

/// Parses epoch milliseconds, with or without a fractional part.
///
/// # Errors
/// Returns `StoreError::Malformed` if the value is not a plain decimal in range.
pub fn decode_instant(raw: &str) -> Result<OffsetDateTime, StoreError> {
    let malformed = || StoreError::Malformed(format!("{EXPIRATION_DATE} {raw:?} is not epoch milliseconds"));

    let (whole, fraction) = raw.split_once('.').unwrap_or((raw, ""));
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }

    let millis: i128 = whole.parse().map_err(|_| malformed())?;
    let padded: String = fraction.chars().chain(std::iter::repeat('0')).take(FRACTION_DIGITS).collect();
    let sub_millis: i128 = padded.parse().map_err(|_| malformed())?;

    let nanos = if whole.starts_with('-') {
        millis * NANOS_PER_MILLI - sub_millis
    } else {
        millis * NANOS_PER_MILLI + sub_millis
    };
    OffsetDateTime::from_unix_timestamp_nanos(nanos).map_err(|_| malformed())
}

#[must_use]
pub fn to_item(message: &Message) -> Item {
    HashMap::from([
        (ID.to_string(), AttributeValue::S(message.id.to_string())),
        (USERNAME.to_string(), AttributeValue::S(message.username.clone())),
        (TEXT.to_string(), AttributeValue::S(message.text.clone())),
        (EXPIRATION_DATE.to_string(), AttributeValue::N(encode_instant(message.expiration_date))),
    ])
}

/// Decodes a full item.
///
/// # Errors
/// Returns `StoreError::Malformed` if an attribute is missing or has the wrong type.
pub fn from_item(item: &Item) -> Result<Message, StoreError> {
    let id = string_attr(item, ID)?;
    let id = Uuid::parse_str(id).map_err(|e| StoreError::Malformed(format!("{ID} {id:?}: {e}")))?;
    let expiration_date = item
        .get(EXPIRATION_DATE)
        .and_then(|v| v.as_n().ok())
        .ok_or_else(|| missing(EXPIRATION_DATE))
        .and_then(|raw| decode_instant(raw))?;

    Ok(Message {
        id,
        username: string_attr(item, USERNAME)?.clone(),
        text: string_attr(item, TEXT)?.clone(),
        expiration_date,
    })
}

fn string_attr<'a>(item: &'a Item, name: &str) -> Result<&'a String, StoreError> {
    item.get(name).and_then(|v| v.as_s().ok()).ok_or_else(|| missing(name))
}

fn missing(name: &str) -> StoreError {
    StoreError::Malformed(format!("missing or mistyped attribute {name}"))
}

#[derive(Debug, Serialize, Deserialize)]
enum KeyAttribute {
    S(String),
    N(String),
}

/// Wraps a store-issued last-evaluated key into an opaque token.
///
/// # Errors
/// Returns `StoreError::Malformed` if the key holds attribute types other than strings and numbers.
pub fn encode_token(key: &Item) -> Result<ContinuationToken, StoreError> {
    let attrs = key
        .iter()
        .map(|(name, value)| {
            let attr = match value {
                AttributeValue::S(s) => KeyAttribute::S(s.clone()),
                AttributeValue::N(n) => KeyAttribute::N(n.clone()),
                other => return Err(StoreError::Malformed(format!("unexpected key attribute {name}: {other:?}"))),
            };
            Ok((name.clone(), attr))
        })
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    let json = serde_json::to_vec(&attrs).map_err(|e| StoreError::Malformed(e.to_string()))?;
    Ok(ContinuationToken::new(URL_SAFE_NO_PAD.encode(json)))
}

/// Unwraps a token produced by [`encode_token`] back into a start key.
///
/// # Errors
/// Returns `StoreError::InvalidToken` if the token was not produced by `encode_token`.
pub fn decode_token(token: &ContinuationToken) -> Result<Item, StoreError> {
    let json = URL_SAFE_NO_PAD.decode(token.as_str()).map_err(|_| StoreError::InvalidToken)?;
    let attrs: BTreeMap<String, KeyAttribute> = serde_json::from_slice(&json).map_err(|_| StoreError::InvalidToken)?;

    Ok(attrs
        .into_iter()
        .map(|(name, attr)| {
            let value = match attr {
                KeyAttribute::S(s) => AttributeValue::S(s),
                KeyAttribute::N(n) => AttributeValue::N(n),
            };
            (name, value)
        })
        .collect())
}
