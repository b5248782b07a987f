use crate::domain::message::NewMessage;
use serde_json::{Map, Value};
use thiserror::Error;

/// Every reason a creation request was rejected, in field order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Validation Errors: {}", .reasons.join("; "))]
pub struct ValidationErrors {
    reasons: Vec<String>,
}

impl ValidationErrors {
    #[must_use]
    pub fn single(reason: impl Into<String>) -> Self {
        Self { reasons: vec![reason.into()] }
    }

    #[must_use]
    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    #[must_use]
    pub fn into_reasons(self) -> Vec<String> {
        self.reasons
    }
}

/// Checks a raw creation body and normalizes it.
///
/// All fields are checked even after an earlier one fails, so the caller sees
/// the complete set of problems at once. A body that is not a JSON object is
/// treated as an object with no fields.
///
/// # Errors
/// Returns `ValidationErrors` listing every failed rule.
pub fn validate(raw: &Value, default_ttl_seconds: u64) -> Result<NewMessage, ValidationErrors> {
    let empty = Map::new();
    let fields = raw.as_object().unwrap_or(&empty);
    let mut reasons = Vec::new();

    let username = required_string(fields, "username", "Username", &mut reasons);
    let text = required_string(fields, "text", "Text", &mut reasons);

    #[allow(clippy::cast_precision_loss)]
    let ttl_seconds = match fields.get("timeout") {
        None => Some(default_ttl_seconds as f64),
        Some(Value::Number(n)) => n.as_f64(),
        Some(_) => None,
    };
    if ttl_seconds.is_none() {
        reasons.push("Timeout must be a number".to_string());
    }

    match (username, text, ttl_seconds) {
        (Some(username), Some(text), Some(ttl_seconds)) if reasons.is_empty() => {
            Ok(NewMessage { username, text, ttl_seconds })
        }
        _ => Err(ValidationErrors { reasons }),
    }
}

fn required_string(fields: &Map<String, Value>, key: &str, label: &str, reasons: &mut Vec<String>) -> Option<String> {
    match fields.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        None | Some(Value::String(_)) => {
            reasons.push(format!("{label} is required"));
            None
        }
        Some(Value::Array(items)) if joins_to_empty(items) => {
            reasons.push(format!("{label} is required"));
            None
        }
        Some(_) => {
            reasons.push(format!("{label} must be a string"));
            None
        }
    }
}

/// Whether an array reads as empty text when its elements are joined with commas.
/// Two or more elements always leave a separator behind.
fn joins_to_empty(items: &[Value]) -> bool {
    match items {
        [] | [Value::Null] => true,
        [Value::String(s)] => s.is_empty(),
        [Value::Array(inner)] => joins_to_empty(inner),
        _ => false,
    }
}
