use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Path every notification socket is served on.
pub const NOTIFICATION_PATH: &str = "/ws/notifications/";

/// One notification as carried in a text frame: `{"message": ...}`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationPayload {
    #[serde(
        default,
        deserialize_with = "coerce_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub message: Option<String>,
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Valid JSON whose top level is not an object (`[]`, `42`, `"x"`).
    /// Rejected rather than shown: a loose `.message` lookup on such a value
    /// would display "undefined".
    #[error("frame is valid JSON but not an object")]
    NotAnObject,
}

impl NotificationPayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }

    /// Decodes a frame body. Unknown fields are ignored and a missing
    /// `message` decodes to `None`.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(DecodeError::NotAnObject);
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

// Non-string messages are shown as their JSON text, so `{"a":1}` renders as
// `{"a":1}` and not as a generic object placeholder.
fn coerce_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    })
}
