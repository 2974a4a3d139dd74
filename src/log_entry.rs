use crate::error::DecodeError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Server-assigned instant. Never validated or parsed further.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Text(String),
    Numeric(serde_json::Number),
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Text(text) => f.write_str(text),
            Timestamp::Numeric(number) => write!(f, "{}", number),
        }
    }
}

impl From<&str> for Timestamp {
    fn from(value: &str) -> Self {
        Timestamp::Text(value.to_string())
    }
}

/// A single entry from the server's log feed.
///
/// Fields are private: an entry is never modified after it has been decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    timestamp: Timestamp,
    message: String,
}

impl LogEntry {
    pub fn new(timestamp: impl Into<Timestamp>, message: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            message: message.into(),
        }
    }

    /// Decode one frame of the feed. Only a JSON object is an entry.
    pub fn decode(payload: &str) -> Result<Self, DecodeError> {
        match serde_json::from_str::<Value>(payload.trim())? {
            object @ Value::Object(_) => Ok(serde_json::from_value(object)?),
            _ => Err(DecodeError::NotAnObject),
        }
    }

    pub fn timestamp(&self) -> &Timestamp {
        &self.timestamp
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
