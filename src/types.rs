use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Errored,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Errored => "errored",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// The parts of a key record the dashboard counters read.
///
/// Fields stay untyped JSON: a field of the wrong type must not stop the rest
/// of the record from being read. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeySnapshot {
    pub status: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSnapshot {
    /// `"Available"` or `"Taken"`: whether the student currently holds a key.
    pub key_status: Option<Value>,
    pub student_warning_status: Option<Value>,
    pub student_banned_status: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Counts {
    pub available: u64,
    pub taken: u64,
    pub banned: u64,
    pub warned: u64,
}

impl fmt::Display for Counts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "available={} taken={} banned={} warnings={}",
            self.available, self.taken, self.banned, self.warned
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CountsSnapshot {
    pub counts: Counts,
    pub fetched_at: DateTime<Utc>,
}

/// Body of every mutation response, success or failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

/// `POST booked-key` body.
#[derive(Debug, Serialize)]
pub struct BookKeyRequest<'a> {
    pub data: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<&'a str>,
}

/// `POST key/return` body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnKeyRequest<'a> {
    pub rfid: &'a str,
    pub key_number: &'a str,
}
