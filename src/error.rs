use thiserror::Error;

/// Connection-level failure. Always answered with a reconnect.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned non-success status: {0}")]
    Status(reqwest::StatusCode),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A payload that is not a `{ timestamp, message }` object.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload is not a JSON object")]
    NotAnObject,
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned non-success status: {0}")]
    Status(reqwest::StatusCode),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Server rejected request: {0}")]
    Rejected(String),

    #[error("{0}")]
    Validation(String),

    #[error("No key scanned within {0:?}")]
    ScanTimeout(std::time::Duration),
}
