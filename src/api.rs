use crate::error::FetchError;
use crate::types::{ApiMessage, BookKeyRequest, ReturnKeyRequest};
use log::{debug, info};
use serde::Serialize;
use serde_json::Value;

const STUDENTS_PATH: &str = "student/stack";
const KEYS_PATH: &str = "key/all";
const BOOK_KEY_PATH: &str = "student/booked-key";
const RETURN_KEY_PATH: &str = "key/return";

/// HTTP client for the locker server's REST endpoints.
#[derive(Clone)]
pub struct LockerApi {
    client: reqwest::Client,
    base_url: String,
}

impl LockerApi {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    pub async fn fetch_students(&self) -> Result<Value, FetchError> {
        self.fetch_collection(STUDENTS_PATH).await
    }

    pub async fn fetch_keys(&self) -> Result<Value, FetchError> {
        self.fetch_collection(KEYS_PATH).await
    }

    /// Raw JSON of a collection. Shape checking is left to the projector.
    async fn fetch_collection(&self, path: &str) -> Result<Value, FetchError> {
        let url = self.url(path);
        debug!("Fetching {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        // servers behind a proxy sometimes answer with an HTML error page
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn book_key(&self, rfid: &str, key: Option<&str>) -> Result<ApiMessage, FetchError> {
        info!("Booking key for RFID {}", rfid);
        self.post(BOOK_KEY_PATH, &BookKeyRequest { data: rfid, key })
            .await
    }

    pub async fn return_key(&self, rfid: &str, key_number: &str) -> Result<ApiMessage, FetchError> {
        info!("Returning key (rfid={:?}, key={:?})", rfid, key_number);
        self.post(RETURN_KEY_PATH, &ReturnKeyRequest { rfid, key_number })
            .await
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<ApiMessage, FetchError> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return Ok(serde_json::from_str(&body)?);
        }

        match serde_json::from_str::<ApiMessage>(&body) {
            Ok(message) if !message.message.is_empty() => Err(FetchError::Rejected(message.message)),
            _ => Err(FetchError::Status(status)),
        }
    }
}
