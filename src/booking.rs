//! Key booking and return.
//!
//! Booking is a two-step exchange when the server wants a physical key
//! confirmed: the first request answers with `code: "Camera activated"`, the
//! operator scans the key's QR code, and the scanned value is posted back
//! together with the RFID. The scanner hands its value over through a
//! [`ScanHandle`]; the flow waits on the matching [`ScanReceiver`].

use crate::api::LockerApi;
use crate::error::FetchError;
use crate::types::ApiMessage;
use anyhow::Result;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

pub const CAMERA_ACTIVATED: &str = "Camera activated";

const SCAN_CHANNEL_SIZE: usize = 8;

/// Handle for submitting scanned key codes
#[derive(Clone)]
pub struct ScanHandle {
    scan_tx: mpsc::Sender<String>,
}

impl ScanHandle {
    pub async fn submit(&self, value: String) -> Result<()> {
        self.scan_tx
            .send(value)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to hand over scanned key: {}", e))
    }
}

pub struct ScanReceiver {
    scan_rx: mpsc::Receiver<String>,
}

pub fn scan_channel() -> (ScanHandle, ScanReceiver) {
    let (scan_tx, scan_rx) = mpsc::channel(SCAN_CHANNEL_SIZE);
    (ScanHandle { scan_tx }, ScanReceiver { scan_rx })
}

pub struct BookingFlow {
    api: LockerApi,
    scans: ScanReceiver,
    scan_timeout: Duration,
}

impl BookingFlow {
    pub fn new(api: LockerApi, scans: ScanReceiver, scan_timeout: Duration) -> Self {
        Self {
            api,
            scans,
            scan_timeout,
        }
    }

    pub async fn book(&mut self, rfid: &str) -> Result<ApiMessage, FetchError> {
        let rfid = rfid.trim();
        if rfid.is_empty() {
            return Err(FetchError::Validation("RFID is required".to_string()));
        }

        // drop anything scanned before this booking started
        while let Ok(stale) = self.scans.scan_rx.try_recv() {
            debug!("Discarding stale scan: {}", stale);
        }

        let reply = self.api.book_key(rfid, None).await?;
        if reply.code.as_deref() != Some(CAMERA_ACTIVATED) {
            return Ok(reply);
        }

        info!("{} - waiting up to {:?} for a key scan", reply.message, self.scan_timeout);
        let key = match timeout(self.scan_timeout, self.scans.scan_rx.recv()).await {
            Ok(Some(key)) => key,
            Ok(None) => {
                return Err(FetchError::Validation(
                    "Scanner disconnected before a key was scanned".to_string(),
                ))
            }
            Err(_) => {
                warn!("No key scanned for RFID {}", rfid);
                return Err(FetchError::ScanTimeout(self.scan_timeout));
            }
        };

        info!("Scanned key {}, confirming booking", key);
        self.api.book_key(rfid, Some(key.trim())).await
    }

    pub async fn return_key(&self, rfid: &str, key_number: &str) -> Result<ApiMessage, FetchError> {
        let (rfid, key_number) = (rfid.trim(), key_number.trim());
        if rfid.is_empty() && key_number.is_empty() {
            return Err(FetchError::Validation(
                "Please provide either RFID or Key Number".to_string(),
            ));
        }
        self.api.return_key(rfid, key_number).await
    }
}
