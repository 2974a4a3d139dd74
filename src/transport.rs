//! Connection abstraction for the log feed.
//!
//! A [`StreamTransport`] opens one connection per call and reports everything
//! that happens on it as [`TransportEvent`]s through a [`TransportHandle`]. The
//! reconnect logic in `log_client` only ever sees these events, so it does not
//! care whether the feed is served as Server-Sent Events or over a raw socket.

use crate::error::TransportError;
use crate::log_entry::LogEntry;
use log::warn;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const EVENT_CHANNEL_SIZE: usize = 256;

/// Largest single frame (line or event) a transport will hold in memory.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Events reported for a single opened connection.
#[derive(Debug)]
pub enum TransportEvent {
    Open,
    Message(LogEntry),
    Error(TransportError),
    Closed,
}

impl TransportEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportEvent::Error(_) | TransportEvent::Closed)
    }
}

pub trait StreamTransport: Send + Sync + 'static {
    fn open(&self, endpoint: &str) -> TransportHandle;
}

/// Which concrete transport a deployment talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Sse,
    Socket,
}

/// Receiving side of one connection epoch.
///
/// Yields at most one terminal event; afterwards `next` returns `None`.
/// Dropping the handle aborts the connection task.
pub struct TransportHandle {
    events: mpsc::Receiver<TransportEvent>,
    task: Option<JoinHandle<()>>,
    terminated: bool,
}

impl TransportHandle {
    pub fn new(events: mpsc::Receiver<TransportEvent>, task: Option<JoinHandle<()>>) -> Self {
        Self {
            events,
            task,
            terminated: false,
        }
    }

    /// Spawn `run` as the connection task, handing it an [`EventSink`].
    pub fn spawn<F, Fut>(run: F) -> Self
    where
        F: FnOnce(EventSink) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let task = tokio::spawn(run(EventSink { tx }));
        Self::new(rx, Some(task))
    }

    pub async fn next(&mut self) -> Option<TransportEvent> {
        if self.terminated {
            return None;
        }
        match self.events.recv().await {
            Some(event) => {
                if event.is_terminal() {
                    self.terminated = true;
                }
                Some(event)
            }
            // Sender vanished without a terminal event (task panicked or was
            // aborted): report it as a close so the caller still sees one.
            None => {
                self.terminated = true;
                Some(TransportEvent::Closed)
            }
        }
    }

    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.events.close();
        self.terminated = true;
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Sending side used by transport implementations.
pub struct EventSink {
    tx: mpsc::Sender<TransportEvent>,
}

impl EventSink {
    /// Returns `false` once the handle has been dropped.
    pub async fn opened(&self) -> bool {
        self.tx.send(TransportEvent::Open).await.is_ok()
    }

    /// Decode one payload and forward it. Malformed payloads are dropped here.
    pub async fn payload(&self, payload: &str) -> bool {
        match LogEntry::decode(payload) {
            Ok(entry) => self.tx.send(TransportEvent::Message(entry)).await.is_ok(),
            Err(e) => {
                warn!("Dropping undecodable log payload {:?}: {}", payload, e);
                !self.tx.is_closed()
            }
        }
    }

    /// Like [`EventSink::payload`] for raw bytes; invalid UTF-8 is dropped too.
    pub async fn frame(&self, bytes: &[u8]) -> bool {
        match std::str::from_utf8(bytes) {
            Ok(payload) => self.payload(payload).await,
            Err(e) => {
                warn!("Dropping log payload that is not UTF-8 ({} bytes): {}", bytes.len(), e);
                !self.tx.is_closed()
            }
        }
    }

    pub async fn failed(self, error: TransportError) {
        let _ = self.tx.send(TransportEvent::Error(error)).await;
    }

    pub async fn closed(self) {
        let _ = self.tx.send(TransportEvent::Closed).await;
    }
}
