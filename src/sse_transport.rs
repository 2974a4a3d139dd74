use crate::error::TransportError;
use crate::transport::{EventSink, StreamTransport, TransportHandle, MAX_FRAME_BYTES};
use futures::StreamExt;
use log::{debug, info, warn};
use reqwest::header::{ACCEPT, CACHE_CONTROL};

/// Log feed served as `text/event-stream`.
#[derive(Clone, Default)]
pub struct SseTransport {
    client: reqwest::Client,
}

impl SseTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl StreamTransport for SseTransport {
    fn open(&self, endpoint: &str) -> TransportHandle {
        let client = self.client.clone();
        let endpoint = endpoint.to_string();
        TransportHandle::spawn(move |sink| run(client, endpoint, sink))
    }
}

async fn run(client: reqwest::Client, endpoint: String, sink: EventSink) {
    info!("Connecting to event stream: {}", endpoint);

    let response = match client
        .get(&endpoint)
        .header(ACCEPT, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => return sink.failed(e.into()).await,
    };

    if !response.status().is_success() {
        return sink.failed(TransportError::Status(response.status())).await;
    }

    if !sink.opened().await {
        return;
    }

    let mut body = response.bytes_stream();
    let mut decoder = SseDecoder::default();

    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => {
                for data in decoder.feed(&bytes) {
                    if !sink.payload(&data).await {
                        return;
                    }
                }
            }
            Err(e) => return sink.failed(e.into()).await,
        }
    }

    sink.closed().await
}

/// Incremental parser for the event-stream wire format.
///
/// Only `data` fields matter here; `event`, `id`, `retry` and comments are
/// skipped. Each dispatched event yields its data lines joined with `\n`.
/// A line or event larger than [`MAX_FRAME_BYTES`] is dropped whole.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    // prefix of `pending` already searched for a line end
    scanned: usize,
    data: Vec<String>,
    data_len: usize,
    // rest of an oversized line is being skipped
    skip_line: bool,
    // current event is dropped at the next blank line
    skip_event: bool,
}

impl SseDecoder {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[self.scanned..].iter().position(|&b| b == b'\n') {
            let end = self.scanned + offset;
            self.scanned = end + 1;
            let line_start = std::mem::replace(&mut start, end + 1);

            if self.skip_line {
                self.skip_line = false;
                continue;
            }

            let mut line = &self.pending[line_start..end];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            let line = String::from_utf8_lossy(line).into_owned();
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }

        self.pending.drain(..start);
        self.scanned = self.pending.len();

        if self.pending.len() > MAX_FRAME_BYTES {
            warn!("Dropping event-stream line longer than {} bytes", MAX_FRAME_BYTES);
            self.pending.clear();
            self.scanned = 0;
            self.skip_line = true;
            self.drop_event();
        }
        events
    }

    fn process_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            if std::mem::take(&mut self.skip_event) || self.data.is_empty() {
                return None;
            }
            let event = self.data.join("\n");
            self.data.clear();
            self.data_len = 0;
            return Some(event);
        }

        if self.skip_event || line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                self.data_len += value.len() + 1;
                if self.data_len > MAX_FRAME_BYTES {
                    warn!("Dropping event-stream event larger than {} bytes", MAX_FRAME_BYTES);
                    self.drop_event();
                } else {
                    self.data.push(value.to_string());
                }
            }
            other => debug!("Ignoring event-stream field: {}", other),
        }
        None
    }

    fn drop_event(&mut self) {
        self.data.clear();
        self.data_len = 0;
        self.skip_event = true;
    }
}
