use crate::transport::{EventSink, StreamTransport, TransportHandle, MAX_FRAME_BYTES};
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::TcpStream;

/// Log feed as newline-delimited JSON over a plain TCP socket (`host:port`).
#[derive(Clone, Copy, Default)]
pub struct SocketTransport;

impl StreamTransport for SocketTransport {
    fn open(&self, endpoint: &str) -> TransportHandle {
        let endpoint = endpoint.to_string();
        TransportHandle::spawn(move |sink| run(endpoint, sink))
    }
}

async fn run(endpoint: String, sink: EventSink) {
    info!("Connecting to log socket: {}", endpoint);

    let stream = match TcpStream::connect(&endpoint).await {
        Ok(stream) => stream,
        Err(e) => return sink.failed(e.into()).await,
    };

    if !sink.opened().await {
        return;
    }

    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    // rest of an oversized line is being skipped
    let mut discarding = false;

    loop {
        line.clear();
        let read = (&mut reader)
            .take(MAX_FRAME_BYTES as u64 + 1)
            .read_until(b'\n', &mut line)
            .await;

        match read {
            Ok(0) => return sink.closed().await,
            Ok(_) => {
                let terminated = line.last() == Some(&b'\n');
                if discarding {
                    discarding = !terminated;
                    continue;
                }
                if !terminated && line.len() > MAX_FRAME_BYTES {
                    warn!("Dropping log line longer than {} bytes", MAX_FRAME_BYTES);
                    discarding = true;
                    continue;
                }

                if terminated {
                    line.pop();
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                }
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                if !sink.frame(&line).await {
                    return;
                }
            }
            Err(e) => return sink.failed(e.into()).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_entry::LogEntry;
    use crate::transport::TransportEvent;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_reads_lines_until_eof() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket
                .write_all(
                    b"{\"timestamp\":\"00:00:01\",\"message\":\"boot\"}\n\
                      not json\n\
                      \n\
                      {\"timestamp\":\"00:00:02\",\"message\":\"ready\"}\n",
                )
                .await
                .unwrap();
        });

        let mut handle = SocketTransport.open(&addr.to_string());

        assert!(matches!(handle.next().await, Some(TransportEvent::Open)));
        match handle.next().await {
            Some(TransportEvent::Message(entry)) => {
                assert_eq!(entry, LogEntry::new("00:00:01", "boot"))
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match handle.next().await {
            Some(TransportEvent::Message(entry)) => {
                assert_eq!(entry, LogEntry::new("00:00:02", "ready"))
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(handle.next().await, Some(TransportEvent::Closed)));
        assert!(handle.next().await.is_none());

        server.await.unwrap();
    }

    async fn serve_bytes(payload: Vec<u8>) -> (String, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(&payload).await.unwrap();
        });
        (addr.to_string(), server)
    }

    async fn collect_messages(handle: &mut TransportHandle) -> Vec<String> {
        let mut messages = Vec::new();
        while let Some(event) = handle.next().await {
            match event {
                TransportEvent::Open => {}
                TransportEvent::Message(entry) => messages.push(entry.message().to_string()),
                TransportEvent::Closed => break,
                TransportEvent::Error(e) => panic!("connection failed: {}", e),
            }
        }
        messages
    }

    #[tokio::test]
    async fn test_bad_frames_do_not_end_the_connection() {
        let mut payload = Vec::new();
        payload.extend_from_slice(b"{\"timestamp\":\"1\",\"message\":\"a\"}\n");
        payload.extend_from_slice(b"\xff\xfe\n");
        payload.extend_from_slice(b"[\"2\",\"array\"]\n");
        payload.extend_from_slice(b"{\"timestamp\":\"3\",\"message\":\"b\"}\r\n");
        let (addr, server) = serve_bytes(payload).await;

        let mut handle = SocketTransport.open(&addr);

        assert_eq!(collect_messages(&mut handle).await, vec!["a", "b"]);
        assert!(handle.next().await.is_none());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_oversized_line_is_skipped() {
        let mut payload = Vec::new();
        payload.extend_from_slice(b"{\"timestamp\":\"1\",\"message\":\"");
        payload.extend(std::iter::repeat(b'x').take(MAX_FRAME_BYTES * 3));
        payload.extend_from_slice(b"\"}\n");
        payload.extend_from_slice(b"{\"timestamp\":\"2\",\"message\":\"after\"}\n");
        let (addr, server) = serve_bytes(payload).await;

        let mut handle = SocketTransport.open(&addr);

        assert_eq!(collect_messages(&mut handle).await, vec!["after"]);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_refused_connection_is_a_single_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut handle = SocketTransport.open(&addr.to_string());

        assert!(matches!(handle.next().await, Some(TransportEvent::Error(_))));
        assert!(handle.next().await.is_none());
    }
}
