//! # WebSocket Transport
//!
//! [`Connector`] and [`MessageStream`] over `tokio-tungstenite`.
//!
//! Text and binary frames are both surfaced as raw bytes; ping/pong frames are
//! skipped and a close frame reads as end of stream.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use super::{Connector, MessageStream};
use crate::error::TransportError;

/// Opens WebSocket connections
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn MessageStream>, TransportError> {
        debug!("Connecting to {}", endpoint);

        let (inner, _response) =
            connect_async(endpoint)
                .await
                .map_err(|e| TransportError::ConnectFailed {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                })?;

        info!("WebSocket connected to {}", endpoint);
        Ok(Box::new(WsStream {
            inner,
            endpoint: endpoint.to_string(),
            closed: false,
        }))
    }
}

/// One open WebSocket connection
pub struct WsStream {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
    endpoint: String,
    closed: bool,
}

impl std::fmt::Debug for WsStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsStream")
            .field("endpoint", &self.endpoint)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl WsStream {
    /// Endpoint this stream is connected to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl MessageStream for WsStream {
    async fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.inner
            .send(Message::Text(text.to_owned().into()))
            .await
            .map_err(map_ws_error)?;
        debug!("Sent {} bytes to {}", text.len(), self.endpoint);
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        if self.closed {
            return Ok(None);
        }
        loop {
            match self.inner.next().await {
                None => return Ok(None),
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(Bytes::copy_from_slice(text.as_str().as_bytes())))
                }
                Some(Ok(Message::Binary(data))) => return Ok(Some(data)),
                Some(Ok(Message::Close(frame))) => {
                    debug!("Close frame from {}: {:?}", self.endpoint, frame);
                    return Ok(None);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(map_ws_error(e)),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.inner.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => {
                debug!("Closed connection to {}", self.endpoint);
                Ok(())
            }
            Err(e) => Err(map_ws_error(e)),
        }
    }
}

fn map_ws_error(error: WsError) -> TransportError {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
        other => TransportError::Io(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_errors_map_to_closed() {
        assert_eq!(map_ws_error(WsError::ConnectionClosed), TransportError::Closed);
        assert_eq!(map_ws_error(WsError::AlreadyClosed), TransportError::Closed);
    }

    #[test]
    fn test_other_errors_map_to_io() {
        let err = map_ws_error(WsError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "pipe",
        )));
        assert!(matches!(err, TransportError::Io(_)));
    }

    #[tokio::test]
    async fn test_loopback_frames_and_close() {
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();

            let prompt = ws.next().await.unwrap().unwrap();
            assert_eq!(prompt, Message::Text("payload".into()));

            ws.send(Message::Text(r#"{"temperature": 18}"#.into())).await.unwrap();
            ws.send(Message::Ping(Bytes::from_static(b"keepalive"))).await.unwrap();
            ws.send(Message::Binary(Bytes::from_static(b"\x01\x02"))).await.unwrap();
            ws.send(Message::Close(None)).await.unwrap();

            // Drain until the client finishes the closing handshake
            while let Some(Ok(_)) = ws.next().await {}
        });

        let endpoint = format!("ws://{}/ws", addr);
        let mut stream = WsConnector::new().connect(&endpoint).await.unwrap();
        stream.send_text("payload").await.unwrap();

        assert_eq!(
            stream.recv().await.unwrap(),
            Some(Bytes::from_static(br#"{"temperature": 18}"#))
        );
        // Ping is skipped
        assert_eq!(stream.recv().await.unwrap(), Some(Bytes::from_static(b"\x01\x02")));
        assert_eq!(stream.recv().await.unwrap(), None);

        stream.close().await.unwrap();
        stream.close().await.unwrap();
        assert_eq!(stream.recv().await.unwrap(), None);
        assert_eq!(stream.send_text("late").await, Err(TransportError::Closed));

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_endpoint_fails() {
        // Port 9 on localhost is the discard service and is almost never listening
        let result = WsConnector::new().connect("ws://127.0.0.1:9/ws").await;
        match result {
            Err(TransportError::ConnectFailed { endpoint, .. }) => {
                assert_eq!(endpoint, "ws://127.0.0.1:9/ws");
            }
            Err(other) => panic!("Expected ConnectFailed, got: {:?}", other),
            Ok(_) => panic!("Expected connection failure"),
        }
    }

    #[tokio::test]
    async fn test_connect_rejects_non_websocket_url() {
        let result = WsConnector::new().connect("http://127.0.0.1:9/").await;
        assert!(matches!(result, Err(TransportError::ConnectFailed { .. })));
    }
}
