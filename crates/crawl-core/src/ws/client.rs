//! Single WebSocket connection implementing [`Transport`].
//!
//! A `WsTransport` only moves frames. Reconnect, subscription and ping
//! scheduling live in the connection manager that owns it, so one manager can
//! drive a real socket or a test double the same way.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::ConnectionError;
use crate::transport::{Transport, WireMessage};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Ping payload format, varies by exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum PingPayload {
    /// Send a text frame (e.g. OKX sends `"ping"`).
    Text(String),
    /// Send a JSON object as text (e.g. Bybit `{"op":"ping"}`).
    Json(serde_json::Value),
    /// Use the standard WebSocket ping frame.
    WebSocketPing,
}

impl PingPayload {
    pub fn to_wire(&self) -> WireMessage {
        match self {
            Self::Text(t) => WireMessage::Text(t.clone()),
            Self::Json(j) => WireMessage::Text(j.to_string()),
            Self::WebSocketPing => WireMessage::Ping,
        }
    }
}

/// A connected WebSocket.
pub struct WsTransport {
    url: String,
    stream: WsStream,
}

impl WsTransport {
    /// Establish a (TLS) WebSocket connection, sending `extra_headers` with
    /// the handshake. TCP connect, TLS and the upgrade together must finish
    /// within `timeout`.
    pub async fn connect(
        url: &str,
        extra_headers: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, ConnectionError> {
        use tokio_tungstenite::tungstenite::client::IntoClientRequest;
        use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};

        let mut request =
            url.into_client_request().map_err(|e| ConnectionError::Connect(format!("{url}: {e}")))?;
        for (key, value) in extra_headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| ConnectionError::Connect(format!("header {key}: {e}")))?;
            let value = value
                .parse::<HeaderValue>()
                .map_err(|e| ConnectionError::Connect(format!("header {key}: {e}")))?;
            request.headers_mut().insert(name, value);
        }

        let (stream, _response) = tokio::time::timeout(timeout, tokio_tungstenite::connect_async(request))
            .await
            .map_err(|_| ConnectionError::Timeout)?
            .map_err(|e| ConnectionError::Connect(format!("{}: {e}", extract_host(url))))?;
        Ok(Self { url: url.to_string(), stream })
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, msg: WireMessage) -> Result<(), ConnectionError> {
        let frame = match msg {
            WireMessage::Text(t) => Message::Text(t.into()),
            WireMessage::Ping => Message::Ping(Vec::new().into()),
        };
        self.stream.send(frame).await.map_err(|e| ConnectionError::Send(e.to_string()))
    }

    async fn next_frame(&mut self) -> Option<Result<Vec<u8>, ConnectionError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_bytes().to_vec())),
                Ok(Message::Binary(data)) => return Some(Ok(data.to_vec())),
                Ok(Message::Ping(data)) => {
                    let _ = self.stream.send(Message::Pong(data)).await;
                }
                Ok(Message::Close(frame)) => {
                    debug!("close frame from {}: {frame:?}", self.url);
                    return None;
                }
                Ok(_) => {} // Pong, raw Frame: ignore
                Err(e) => return Some(Err(ConnectionError::Read(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

/// Extract the host from a URL string.
fn extract_host(url: &str) -> String {
    url::Url::parse(url).map(|u| u.host_str().unwrap_or("").to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_payload_wire_format() {
        assert_eq!(PingPayload::Text("ping".into()).to_wire(), WireMessage::Text("ping".into()));
        assert_eq!(
            PingPayload::Json(serde_json::json!({"op": "ping"})).to_wire(),
            WireMessage::Text(r#"{"op":"ping"}"#.into())
        );
        assert_eq!(PingPayload::WebSocketPing.to_wire(), WireMessage::Ping);
    }

    #[tokio::test]
    async fn stalled_handshake_times_out() {
        // Accepts TCP but never answers the upgrade request.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let started = std::time::Instant::now();
        let result = WsTransport::connect(&format!("ws://{addr}/ws"), &HashMap::new(), Duration::from_millis(200)).await;
        assert!(matches!(result, Err(ConnectionError::Timeout)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn host_extraction() {
        assert_eq!(extract_host("wss://stream.binance.com:9443/stream"), "stream.binance.com");
        assert_eq!(extract_host("not a url"), "");
    }
}
