//! WebSocket chat transport
//!
//! Authenticates with the session credential in the `Cookie` header and
//! identifies itself with a fixed `User-Agent` label. Inbound frames are
//! drained and ignored; only close and error matter to the bridge.

use crate::transport::{ChatSink, ChatTransport, ConnectionMonitor};
use async_trait::async_trait;
use craftbridge_core::{BridgeError, Result};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::{COOKIE, USER_AGENT};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Configuration for the WebSocket transport
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// `ws://` or `wss://` endpoint of the chat room
    pub url: String,
    /// Value sent as `User-Agent`
    pub client_label: String,
}

impl WebSocketConfig {
    /// Create config for an endpoint with the default client label
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client_label: concat!("craftbridge/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// [`ChatTransport`] over `tokio-tungstenite`
pub struct WebSocketTransport {
    config: WebSocketConfig,
}

impl WebSocketTransport {
    pub fn new(config: WebSocketConfig) -> Self {
        Self { config }
    }
}

fn header_value(value: &str, name: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| BridgeError::Transport(format!("invalid {} header: {}", name, e)))
}

#[async_trait]
impl ChatTransport for WebSocketTransport {
    async fn connect(
        &self,
        credential: &str,
        monitor: ConnectionMonitor,
    ) -> Result<Box<dyn ChatSink>> {
        let mut request = self
            .config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| BridgeError::Transport(format!("invalid chat URL: {}", e)))?;
        let headers = request.headers_mut();
        headers.insert(COOKIE, header_value(credential, "cookie")?);
        headers.insert(USER_AGENT, header_value(&self.config.client_label, "user-agent")?);

        info!("Connecting to chat at {}", self.config.url);
        let (stream, response) = connect_async(request)
            .await
            .map_err(|e| BridgeError::Transport(format!("WebSocket connect failed: {}", e)))?;
        debug!("Chat handshake status {}", response.status());

        let (sink, mut source) = stream.split();
        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Close(frame)) => {
                        debug!("Chat peer sent close: {:?}", frame);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Chat connection error: {}", e);
                        monitor.error(e.to_string());
                        return;
                    }
                }
            }
            monitor.closed();
        });

        Ok(Box::new(WebSocketSink { sink }))
    }
}

/// Write half of a WebSocket connection
struct WebSocketSink {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl ChatSink for WebSocketSink {
    async fn send(&mut self, text: &str) -> Result<()> {
        self.sink
            .send(Message::text(text))
            .await
            .map_err(|e| BridgeError::Transport(format!("WebSocket send failed: {}", e)))
    }

    async fn close(&mut self) {
        if let Err(e) = self.sink.close().await {
            debug!("WebSocket close: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportEvent;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::{mpsc, oneshot};
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
    use tokio_tungstenite::tungstenite::http::HeaderMap;

    /// Single-connection chat server
    ///
    /// Reports the handshake headers and the first frame, then either closes
    /// cleanly or drops the socket.
    async fn chat_server(clean_close: bool) -> (String, oneshot::Receiver<(HeaderMap, Message)>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/room", listener.local_addr().unwrap());
        let (report_tx, report_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (headers_tx, mut headers_rx) = mpsc::unbounded_channel();
            let callback = move |request: &Request,
                                 response: Response|
                  -> std::result::Result<Response, ErrorResponse> {
                let _ = headers_tx.send(request.headers().clone());
                Ok(response)
            };
            let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
                .await
                .unwrap();
            let headers = headers_rx.recv().await.unwrap();
            let frame = ws.next().await.unwrap().unwrap();
            if clean_close {
                ws.close(None).await.unwrap();
            }
            let _ = report_tx.send((headers, frame));
        });

        (url, report_rx)
    }

    fn transport(url: String) -> WebSocketTransport {
        WebSocketTransport::new(WebSocketConfig {
            url,
            client_label: "craftbridge-test/1".to_string(),
        })
    }

    #[tokio::test]
    async fn test_connect_sends_credential_and_text_frames() {
        let (url, server) = chat_server(true).await;
        let (events_tx, mut events) = mpsc::unbounded_channel();

        let mut sink = transport(url)
            .connect("session=abc.def.ghi", ConnectionMonitor::new(7, events_tx))
            .await
            .unwrap();
        tokio_test::assert_ok!(sink.send("[INFO] Steve joined the game").await);

        let (headers, frame) = timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(headers.get("cookie").unwrap(), "session=abc.def.ghi");
        assert_eq!(headers.get("user-agent").unwrap(), "craftbridge-test/1");
        assert_eq!(frame, Message::text("[INFO] Steve joined the game"));

        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, TransportEvent::Closed { generation: 7 }));
    }

    #[tokio::test]
    async fn test_dropped_socket_reports_error() {
        let (url, server) = chat_server(false).await;
        let (events_tx, mut events) = mpsc::unbounded_channel();

        let mut sink = transport(url)
            .connect("session=abc.def.ghi", ConnectionMonitor::new(3, events_tx))
            .await
            .unwrap();
        sink.send("[CHAT] <Alex> hi").await.unwrap();
        timeout(Duration::from_secs(5), server).await.unwrap().unwrap();

        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, TransportEvent::Error { generation: 3, .. }));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/room", listener.local_addr().unwrap());
        drop(listener);
        let (events_tx, _events) = mpsc::unbounded_channel();

        let result = transport(url)
            .connect("session=x", ConnectionMonitor::new(1, events_tx))
            .await;
        assert!(matches!(result, Err(BridgeError::Transport(_))));
    }

    #[test]
    fn test_default_client_label() {
        let config = WebSocketConfig::new("wss://chat.example.com/room");
        assert!(config.client_label.starts_with("craftbridge/"));
        assert_eq!(config.url, "wss://chat.example.com/room");
    }

    #[test]
    fn test_header_value_rejects_newlines() {
        assert!(header_value("session=abc", "cookie").is_ok());
        assert!(header_value("session=abc\r\nX-Evil: 1", "cookie").is_err());
    }
}
