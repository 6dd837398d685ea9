//! WebSocket Feed Transport
//!
//! [`FeedTransport`] adapter over `tokio-tungstenite`. Each connection runs
//! its own [`LivenessProbe`] and surfaces only text frames to the caller.
//!
//! # Close handling
//!
//! | Event | Result |
//! |---|---|
//! | Close frame with code 1000 or 1001 | `Ok(None)` (graceful) |
//! | Close frame with any other code | `TransportError::AbnormalClose` |
//! | Close frame without a status | `AbnormalClose { code: 1005 }` |
//! | Stream ends without a close frame | `TransportError::StreamEnded` |
//! | Pong overdue | `TransportError::ProbeTimeout` |

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::liveness::{LivenessProbe, ProbeConfig, ProbeEvent, ProbeState};
use crate::application::ports::{FeedConnection, FeedTransport, TransportError};
use crate::domain::streaming::FeedEndpoint;

/// Close code reported when the peer closes without a status.
const NO_STATUS_RECEIVED: u16 = 1005;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens WebSocket connections to feed endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport {
    probe: ProbeConfig,
}

impl WebSocketTransport {
    /// Create a transport whose connections probe with `probe`.
    #[must_use]
    pub const fn new(probe: ProbeConfig) -> Self {
        Self { probe }
    }
}

#[async_trait]
impl FeedTransport for WebSocketTransport {
    async fn connect(
        &self,
        endpoint: &FeedEndpoint,
    ) -> Result<Box<dyn FeedConnection>, TransportError> {
        tracing::info!(feed = %endpoint.kind, url = %endpoint.url, "Connecting to feed");

        let (stream, _response) = tokio_tungstenite::connect_async(endpoint.url.as_str())
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        Ok(Box::new(WebSocketConnection::start(stream, self.probe)))
    }
}

/// One open WebSocket feed connection.
pub struct WebSocketConnection {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
    probe_state: Arc<ProbeState>,
    probe_rx: mpsc::Receiver<ProbeEvent>,
    probe_cancel: CancellationToken,
    probe_open: bool,
    pong_timeout: std::time::Duration,
}

impl WebSocketConnection {
    fn start(stream: WsStream, probe: ProbeConfig) -> Self {
        let (write, read) = stream.split();

        let probe_state = Arc::new(ProbeState::new());
        let (probe_tx, probe_rx) = mpsc::channel(10);
        let probe_cancel = CancellationToken::new();
        tokio::spawn(
            LivenessProbe::new(probe, Arc::clone(&probe_state), probe_tx, probe_cancel.clone())
                .run(),
        );

        Self {
            write,
            read,
            probe_state,
            probe_rx,
            probe_cancel,
            probe_open: true,
            pong_timeout: probe.pong_timeout,
        }
    }

    async fn send(&mut self, message: Message) -> Result<(), TransportError> {
        self.write
            .send(message)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

#[async_trait]
impl FeedConnection for WebSocketConnection {
    async fn next_frame(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            tokio::select! {
                event = self.probe_rx.recv(), if self.probe_open => {
                    match event {
                        Some(ProbeEvent::SendPing) => {
                            self.send(Message::Ping(Vec::new().into())).await?;
                        }
                        Some(ProbeEvent::Timeout) => {
                            return Err(TransportError::ProbeTimeout(self.pong_timeout));
                        }
                        None => self.probe_open = false,
                    }
                }
                msg = self.read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => return Ok(Some(text.as_str().to_owned())),
                        Some(Ok(Message::Pong(_))) => self.probe_state.record_pong(),
                        Some(Ok(Message::Ping(data))) => self.send(Message::Pong(data)).await?,
                        Some(Ok(Message::Close(Some(frame)))) => {
                            return match frame.code {
                                CloseCode::Normal | CloseCode::Away => {
                                    tracing::info!(code = u16::from(frame.code), "Server closed connection");
                                    Ok(None)
                                }
                                code => Err(TransportError::AbnormalClose {
                                    code: u16::from(code),
                                    reason: frame.reason.as_str().to_owned(),
                                }),
                            };
                        }
                        Some(Ok(Message::Close(None))) => {
                            return Err(TransportError::AbnormalClose {
                                code: NO_STATUS_RECEIVED,
                                reason: String::new(),
                            });
                        }
                        Some(Ok(other)) => {
                            tracing::debug!(len = other.len(), "Ignoring non-text frame");
                        }
                        Some(Err(e)) => return Err(TransportError::Io(e.to_string())),
                        None => return Err(TransportError::StreamEnded),
                    }
                }
            }
        }
    }

    async fn close(&mut self) {
        self.probe_cancel.cancel();
        if let Err(e) = self.write.close().await {
            tracing::debug!(error = %e, "Error while closing feed connection");
        }
    }
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        self.probe_cancel.cancel();
    }
}
