//! Live transport over a TLS websocket to the dialogue service.

use crate::defaults;
use crate::error::{LiveError, Result};
use crate::live::protocol::{ClientMessage, ServerMessage, SetupRequest};
use crate::live::transport::{LiveConnection, LiveTransport, SessionEvent};
use crate::pipeline::types::RealtimeChunk;
use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

/// Capacity of the inbound event channel.
const EVENT_CAPACITY: usize = 256;

/// Connects to the live service's bidirectional websocket endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    endpoint: String,
    api_key: String,
    outbound_capacity: usize,
    connect_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            outbound_capacity: defaults::OUTBOUND_CAPACITY,
            connect_timeout: Duration::from_secs(defaults::CONNECT_TIMEOUT_SECS),
        }
    }

    /// Frames buffered between capture and the socket writer before capture drops.
    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    /// Deadline for the handshake plus the service's setup acknowledgement.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Endpoint URL including the key query parameter.
    fn url(&self) -> String {
        let sep = if self.endpoint.contains('?') { '&' } else { '?' };
        format!("{}{}key={}", self.endpoint, sep, self.api_key)
    }
}

#[async_trait]
impl LiveTransport for WebSocketTransport {
    async fn connect(&self, setup: SetupRequest) -> Result<LiveConnection> {
        info!(endpoint = %self.endpoint, model = %setup.model, "connecting live session");

        let deadline = Instant::now() + self.connect_timeout;
        let (socket, _response) = tokio::time::timeout_at(deadline, connect_async(self.url()))
            .await
            .map_err(|_| LiveError::Connection {
                message: format!("timed out after {:?}", self.connect_timeout),
            })?
            .map_err(|e| LiveError::Connection {
                message: e.to_string(),
            })?;

        let (mut write, read) = socket.split();
        let setup_json = ClientMessage::Setup(setup).to_json()?;
        write
            .send(Message::Text(setup_json))
            .await
            .map_err(|e| LiveError::Connection {
                message: format!("failed to send setup: {}", e),
            })?;

        let (out_tx, out_rx) = mpsc::channel(self.outbound_capacity);
        let (ev_tx, ev_rx) = mpsc::channel(EVENT_CAPACITY);
        let (close_tx, close_rx) = oneshot::channel();

        tokio::spawn(run_socket(write, read, out_rx, ev_tx, close_rx, deadline));

        Ok(LiveConnection::new(out_tx, ev_rx, close_tx))
    }
}

/// Pump one socket until either side closes.
///
/// A service that has not acknowledged the setup by `setup_deadline` is
/// treated as a failed connection.
async fn run_socket<W, R>(
    mut write: W,
    mut read: R,
    mut outbound: mpsc::Receiver<RealtimeChunk>,
    events: mpsc::Sender<SessionEvent>,
    mut close: oneshot::Receiver<()>,
    setup_deadline: Instant,
) where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
    R: Stream<Item = std::result::Result<Message, tungstenite::Error>> + Unpin,
{
    let mut opened = false;

    let last_event = loop {
        tokio::select! {
            _ = &mut close => {
                debug!("closing live socket");
                if let Err(e) = write.send(Message::Close(None)).await {
                    debug!("close frame not sent: {}", e);
                }
                break SessionEvent::Closed(None);
            }
            _ = tokio::time::sleep_until(setup_deadline), if !opened => {
                warn!("service did not acknowledge the session setup in time");
                if let Err(e) = write.send(Message::Close(None)).await {
                    debug!("close frame not sent: {}", e);
                }
                break SessionEvent::Errored("no setup acknowledgement before the deadline".to_string());
            }
            chunk = outbound.recv() => {
                let Some(chunk) = chunk else {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!("close frame not sent: {}", e);
                    }
                    break SessionEvent::Closed(None);
                };
                let json = match ClientMessage::audio(chunk).to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("failed to serialize capture frame: {}", e);
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(json)).await {
                    break SessionEvent::Errored(e.to_string());
                }
            }
            frame = read.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("skipping non-UTF-8 binary frame: {}", e);
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        break SessionEvent::Closed(frame.map(|f| f.reason.to_string()));
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => break SessionEvent::Errored(e.to_string()),
                    None => break SessionEvent::Closed(None),
                };
                if let Some(event) = interpret_text(&text, &mut opened)
                    && events.send(event).await.is_err()
                {
                    // Session is gone; nobody left to deliver to
                    return;
                }
            }
        }
    };

    if events.send(last_event).await.is_err() {
        debug!("live session already gone when socket finished");
    }
}

/// Translate one text frame into a session event.
///
/// The first `setupComplete` becomes [`SessionEvent::Opened`]; unparseable
/// frames are logged and skipped.
fn interpret_text(text: &str, opened: &mut bool) -> Option<SessionEvent> {
    let msg = match ServerMessage::from_json(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("skipping malformed server frame: {}", e);
            return None;
        }
    };

    if msg.go_away.is_some() {
        warn!("service announced it will close the session soon");
    }

    if msg.is_setup_complete() && !*opened {
        *opened = true;
        return Some(SessionEvent::Opened);
    }
    Some(SessionEvent::Message(msg))
}
