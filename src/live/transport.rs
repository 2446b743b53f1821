//! Transport seam between the session manager and the remote service.

use crate::error::Result;
use crate::live::protocol::{ServerMessage, SetupRequest};
use crate::pipeline::types::RealtimeChunk;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

/// Lifecycle and data events of one live connection, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The service accepted the setup; audio may flow.
    Opened,
    /// Any message from the service.
    Message(ServerMessage),
    /// The connection failed after it was established.
    Errored(String),
    /// The connection ended, locally or remotely.
    Closed(Option<String>),
}

/// An established connection. Owned by exactly one session.
pub struct LiveConnection {
    /// Encoded capture frames to send.
    pub outbound: mpsc::Sender<RealtimeChunk>,
    /// Events from the service.
    pub events: mpsc::Receiver<SessionEvent>,
    close: Option<oneshot::Sender<()>>,
}

impl LiveConnection {
    pub fn new(
        outbound: mpsc::Sender<RealtimeChunk>,
        events: mpsc::Receiver<SessionEvent>,
        close: oneshot::Sender<()>,
    ) -> Self {
        Self {
            outbound,
            events,
            close: Some(close),
        }
    }

    /// Ask the transport to close the connection. Idempotent.
    pub fn close(&mut self) {
        if let Some(tx) = self.close.take() {
            // The IO task may already be gone; nothing to close then
            let _ = tx.send(());
        }
    }
}

impl Drop for LiveConnection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens live connections.
#[async_trait]
pub trait LiveTransport: Send + Sync {
    /// Connect and send `setup`.
    ///
    /// # Errors
    /// `LiveError::Connection` when the service cannot be reached.
    async fn connect(&self, setup: SetupRequest) -> Result<LiveConnection>;
}

/// Service side of a connection opened through [`MockTransport`].
pub struct MockRemote {
    /// Push events to the session.
    pub events: mpsc::Sender<SessionEvent>,
    /// Frames the session sent.
    pub outbound: mpsc::Receiver<RealtimeChunk>,
    /// Fires when the session closes the connection.
    pub closed: oneshot::Receiver<()>,
    /// The setup the session sent.
    pub setup: SetupRequest,
}

/// In-process transport for testing.
///
/// Every successful connect hands a [`MockRemote`] to the receiver returned by
/// [`MockTransport::new`].
#[derive(Clone)]
pub struct MockTransport {
    remotes: mpsc::UnboundedSender<MockRemote>,
    connects: Arc<Mutex<usize>>,
    outbound_capacity: usize,
    fail_connect: bool,
    hang_connect: bool,
}

impl MockTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockRemote>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                remotes: tx,
                connects: Arc::new(Mutex::new(0)),
                outbound_capacity: 8,
                fail_connect: false,
                hang_connect: false,
            },
            rx,
        )
    }

    /// Configure the mock to refuse connections
    pub fn with_connect_failure(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// Configure connect to never complete
    pub fn with_hanging_connect(mut self) -> Self {
        self.hang_connect = true;
        self
    }

    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    /// Number of connect attempts so far.
    pub fn connect_count(&self) -> usize {
        self.connects.lock().map(|c| *c).unwrap_or(0)
    }
}

#[async_trait]
impl LiveTransport for MockTransport {
    async fn connect(&self, setup: SetupRequest) -> Result<LiveConnection> {
        if let Ok(mut count) = self.connects.lock() {
            *count += 1;
        }
        if self.hang_connect {
            std::future::pending::<()>().await;
        }
        if self.fail_connect {
            return Err(crate::error::LiveError::Connection {
                message: "mock connection refused".to_string(),
            });
        }

        let (out_tx, out_rx) = mpsc::channel(self.outbound_capacity);
        let (ev_tx, ev_rx) = mpsc::channel(64);
        let (close_tx, close_rx) = oneshot::channel();

        let remote = MockRemote {
            events: ev_tx,
            outbound: out_rx,
            closed: close_rx,
            setup,
        };
        if self.remotes.send(remote).is_err() {
            return Err(crate::error::LiveError::Connection {
                message: "mock remote dropped".to_string(),
            });
        }
        Ok(LiveConnection::new(out_tx, ev_rx, close_tx))
    }
}
