//! Session lifecycle: one live dialogue from connect to teardown.
//!
//! A [`LiveSession`] owns the microphone, the playback output and the
//! connection. It wires microphone → capture pipeline → connection once the
//! service confirms the setup, feeds response audio to the playback
//! scheduler, and tears everything down exactly once however the session
//! ends.

use crate::audio::output::{AudioOutput, SourceId};
use crate::audio::source::Microphone;
use crate::defaults;
use crate::error::{LiveError, Result};
use crate::live::protocol::{ServerMessage, SetupRequest};
use crate::live::transport::{LiveConnection, LiveTransport, SessionEvent};
use crate::pipeline::capture::{CapturePipeline, CaptureStats};
use crate::pipeline::playback::PlaybackScheduler;
use crate::studio::DirectorPersona;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Why a session ended in error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The microphone refused access.
    PermissionDenied,
    /// The service could not be reached or dropped the connection.
    Connection,
    /// A local audio device failed.
    Device,
}

/// Connection status of a session.
///
/// `Error` and `Closed` are terminal; once reached, further transitions are
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Idle,
    Connecting,
    Open,
    Error(ErrorKind),
    Closed,
}

impl SessionStatus {
    /// Status line shown to the user.
    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "Initializing...",
            SessionStatus::Connecting => "Connecting...",
            SessionStatus::Open => "Direct Line Open",
            SessionStatus::Error(ErrorKind::Connection) => "Signal Loss",
            SessionStatus::Error(ErrorKind::PermissionDenied | ErrorKind::Device) => "No Access",
            SessionStatus::Closed => "Standby",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Error(_) | SessionStatus::Closed)
    }

    pub fn is_open(&self) -> bool {
        matches!(self, SessionStatus::Open)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<&LiveError> for ErrorKind {
    fn from(err: &LiveError) -> Self {
        match err {
            LiveError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            LiveError::Connection { .. } | LiveError::Protocol { .. } => ErrorKind::Connection,
            _ => ErrorKind::Device,
        }
    }
}

/// Parameters of one live session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Model id, with or without the `models/` prefix.
    pub model: String,
    /// Prebuilt voice for response speech; service default when `None`.
    pub voice: Option<String>,
    pub persona: DirectorPersona,
    /// Samples per outbound capture frame.
    pub frame_size: usize,
    /// Sample rate the microphone delivers; tags every outbound frame.
    pub capture_rate: u32,
    /// Sample rate of response audio.
    pub playback_rate: u32,
}

impl SessionConfig {
    pub fn new(model: impl Into<String>, persona: DirectorPersona) -> Self {
        Self {
            model: model.into(),
            voice: None,
            persona,
            frame_size: defaults::CAPTURE_FRAME_SIZE,
            capture_rate: defaults::CAPTURE_SAMPLE_RATE,
            playback_rate: defaults::PLAYBACK_SAMPLE_RATE,
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn with_frame_size(mut self, frame_size: usize) -> Self {
        self.frame_size = frame_size.max(1);
        self
    }

    pub fn with_capture_rate(mut self, rate: u32) -> Self {
        self.capture_rate = rate;
        self
    }

    pub fn with_playback_rate(mut self, rate: u32) -> Self {
        self.playback_rate = rate;
        self
    }

    fn setup_request(&self) -> SetupRequest {
        SetupRequest::audio(&self.model, &self.persona, self.voice.as_deref())
    }
}

type CloseHook = Box<dyn FnOnce() + Send + 'static>;

/// One live dialogue session.
pub struct LiveSession<T: LiveTransport, M: Microphone, O: AudioOutput> {
    transport: T,
    mic: M,
    playback: PlaybackScheduler<O>,
    config: SessionConfig,
    status: watch::Sender<SessionStatus>,
    conn: Option<LiveConnection>,
    ended: Option<mpsc::UnboundedReceiver<SourceId>>,
    capture_stats: Option<Arc<CaptureStats>>,
    on_close: Option<CloseHook>,
}

/// What woke the dispatch loop.
enum Step {
    Event(Option<SessionEvent>),
    SourceEnded(SourceId),
    Shutdown,
}

impl<T: LiveTransport, M: Microphone, O: AudioOutput> LiveSession<T, M, O> {
    pub fn new(transport: T, mic: M, output: O, config: SessionConfig) -> Self {
        let (status, _) = watch::channel(SessionStatus::Idle);
        Self {
            transport,
            mic,
            playback: PlaybackScheduler::new(output, config.playback_rate),
            config,
            status,
            conn: None,
            ended: None,
            capture_stats: None,
            on_close: None,
        }
    }

    /// Run `hook` once when the session tears down.
    pub fn with_on_close(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(hook));
        self
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Watch status changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Counters of the capture pipeline, once capture is wired.
    pub fn capture_stats(&self) -> Option<Arc<CaptureStats>> {
        self.capture_stats.clone()
    }

    pub fn playback(&self) -> &PlaybackScheduler<O> {
        &self.playback
    }

    fn set_status(&self, next: SessionStatus) {
        let changed = self.status.send_if_modified(|current| {
            if current.is_terminal() || *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            info!(status = %next, "live session status");
        }
    }

    /// Acquire devices and connect.
    ///
    /// On failure the status moves to `Error` and everything acquired so far
    /// is released before the error is returned.
    pub async fn start(&mut self) -> Result<()> {
        if self.status() != SessionStatus::Idle {
            return Err(LiveError::Other(
                "a live session can only be started once".to_string(),
            ));
        }
        self.set_status(SessionStatus::Connecting);

        if let Err(e) = self.mic.acquire() {
            return Err(self.fail(e));
        }

        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        self.ended = Some(ended_rx);
        if let Err(e) = self.playback.open(ended_tx) {
            return Err(self.fail(e));
        }

        match self.transport.connect(self.config.setup_request()).await {
            Ok(conn) => {
                debug!("transport connected, waiting for setup confirmation");
                self.conn = Some(conn);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Record `err` as the terminal status and tear down.
    fn fail(&mut self, err: LiveError) -> LiveError {
        warn!("live session failed: {}", err);
        self.set_status(SessionStatus::Error(ErrorKind::from(&err)));
        self.stop();
        err
    }

    /// Dispatch events until the session ends or `shutdown` fires, then tear down.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let step = {
                let Some(conn) = self.conn.as_mut() else {
                    break;
                };
                let ended = self.ended.as_mut();
                tokio::select! {
                    event = conn.events.recv() => Step::Event(event),
                    Some(id) = next_ended(ended) => Step::SourceEnded(id),
                    _ = wait_for_stop(&mut shutdown) => Step::Shutdown,
                }
            };

            match step {
                Step::Event(Some(SessionEvent::Opened)) => {
                    if let Err(e) = self.wire_capture() {
                        self.fail(e);
                        return;
                    }
                }
                Step::Event(Some(SessionEvent::Message(msg))) => self.on_message(&msg),
                Step::Event(Some(SessionEvent::Errored(reason))) => {
                    warn!("live connection error: {}", reason);
                    self.set_status(SessionStatus::Error(ErrorKind::Connection));
                    break;
                }
                Step::Event(Some(SessionEvent::Closed(reason))) => {
                    info!(reason = reason.as_deref().unwrap_or(""), "live connection closed");
                    break;
                }
                Step::Event(None) => {
                    debug!("live event stream ended");
                    break;
                }
                Step::SourceEnded(id) => self.playback.on_source_ended(id),
                Step::Shutdown => {
                    debug!("live session stop requested");
                    break;
                }
            }
        }
        self.stop();
    }

    /// Start the microphone feeding the capture pipeline.
    fn wire_capture(&mut self) -> Result<()> {
        let Some(conn) = self.conn.as_ref() else {
            return Ok(());
        };
        self.set_status(SessionStatus::Open);

        let mut pipeline = CapturePipeline::new(conn.outbound.clone(), self.config.frame_size)
            .with_sample_rate(self.config.capture_rate);
        self.capture_stats = Some(pipeline.stats());
        self.mic
            .start(Box::new(move |samples| pipeline.push(samples)))
    }

    fn on_message(&mut self, msg: &ServerMessage) {
        if let Some(content) = msg.server_content.as_ref()
            && content.interrupted
        {
            debug!("response interrupted, flushing playback");
            self.playback.stop_all();
            self.playback.reset();
        }

        if let Some(payload) = msg.audio_payload() {
            match self.playback.enqueue_payload(payload) {
                Ok(Some(buf)) => debug!(id = buf.id, start_at = buf.start_at, "queued response audio"),
                Ok(None) => {}
                Err(e) => warn!("skipping response chunk: {}", e),
            }
        }

        if msg.is_turn_complete() {
            debug!("response turn complete");
        }
    }

    /// Release everything the session holds. Idempotent and safe from any state.
    pub fn stop(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.close();
        }
        self.playback.close();
        self.mic.release();
        self.ended = None;

        if let Some(stats) = self.capture_stats.take() {
            info!(
                forwarded = stats.forwarded(),
                dropped = stats.dropped(),
                "capture finished"
            );
        }

        self.set_status(SessionStatus::Closed);
        if let Some(hook) = self.on_close.take() {
            hook();
        }
    }
}

impl<T, M, O> LiveSession<T, M, O>
where
    T: LiveTransport + 'static,
    M: Microphone + 'static,
    O: AudioOutput + 'static,
{
    /// Start and run the session on a tokio task.
    pub fn spawn(mut self) -> SessionHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let status = self.subscribe();

        let task = tokio::spawn(async move {
            let started = tokio::select! {
                result = self.start() => Some(result),
                _ = wait_for_stop(&mut stop_rx) => None,
            };
            match started {
                Some(Ok(())) => self.run(stop_rx).await,
                Some(Err(e)) => debug!("live session did not start: {}", e),
                None => {
                    debug!("live session stopped while connecting");
                    self.stop();
                }
            }
        });

        SessionHandle {
            stop: stop_tx,
            status,
            task: Some(task),
        }
    }
}

/// Control handle for a spawned session.
///
/// Dropping the handle stops the session.
pub struct SessionHandle {
    stop: watch::Sender<bool>,
    status: watch::Receiver<SessionStatus>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Ask the session to stop. Idempotent.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    /// Wait for the session task to finish.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!("live session task failed: {}", e);
        }
    }

    /// Wait until the session reaches a terminal status and return it.
    pub async fn terminated(&self) -> SessionStatus {
        let mut rx = self.status.clone();
        let terminal = rx.wait_for(SessionStatus::is_terminal).await.map(|s| *s);
        terminal.unwrap_or_else(|_| *rx.borrow())
    }

    /// Whether the session is running and not yet in a terminal status.
    pub fn is_live(&self) -> bool {
        let running = self.task.as_ref().is_some_and(|t| !t.is_finished());
        running && !self.status().is_terminal()
    }
}

/// Resolves once a stop is requested or the requester is gone.
async fn wait_for_stop(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn next_ended(rx: Option<&mut mpsc::UnboundedReceiver<SourceId>>) -> Option<SourceId> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
