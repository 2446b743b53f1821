use crate::error::{LiveError, Result};
use crate::pipeline::types::AudioChunk;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;

/// Handle of one scheduled output buffer.
pub type SourceId = u64;

/// Channel on which an output reports buffers that finished playing naturally.
pub type EndedNotifier = UnboundedSender<SourceId>;

/// Trait for audio output devices (the playback context).
///
/// The output owns a monotonic clock in seconds. Buffers are handed over with
/// an absolute start time on that clock and play without further involvement
/// from the caller.
pub trait AudioOutput: Send {
    /// Open the playback context. Finished buffers are reported on `ended`.
    fn open(&mut self, ended: EndedNotifier) -> Result<()>;

    /// Current time of the output clock in seconds.
    fn current_time(&self) -> f64;

    /// Schedule `chunk` to start at `start_at` seconds on the output clock.
    fn play(&mut self, id: SourceId, start_at: f64, chunk: AudioChunk) -> Result<()>;

    /// Stop a scheduled or playing buffer immediately. Unknown ids are ignored.
    fn stop_source(&mut self, id: SourceId);

    /// Close the playback context. Idempotent.
    fn close(&mut self);

    /// Whether the context is open.
    fn is_open(&self) -> bool;
}

/// A buffer handed to a [`MockOutput`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlayedSource {
    pub id: SourceId,
    pub start_at: f64,
    pub duration: f64,
}

#[derive(Default)]
struct MockOutputState {
    now: f64,
    open: bool,
    open_count: usize,
    close_count: usize,
    played: Vec<PlayedSource>,
    stopped: Vec<SourceId>,
    ended: Option<EndedNotifier>,
}

/// Mock output with a manually driven clock, for testing.
///
/// Clones share state, like [`crate::audio::source::MockMicrophone`].
#[derive(Clone, Default)]
pub struct MockOutput {
    state: Arc<Mutex<MockOutputState>>,
    fail_open: bool,
}

impl MockOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the mock to fail on open
    pub fn with_open_failure(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Set the output clock.
    pub fn set_time(&self, seconds: f64) {
        if let Ok(mut s) = self.state.lock() {
            s.now = seconds;
        }
    }

    /// Report `id` as finished, as the device would at the end of a buffer.
    pub fn finish(&self, id: SourceId) {
        if let Ok(s) = self.state.lock()
            && let Some(tx) = s.ended.as_ref()
        {
            let _ = tx.send(id);
        }
    }

    pub fn played(&self) -> Vec<PlayedSource> {
        self.state.lock().map(|s| s.played.clone()).unwrap_or_default()
    }

    pub fn stopped(&self) -> Vec<SourceId> {
        self.state.lock().map(|s| s.stopped.clone()).unwrap_or_default()
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().map(|s| s.open_count).unwrap_or(0)
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().map(|s| s.close_count).unwrap_or(0)
    }
}

impl AudioOutput for MockOutput {
    fn open(&mut self, ended: EndedNotifier) -> Result<()> {
        if self.fail_open {
            return Err(LiveError::AudioPlayback {
                message: "mock output failure".to_string(),
            });
        }
        let mut s = self
            .state
            .lock()
            .map_err(|e| LiveError::Other(format!("mock state poisoned: {}", e)))?;
        s.open = true;
        s.open_count += 1;
        s.ended = Some(ended);
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.state.lock().map(|s| s.now).unwrap_or(0.0)
    }

    fn play(&mut self, id: SourceId, start_at: f64, chunk: AudioChunk) -> Result<()> {
        let mut s = self
            .state
            .lock()
            .map_err(|e| LiveError::Other(format!("mock state poisoned: {}", e)))?;
        if !s.open {
            return Err(LiveError::AudioPlayback {
                message: "output is closed".to_string(),
            });
        }
        s.played.push(PlayedSource {
            id,
            start_at,
            duration: chunk.duration_secs(),
        });
        Ok(())
    }

    fn stop_source(&mut self, id: SourceId) {
        if let Ok(mut s) = self.state.lock() {
            s.stopped.push(id);
        }
    }

    fn close(&mut self) {
        if let Ok(mut s) = self.state.lock()
            && s.open
        {
            s.open = false;
            s.ended = None;
            s.close_count += 1;
        }
    }

    fn is_open(&self) -> bool {
        self.state.lock().map(|s| s.open).unwrap_or(false)
    }
}
