//! Playback side of the live pipeline: response chunks → gapless output.
//!
//! Each buffer starts at `max(cursor, now)` and pushes the cursor to its own
//! end, so chunks arriving faster than real time queue up back-to-back and a
//! consumer that fell behind resynchronizes to the clock instead of
//! scheduling into the past.

use crate::audio::codec::decode_pcm_payload;
use crate::audio::output::{AudioOutput, EndedNotifier, SourceId};
use crate::error::Result;
use crate::pipeline::types::{AudioChunk, ScheduledBuffer};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Schedules response audio on an [`AudioOutput`].
///
/// Owns the output (the playback context). Only the session's dispatch loop
/// touches it, so the cursor and active set need no locking.
pub struct PlaybackScheduler<O: AudioOutput> {
    output: O,
    sample_rate: u32,
    /// End time of the last scheduled buffer, `None` until the first chunk.
    cursor: Option<f64>,
    /// Buffers handed to the output that have not finished yet.
    active: HashSet<SourceId>,
    next_id: SourceId,
}

impl<O: AudioOutput> PlaybackScheduler<O> {
    /// Creates a scheduler for chunks at `sample_rate`. The output is not opened.
    pub fn new(output: O, sample_rate: u32) -> Self {
        Self {
            output,
            sample_rate,
            cursor: None,
            active: HashSet::new(),
            next_id: 0,
        }
    }

    /// Open the playback context and start a fresh timeline.
    pub fn open(&mut self, ended: EndedNotifier) -> Result<()> {
        self.reset();
        self.output.open(ended)
    }

    /// Decode a base64 PCM payload and schedule it.
    ///
    /// Returns `Ok(None)` for a payload with no samples.
    ///
    /// # Errors
    /// `LiveError::Decode` for a malformed payload; scheduler state is untouched.
    pub fn enqueue_payload(&mut self, payload: &str) -> Result<Option<ScheduledBuffer>> {
        let samples = decode_pcm_payload(payload)?;
        self.schedule(AudioChunk::new(samples, self.sample_rate))
    }

    /// Schedule a decoded chunk right after the previous one.
    pub fn schedule(&mut self, chunk: AudioChunk) -> Result<Option<ScheduledBuffer>> {
        if chunk.is_empty() {
            return Ok(None);
        }

        let now = self.output.current_time();
        let start_at = match self.cursor {
            Some(cursor) if cursor > now => cursor,
            _ => now,
        };
        let duration = chunk.duration_secs();
        let id = self.next_id;

        self.output.play(id, start_at, chunk)?;

        self.next_id += 1;
        self.cursor = Some(start_at + duration);
        self.active.insert(id);
        debug!(id, start_at, duration, "scheduled response buffer");

        Ok(Some(ScheduledBuffer {
            id,
            start_at,
            duration,
        }))
    }

    /// A buffer finished playing on its own.
    pub fn on_source_ended(&mut self, id: SourceId) {
        self.active.remove(&id);
    }

    /// Stop every buffer that has not finished yet.
    pub fn stop_all(&mut self) {
        for id in self.active.drain() {
            self.output.stop_source(id);
        }
    }

    /// Forget the cursor so the next chunk starts at the clock.
    pub fn reset(&mut self) {
        if !self.active.is_empty() {
            warn!(
                active = self.active.len(),
                "resetting playback timeline with buffers still active"
            );
        }
        self.cursor = None;
    }

    /// Stop everything and close the playback context. Idempotent.
    pub fn close(&mut self) {
        self.stop_all();
        self.output.close();
        self.cursor = None;
    }

    /// End time of the last scheduled buffer.
    pub fn cursor(&self) -> Option<f64> {
        self.cursor
    }

    /// Number of buffers still playing or waiting to play.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, id: SourceId) -> bool {
        self.active.contains(&id)
    }

    /// Current output clock time.
    pub fn current_time(&self) -> f64 {
        self.output.current_time()
    }

    pub fn output(&self) -> &O {
        &self.output
    }
}
