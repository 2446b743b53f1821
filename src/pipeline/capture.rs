//! Capture side of the live pipeline: microphone samples → encoded frames.
//!
//! Runs inside the microphone callback, so nothing here blocks. Samples are
//! cut into fixed-size frames; each completed frame is converted to 16-bit
//! PCM, base64-encoded and offered to the outbound channel. A frame the
//! channel cannot take right now is dropped.

use crate::audio::codec::encode_pcm_frame;
use crate::defaults::CAPTURE_SAMPLE_RATE;
use crate::pipeline::types::RealtimeChunk;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

/// Non-blocking destination for encoded capture frames.
pub trait ChunkSink: Send {
    /// Offer a chunk. Returns false if it was not accepted.
    fn try_forward(&self, chunk: RealtimeChunk) -> bool;
}

impl ChunkSink for mpsc::Sender<RealtimeChunk> {
    fn try_forward(&self, chunk: RealtimeChunk) -> bool {
        self.try_send(chunk).is_ok()
    }
}

/// Counters shared between the capture callback and whoever reports on it.
#[derive(Debug, Default)]
pub struct CaptureStats {
    forwarded: AtomicU64,
    dropped: AtomicU64,
}

impl CaptureStats {
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Frames microphone samples and forwards them to a [`ChunkSink`].
pub struct CapturePipeline<S: ChunkSink> {
    sink: S,
    frame_size: usize,
    sample_rate: u32,
    pending: Vec<f32>,
    sequence: u64,
    stats: Arc<CaptureStats>,
}

impl<S: ChunkSink> CapturePipeline<S> {
    /// Creates a pipeline emitting frames of `frame_size` samples.
    pub fn new(sink: S, frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            sink,
            frame_size,
            sample_rate: CAPTURE_SAMPLE_RATE,
            pending: Vec::with_capacity(frame_size),
            sequence: 0,
            stats: Arc::new(CaptureStats::default()),
        }
    }

    /// Rate of the incoming samples, carried in each frame's mime tag.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Shared counters for this pipeline.
    pub fn stats(&self) -> Arc<CaptureStats> {
        Arc::clone(&self.stats)
    }

    /// Samples held back waiting for the current frame to fill.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Accept samples from the microphone callback.
    ///
    /// Emits every frame completed by these samples, in order. At most one
    /// partial frame is retained between calls.
    pub fn push(&mut self, mut samples: &[f32]) {
        while !samples.is_empty() {
            let room = self.frame_size - self.pending.len();
            let take = room.min(samples.len());
            self.pending.extend_from_slice(&samples[..take]);
            samples = &samples[take..];

            if self.pending.len() == self.frame_size {
                self.emit_frame();
            }
        }
    }

    fn emit_frame(&mut self) {
        let chunk = RealtimeChunk::pcm_at(
            encode_pcm_frame(&self.pending),
            self.sample_rate,
            self.sequence,
        );
        self.pending.clear();
        self.sequence += 1;

        if self.sink.try_forward(chunk) {
            self.stats.forwarded.fetch_add(1, Ordering::Relaxed);
        } else {
            let dropped = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(
                sequence = self.sequence - 1,
                dropped, "outbound channel not ready, capture frame dropped"
            );
        }
    }
}
