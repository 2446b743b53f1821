//! Data types shared by the capture and playback halves of the live pipeline.

use crate::defaults::CAPTURE_SAMPLE_RATE;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A contiguous block of mono float samples at a fixed rate.
///
/// Immutable once produced; clones share the sample buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Normalized samples in [-1.0, 1.0).
    pub samples: Arc<[f32]>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioChunk {
    /// Creates a new audio chunk.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    /// Number of samples in the chunk.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// An encoded capture frame on its way to the live session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeChunk {
    /// Mime tag, e.g. `audio/pcm;rate=16000`.
    pub mime_type: String,
    /// base64 of 16-bit little-endian PCM.
    pub data: String,
    /// Capture order, starting at 0 for each session.
    #[serde(skip)]
    pub sequence: u64,
}

impl RealtimeChunk {
    /// Creates a capture frame carrying the standard 16kHz PCM tag.
    pub fn pcm(data: String, sequence: u64) -> Self {
        Self::pcm_at(data, CAPTURE_SAMPLE_RATE, sequence)
    }

    /// Creates a capture frame of PCM sampled at `sample_rate`.
    pub fn pcm_at(data: String, sample_rate: u32, sequence: u64) -> Self {
        Self {
            mime_type: pcm_mime_type(sample_rate),
            data,
            sequence,
        }
    }
}

/// Mime tag of 16-bit PCM at `sample_rate`, e.g. `audio/pcm;rate=16000`.
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

/// Where a response buffer landed on the output clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledBuffer {
    pub id: u64,
    /// Start time on the output clock, in seconds.
    pub start_at: f64,
    /// Duration in seconds.
    pub duration: f64,
}

impl ScheduledBuffer {
    /// End time on the output clock.
    pub fn end_at(&self) -> f64 {
        self.start_at + self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_chunk_duration() {
        let chunk = AudioChunk::new(vec![0.0; 12000], 24000);
        assert_eq!(chunk.len(), 12000);
        assert_eq!(chunk.duration_secs(), 0.5);
    }

    #[test]
    fn test_audio_chunk_zero_rate_has_no_duration() {
        let chunk = AudioChunk::new(vec![0.0; 10], 0);
        assert_eq!(chunk.duration_secs(), 0.0);
    }

    #[test]
    fn test_audio_chunk_clone_shares_samples() {
        let chunk = AudioChunk::new(vec![0.5; 4], 16000);
        let copy = chunk.clone();
        assert!(Arc::ptr_eq(&chunk.samples, &copy.samples));
    }

    #[test]
    fn test_realtime_chunk_pcm_tag() {
        let chunk = RealtimeChunk::pcm("AAAA".to_string(), 3);
        assert_eq!(chunk.mime_type, "audio/pcm;rate=16000");
        assert_eq!(chunk.sequence, 3);

        let chunk = RealtimeChunk::pcm_at("AAAA".to_string(), 44100, 0);
        assert_eq!(chunk.mime_type, "audio/pcm;rate=44100");
    }

    #[test]
    fn test_realtime_chunk_wire_shape() {
        let chunk = RealtimeChunk::pcm("AAAA".to_string(), 9);
        let json = serde_json::to_string(&chunk).unwrap();
        assert_eq!(json, r#"{"mimeType":"audio/pcm;rate=16000","data":"AAAA"}"#);
    }

    #[test]
    fn test_scheduled_buffer_end() {
        let buf = ScheduledBuffer {
            id: 1,
            start_at: 0.5,
            duration: 0.25,
        };
        assert_eq!(buf.end_at(), 0.75);
    }
}
