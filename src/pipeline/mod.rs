//! Audio pipeline of the live dialogue.
//!
//! Two halves meet at the live connection: capture frames microphone samples
//! into encoded chunks bound for the service, and playback schedules decoded
//! response audio back-to-back on the output clock.

pub mod capture;
pub mod playback;
pub mod types;

pub use capture::{CapturePipeline, CaptureStats, ChunkSink};
pub use playback::PlaybackScheduler;
pub use types::{AudioChunk, RealtimeChunk, ScheduledBuffer};
