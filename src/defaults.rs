//! Default configuration constants for levi-live.
//!
//! Shared by the config layer, the audio adapters and the live session so the
//! wire format and the hardware setup never disagree.

/// Microphone capture sample rate in Hz.
///
/// The live service expects 16kHz mono PCM on the input side.
pub const CAPTURE_SAMPLE_RATE: u32 = 16000;

/// Response audio sample rate in Hz.
///
/// Synthesized speech arrives as 24kHz mono PCM.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Samples per capture frame forwarded to the session.
///
/// 4096 samples at 16kHz is 256ms of audio per outbound message.
pub const CAPTURE_FRAME_SIZE: usize = 4096;

/// Capacity of the outbound chunk channel between capture and the socket writer.
///
/// When the writer falls behind by this many frames, new frames are dropped.
pub const OUTBOUND_CAPACITY: usize = 8;

/// Scale between 16-bit PCM and normalized floats.
pub const PCM_SCALE: f32 = 32768.0;

/// Native-audio dialogue model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-12-2025";

/// Bidirectional streaming endpoint of the live service.
pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Deadline for the socket handshake plus the service's `setupComplete`.
pub const CONNECT_TIMEOUT_SECS: u64 = 15;
