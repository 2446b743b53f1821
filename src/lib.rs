//! levi-live - real-time voice dialogue with the LEVI production director
//!
//! Streams microphone audio to a live dialogue service and plays the spoken
//! responses back without gaps.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod live;
pub mod pipeline;
pub mod speech;
pub mod studio;

// Composition root - needs everything
#[cfg(all(feature = "cpal-audio", feature = "cli"))]
pub mod app;

// Device seams (hardware or mock)
pub use audio::output::AudioOutput;
pub use audio::source::Microphone;
pub use live::transport::LiveTransport;

// Session
pub use live::link::LiveLink;
pub use live::session::{LiveSession, SessionConfig, SessionHandle, SessionStatus};

// Error handling
pub use error::{LiveError, Result};

// Config
pub use config::Config;
pub use studio::StudioOptions;

/// Build version string with optional git commit hash.
///
/// Returns `"0.2.5+abc1234"` when git hash is available, `"0.2.5"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
