//! Error types for levi-live.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LiveError {
    // Configuration errors
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("No API key configured (set LEVI_API_KEY or GEMINI_API_KEY)")]
    MissingApiKey,

    // Audio hardware errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Microphone access denied: {message}")]
    PermissionDenied { message: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    #[error("Audio playback failed: {message}")]
    AudioPlayback { message: String },

    // Live session errors
    #[error("Live session connection failed: {message}")]
    Connection { message: String },

    #[error("Live protocol error: {message}")]
    Protocol { message: String },

    #[error("Malformed audio payload: {message}")]
    Decode { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl From<base64::DecodeError> for LiveError {
    fn from(e: base64::DecodeError) -> Self {
        LiveError::Decode {
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for LiveError {
    fn from(e: serde_json::Error) -> Self {
        LiveError::Protocol {
            message: e.to_string(),
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, LiveError>;
