use crate::defaults;
use crate::error::{LiveError, Result};
use crate::live::session::SessionConfig;
use crate::studio::{StudioOptions, WorkflowMode};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub live: LiveConfig,
    pub audio: AudioConfig,
    pub studio: StudioConfig,
}

/// Live service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LiveConfig {
    pub model: String,
    pub endpoint: String,
    /// Prebuilt voice name; the service picks one when unset.
    pub voice: Option<String>,
    pub api_key: Option<String>,
}

/// Audio device configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub capture_rate: u32,
    pub playback_rate: u32,
    pub frame_size: usize,
    pub outbound_capacity: usize,
}

/// Studio defaults the live director is briefed with
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StudioConfig {
    pub workflow: WorkflowMode,
    pub style: String,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            model: defaults::DEFAULT_MODEL.to_string(),
            endpoint: defaults::DEFAULT_ENDPOINT.to_string(),
            voice: None,
            api_key: None,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            output_device: None,
            capture_rate: defaults::CAPTURE_SAMPLE_RATE,
            playback_rate: defaults::PLAYBACK_SAMPLE_RATE,
            frame_size: defaults::CAPTURE_FRAME_SIZE,
            outbound_capacity: defaults::OUTBOUND_CAPACITY,
        }
    }
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            workflow: WorkflowMode::Creator,
            style: "REALISTIC".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents).map_err(|e| LiveError::ConfigParse {
            message: e.to_string(),
        })?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only a missing file yields defaults; invalid TOML is an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - LEVI_API_KEY, then GEMINI_API_KEY → live.api_key
    /// - LEVI_MODEL → live.model
    /// - LEVI_VOICE → live.voice
    /// - LEVI_INPUT_DEVICE → audio.input_device
    /// - LEVI_OUTPUT_DEVICE → audio.output_device
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(key) = env_value("LEVI_API_KEY").or_else(|| env_value("GEMINI_API_KEY")) {
            self.live.api_key = Some(key);
        }
        if let Some(model) = env_value("LEVI_MODEL") {
            self.live.model = model;
        }
        if let Some(voice) = env_value("LEVI_VOICE") {
            self.live.voice = Some(voice);
        }
        if let Some(device) = env_value("LEVI_INPUT_DEVICE") {
            self.audio.input_device = Some(device);
        }
        if let Some(device) = env_value("LEVI_OUTPUT_DEVICE") {
            self.audio.output_device = Some(device);
        }
        self
    }

    /// Check values the session cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.live.model.trim().is_empty() {
            return Err(invalid("live.model", "must not be empty"));
        }
        if !(self.live.endpoint.starts_with("wss://") || self.live.endpoint.starts_with("ws://")) {
            return Err(invalid("live.endpoint", "must be a ws:// or wss:// URL"));
        }
        if self.audio.capture_rate == 0 {
            return Err(invalid("audio.capture_rate", "must be greater than 0"));
        }
        if self.audio.playback_rate == 0 {
            return Err(invalid("audio.playback_rate", "must be greater than 0"));
        }
        if self.audio.frame_size == 0 {
            return Err(invalid("audio.frame_size", "must be greater than 0"));
        }
        if self.audio.outbound_capacity == 0 {
            return Err(invalid("audio.outbound_capacity", "must be greater than 0"));
        }
        if self.studio.style.trim().is_empty() {
            return Err(invalid("studio.style", "must not be empty"));
        }
        Ok(())
    }

    /// The configured API key.
    pub fn api_key(&self) -> Result<&str> {
        self.live
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(LiveError::MissingApiKey)
    }

    /// Studio options seeded from the `[studio]` section.
    pub fn studio_options(&self) -> Result<StudioOptions> {
        StudioOptions::default()
            .with_workflow(self.studio.workflow)
            .with_style(&self.studio.style)
    }

    /// Session parameters for a dialogue steered by `options`.
    pub fn session_config(&self, options: &StudioOptions) -> SessionConfig {
        let config = SessionConfig::new(&self.live.model, options.director_persona())
            .with_frame_size(self.audio.frame_size)
            .with_capture_rate(self.audio.capture_rate)
            .with_playback_rate(self.audio.playback_rate);
        match self.live.voice.as_deref() {
            Some(voice) => config.with_voice(voice),
            None => config,
        }
    }

    /// TOML rendering with the API key masked.
    pub fn to_redacted_toml(&self) -> anyhow::Result<String> {
        let mut shown = self.clone();
        if shown.live.api_key.is_some() {
            shown.live.api_key = Some("********".to_string());
        }
        Ok(toml::to_string_pretty(&shown)?)
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/levi-live/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("levi-live")
            .join("config.toml")
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn invalid(key: &str, message: &str) -> LiveError {
    LiveError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "LEVI_API_KEY",
        "GEMINI_API_KEY",
        "LEVI_MODEL",
        "LEVI_VOICE",
        "LEVI_INPUT_DEVICE",
        "LEVI_OUTPUT_DEVICE",
    ];

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn clear_levi_env() {
        for key in ENV_KEYS {
            unsafe { std::env::remove_var(key) }
        }
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.live.model, defaults::DEFAULT_MODEL);
        assert!(config.live.endpoint.starts_with("wss://"));
        assert_eq!(config.live.voice, None);
        assert_eq!(config.live.api_key, None);

        assert_eq!(config.audio.input_device, None);
        assert_eq!(config.audio.capture_rate, 16000);
        assert_eq!(config.audio.playback_rate, 24000);
        assert_eq!(config.audio.frame_size, 4096);
        assert_eq!(config.audio.outbound_capacity, 8);

        assert_eq!(config.studio.workflow, WorkflowMode::Creator);
        assert_eq!(config.studio.style, "REALISTIC");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            [live]
            model = "gemini-live-test"
            voice = "Kore"
            api_key = "secret"

            [audio]
            input_device = "pipewire"
            output_device = "pulse"
            frame_size = 2048
            outbound_capacity = 16

            [studio]
            workflow = "ads"
            style = "CINEMATIC"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.live.model, "gemini-live-test");
        assert_eq!(config.live.voice.as_deref(), Some("Kore"));
        assert_eq!(config.api_key().unwrap(), "secret");
        assert_eq!(config.audio.input_device.as_deref(), Some("pipewire"));
        assert_eq!(config.audio.output_device.as_deref(), Some("pulse"));
        assert_eq!(config.audio.frame_size, 2048);
        assert_eq!(config.audio.outbound_capacity, 16);
        assert_eq!(config.studio.workflow, WorkflowMode::Ads);
        assert_eq!(config.studio.style, "CINEMATIC");
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let toml_content = r#"
            [live]
            voice = "Puck"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.live.voice.as_deref(), Some("Puck"));
        assert_eq!(config.live.model, defaults::DEFAULT_MODEL);
        assert_eq!(config.audio, AudioConfig::default());
        assert_eq!(config.studio, StudioConfig::default());
    }

    #[test]
    fn test_env_override_api_key_prefers_levi() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_levi_env();

        set_env("GEMINI_API_KEY", "gemini");
        let config = Config::default().with_env_overrides();
        assert_eq!(config.api_key().unwrap(), "gemini");

        set_env("LEVI_API_KEY", "levi");
        let config = Config::default().with_env_overrides();
        assert_eq!(config.api_key().unwrap(), "levi");

        clear_levi_env();
    }

    #[test]
    fn test_env_override_all() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_levi_env();

        set_env("LEVI_MODEL", "other-model");
        set_env("LEVI_VOICE", "Charon");
        set_env("LEVI_INPUT_DEVICE", "hw:1,0");
        set_env("LEVI_OUTPUT_DEVICE", "hw:2,0");

        let config = Config::default().with_env_overrides();

        assert_eq!(config.live.model, "other-model");
        assert_eq!(config.live.voice.as_deref(), Some("Charon"));
        assert_eq!(config.audio.input_device.as_deref(), Some("hw:1,0"));
        assert_eq!(config.audio.output_device.as_deref(), Some("hw:2,0"));

        clear_levi_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_levi_env();

        set_env("LEVI_MODEL", "");
        let config = Config::default().with_env_overrides();
        assert_eq!(config.live.model, defaults::DEFAULT_MODEL);

        clear_levi_env();
    }

    #[test]
    fn test_missing_api_key() {
        let mut config = Config::default();
        assert!(matches!(config.api_key(), Err(LiveError::MissingApiKey)));

        config.live.api_key = Some("  ".to_string());
        assert!(matches!(config.api_key(), Err(LiveError::MissingApiKey)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.audio.frame_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("audio.frame_size"));

        let mut config = Config::default();
        config.live.endpoint = "https://example.com".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("live.endpoint"));
    }

    #[test]
    fn test_session_config_from_sections() {
        let mut config = Config::default();
        config.live.voice = Some("Aoede".to_string());
        config.audio.frame_size = 1024;
        config.audio.capture_rate = 48000;
        config.studio.workflow = WorkflowMode::Ads;

        let options = config.studio_options().unwrap();
        let session = config.session_config(&options);

        assert_eq!(session.model, defaults::DEFAULT_MODEL);
        assert_eq!(session.voice.as_deref(), Some("Aoede"));
        assert_eq!(session.frame_size, 1024);
        assert_eq!(session.capture_rate, 48000);
        assert_eq!(session.persona.workflow, WorkflowMode::Ads);
    }

    #[test]
    fn test_redacted_toml_masks_key() {
        let mut config = Config::default();
        config.live.api_key = Some("super-secret".to_string());
        let shown = config.to_redacted_toml().unwrap();
        assert!(!shown.contains("super-secret"));
        assert!(shown.contains("[live]"));
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let invalid_toml = r#"
            [live
            model = "broken
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(invalid_toml.as_bytes()).unwrap();

        assert!(Config::load(temp_file.path()).is_err());
        assert!(Config::load_or_default(temp_file.path()).is_err());
    }

    #[test]
    fn test_default_path_ends_with_app_dir() {
        let path = Config::default_path();
        assert!(path.ends_with("levi-live/config.toml"));
    }

    #[test]
    fn test_load_or_default_rejects_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[live\nmodel = ").unwrap();

        let err = Config::load_or_default(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LiveError>(),
            Some(LiveError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, Config::default());
    }
}
