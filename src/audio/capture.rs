//! Microphone capture using CPAL (Cross-Platform Audio Library).

use crate::audio::resample::{mix_to_mono, resample};
use crate::audio::source::{Microphone, SampleCallback};
use crate::defaults;
use crate::error::{LiveError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// This suppresses noisy ALSA/JACK/PipeWire messages that CPAL triggers
/// when probing audio backends.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2 (stderr).
/// Safe as long as no other thread is concurrently manipulating fd 2.
pub(crate) fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Suppress noisy JACK/ALSA error messages that occur during audio backend probing.
///
/// # Safety
/// This modifies environment variables which is safe when called before spawning threads.
pub fn suppress_audio_warnings() {
    // SAFETY: Called at startup before any threads are spawned
    unsafe {
        std::env::set_var("JACK_NO_START_SERVER", "1");
        std::env::set_var("JACK_NO_AUDIO_RESERVATION", "1");
        std::env::set_var("PIPEWIRE_DEBUG", "0");
        std::env::set_var("ALSA_DEBUG", "0");
        std::env::set_var("PW_LOG", "0");
    }
}

/// Preferred device names for GNOME/PipeWire environments.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Device name patterns that are never a microphone or a speaker for speech.
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "S/PDIF",
];

pub(crate) fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

pub(crate) fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

/// Format a device list, filtering unusable entries and marking preferred ones.
pub(crate) fn label_devices(names: impl IntoIterator<Item = String>) -> Vec<String> {
    names
        .into_iter()
        .filter(|name| !should_filter_device(name))
        .map(|name| {
            if is_preferred_device(&name) {
                format!("{} [recommended]", name)
            } else {
                name
            }
        })
        .collect()
}

/// List available audio input devices, preferred ones marked "\[recommended\]".
///
/// # Errors
/// Returns `LiveError::AudioCapture` if device enumeration fails.
pub fn list_devices() -> Result<Vec<String>> {
    let devices = with_suppressed_stderr(|| cpal::default_host().input_devices());
    let devices = devices.map_err(|e| LiveError::AudioCapture {
        message: format!("Failed to enumerate input devices: {}", e),
    })?;

    Ok(label_devices(devices.filter_map(|d| d.name().ok())))
}

/// Resolve an input device by exact name, or the best default.
///
/// The default prefers PipeWire, then PulseAudio, then the system default,
/// so the desktop's device selection is respected.
fn find_input_device(device_name: Option<&str>) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.input_devices().map_err(|e| LiveError::AudioCapture {
            message: format!("Failed to enumerate devices: {}", e),
        })?;

        match device_name {
            Some(name) => devices
                .into_iter()
                .find(|d| d.name().is_ok_and(|n| n == name))
                .ok_or_else(|| LiveError::AudioDeviceNotFound {
                    device: name.to_string(),
                }),
            None => devices
                .into_iter()
                .find(|d| d.name().is_ok_and(|n| is_preferred_device(&n)))
                .or_else(|| host.default_input_device())
                .ok_or_else(|| LiveError::AudioDeviceNotFound {
                    device: "default".to_string(),
                }),
        }
    })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: The stream is only touched through `&mut self` of its owner, never
/// from two threads at once.
pub(crate) struct SendableStream(pub(crate) cpal::Stream);

unsafe impl Send for SendableStream {}

/// Shared slot for the session's sample callback.
///
/// The stream is rebuilt when the preferred format never delivers data, so
/// the callback lives outside any single stream.
type SharedCallback = Arc<Mutex<Option<SampleCallback>>>;

/// Microphone backed by a CPAL input device.
///
/// Delivers mono f32 at 16kHz. Tries that format directly first, then falls
/// back to the device's native config with software down-mix and resampling.
pub struct CpalMicrophone {
    device_name: Option<String>,
    sample_rate: u32,
    device: Option<cpal::Device>,
    stream: Option<SendableStream>,
    callback: SharedCallback,
    callback_count: Arc<AtomicU64>,
}

impl CpalMicrophone {
    /// Create a microphone for `device_name`, or the best default when `None`.
    ///
    /// No device is opened until [`Microphone::acquire`].
    pub fn new(device_name: Option<&str>) -> Self {
        Self {
            device_name: device_name.map(str::to_string),
            sample_rate: defaults::CAPTURE_SAMPLE_RATE,
            device: None,
            stream: None,
            callback: Arc::new(Mutex::new(None)),
            callback_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Override the delivered sample rate.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    fn device(&self) -> Result<&cpal::Device> {
        self.device.as_ref().ok_or_else(|| LiveError::AudioCapture {
            message: "microphone not acquired".to_string(),
        })
    }

    /// Build the stream, preferring f32/16kHz/mono.
    fn build_stream(&self) -> Result<cpal::Stream> {
        let device = self.device()?;
        let preferred = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let callback = Arc::clone(&self.callback);
        let counter = Arc::clone(&self.callback_count);
        match device.build_input_stream(
            &preferred,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                counter.fetch_add(1, Ordering::Relaxed);
                deliver(&callback, data);
            },
            |err| error!("audio input stream error: {}", err),
            None,
        ) {
            Ok(stream) => Ok(stream),
            Err(e) => {
                debug!("preferred capture format rejected: {}", e);
                self.build_stream_native()
            }
        }
    }

    /// Build a stream at the device's native config, converting in software.
    fn build_stream_native(&self) -> Result<cpal::Stream> {
        use cpal::SampleFormat;

        let device = self.device()?;
        let native = device
            .default_input_config()
            .map_err(|e| LiveError::AudioCapture {
                message: format!("Failed to query default input config: {}", e),
            })?;

        let native_rate = native.sample_rate().0;
        let channels = native.channels() as usize;
        let target_rate = self.sample_rate;
        let stream_config: cpal::StreamConfig = native.clone().into();

        info!(
            channels,
            rate = native_rate,
            format = ?native.sample_format(),
            "using native capture format, converting in software"
        );

        let callback = Arc::clone(&self.callback);
        let counter = Arc::clone(&self.callback_count);
        let err_fn = |err| error!("audio input stream error: {}", err);

        let stream = match native.sample_format() {
            SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    counter.fetch_add(1, Ordering::Relaxed);
                    let mono = mix_to_mono(data, channels);
                    deliver(&callback, &resample(&mono, native_rate, target_rate));
                },
                err_fn,
                None,
            ),
            SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    counter.fetch_add(1, Ordering::Relaxed);
                    let floats: Vec<f32> = data
                        .iter()
                        .map(|&s| s as f32 / defaults::PCM_SCALE)
                        .collect();
                    let mono = mix_to_mono(&floats, channels);
                    deliver(&callback, &resample(&mono, native_rate, target_rate));
                },
                err_fn,
                None,
            ),
            fmt => {
                return Err(LiveError::AudioCapture {
                    message: format!(
                        "Unsupported native sample format: {:?}. \
                         Try specifying a device with --input-device.",
                        fmt
                    ),
                });
            }
        };

        stream.map_err(|e| LiveError::AudioCapture {
            message: format!("Failed to build native input stream: {}", e),
        })
    }
}

fn deliver(callback: &SharedCallback, samples: &[f32]) {
    if let Ok(mut slot) = callback.lock()
        && let Some(cb) = slot.as_mut()
    {
        cb(samples);
    }
}

/// How long a fresh stream gets to deliver its first callback.
const FIRST_CALLBACK_DELAY: Duration = Duration::from_millis(200);

/// Sleep without stalling async tasks scheduled on the calling worker.
///
/// On a multi-threaded tokio runtime the worker hands its queue to another
/// thread first; elsewhere this is a plain sleep.
fn wait_off_runtime(delay: Duration) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(|| std::thread::sleep(delay));
        }
        _ => std::thread::sleep(delay),
    }
}

impl Microphone for CpalMicrophone {
    fn acquire(&mut self) -> Result<()> {
        if self.device.is_some() {
            return Ok(());
        }
        let device = find_input_device(self.device_name.as_deref())?;

        // Probing the config is the first call that needs device access
        device
            .default_input_config()
            .map_err(|e| LiveError::PermissionDenied {
                message: e.to_string(),
            })?;

        if let Ok(name) = device.name() {
            info!(device = %name, "microphone acquired");
        }
        self.device = Some(device);
        Ok(())
    }

    fn start(&mut self, on_samples: SampleCallback) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        if let Ok(mut slot) = self.callback.lock() {
            *slot = Some(on_samples);
        }
        self.callback_count.store(0, Ordering::Relaxed);

        let stream = self.build_stream()?;
        stream.play().map_err(|e| LiveError::AudioCapture {
            message: format!("Failed to start audio stream: {}", e),
        })?;

        // Some PipeWire-ALSA setups accept non-native configs but never fire the callback
        wait_off_runtime(FIRST_CALLBACK_DELAY);

        let stream = if self.callback_count.load(Ordering::Relaxed) == 0 {
            warn!("capture stream delivered no data, retrying with native format");
            drop(stream);
            let native = self.build_stream_native()?;
            native.play().map_err(|e| LiveError::AudioCapture {
                message: format!("Failed to start native audio stream: {}", e),
            })?;
            native
        } else {
            stream
        };

        self.stream = Some(SendableStream(stream));
        Ok(())
    }

    fn release(&mut self) {
        if let Some(stream) = self.stream.take()
            && let Err(e) = stream.0.pause()
        {
            warn!("failed to pause input stream: {}", e);
        }
        if let Ok(mut slot) = self.callback.lock() {
            *slot = None;
        }
        if self.device.take().is_some() {
            debug!("microphone released");
        }
    }

    fn is_acquired(&self) -> bool {
        self.device.is_some()
    }
}

impl Drop for CpalMicrophone {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_first_callback_wait_keeps_worker_free() {
        let waiter = tokio::spawn(async { wait_off_runtime(Duration::from_millis(500)) });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The only worker is inside the wait; this task still gets to run
        let other = tokio::spawn(async { 7 });
        let result = tokio::time::timeout(Duration::from_millis(250), other).await;
        assert_eq!(result.unwrap().unwrap(), 7);
        waiter.await.unwrap();
    }

    #[test]
    fn test_first_callback_wait_outside_runtime() {
        let started = std::time::Instant::now();
        wait_off_runtime(Duration::from_millis(10));
        assert!(started.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_should_filter_device() {
        assert!(should_filter_device("surround51"));
        assert!(should_filter_device("front:CARD=PCH"));
        assert!(should_filter_device("Digital Output S/PDIF"));
        assert!(!should_filter_device("pipewire"));
        assert!(!should_filter_device("Built-in Audio"));
    }

    #[test]
    fn test_is_preferred_device() {
        assert!(is_preferred_device("PipeWire"));
        assert!(is_preferred_device("pulse"));
        assert!(!is_preferred_device("hw:0,0"));
        assert!(!is_preferred_device("default"));
    }

    #[test]
    fn test_label_devices() {
        let labeled = label_devices(vec![
            "pipewire".to_string(),
            "surround40:CARD=PCH".to_string(),
            "hw:0,0".to_string(),
        ]);
        assert_eq!(labeled, vec!["pipewire [recommended]", "hw:0,0"]);
    }

    #[test]
    fn test_new_does_not_open_device() {
        let mic = CpalMicrophone::new(Some("NonExistentDevice12345"));
        assert!(!mic.is_acquired());
    }

    #[test]
    fn test_start_without_acquire_fails() {
        let mut mic = CpalMicrophone::new(None);
        assert!(mic.start(Box::new(|_| {})).is_err());
        mic.release();
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn test_acquire_unknown_device() {
        let mut mic = CpalMicrophone::new(Some("NonExistentDevice12345"));
        match mic.acquire() {
            Err(LiveError::AudioDeviceNotFound { device }) => {
                assert_eq!(device, "NonExistentDevice12345");
            }
            other => panic!("Expected AudioDeviceNotFound, got {:?}", other.err()),
        }
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn test_capture_delivers_samples() {
        let received = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&received);

        let mut mic = CpalMicrophone::new(None);
        mic.acquire().expect("Failed to acquire microphone");
        mic.start(Box::new(move |s| {
            counter.fetch_add(s.len() as u64, Ordering::Relaxed);
        }))
        .expect("Failed to start capture");
        std::thread::sleep(std::time::Duration::from_millis(300));
        mic.release();

        assert!(received.load(Ordering::Relaxed) > 0);
        assert!(!mic.is_acquired());
    }
}
