use crate::error::{LiveError, Result};
use std::sync::{Arc, Mutex};

/// Callback receiving mono float samples at the capture rate.
///
/// Runs on the audio thread; it must not block.
pub type SampleCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// Trait for microphone devices (the capture context).
///
/// This trait allows swapping implementations (real audio device vs mock).
pub trait Microphone: Send {
    /// Acquire the input device.
    ///
    /// # Errors
    /// `LiveError::PermissionDenied` when the device refuses access.
    fn acquire(&mut self) -> Result<()>;

    /// Begin delivering samples to `on_samples`.
    ///
    /// Only valid after [`Microphone::acquire`].
    fn start(&mut self, on_samples: SampleCallback) -> Result<()>;

    /// Stop all hardware tracks and release the device.
    ///
    /// Idempotent: releasing an idle microphone is a no-op.
    fn release(&mut self);

    /// Whether the device is currently held.
    fn is_acquired(&self) -> bool;
}

/// Observable state of a [`MockMicrophone`], shared with its clones.
#[derive(Default)]
struct MockMicState {
    acquired: bool,
    capturing: bool,
    acquire_count: usize,
    release_count: usize,
    callback: Option<SampleCallback>,
}

/// Mock microphone for testing.
///
/// Clones share state, so a test can keep one clone to inspect the device and
/// push samples after handing another to a session.
#[derive(Clone)]
pub struct MockMicrophone {
    state: Arc<Mutex<MockMicState>>,
    deny_access: bool,
    fail_start: bool,
}

impl MockMicrophone {
    /// Create a mock that grants access.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockMicState::default())),
            deny_access: false,
            fail_start: false,
        }
    }

    /// Configure the mock to refuse access on acquire
    pub fn with_permission_denied(mut self) -> Self {
        self.deny_access = true;
        self
    }

    /// Configure the mock to fail when capture starts
    pub fn with_start_failure(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Push samples through the installed callback, as the audio thread would.
    ///
    /// Returns false when capture has not been started.
    pub fn feed(&self, samples: &[f32]) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if !state.capturing {
            return false;
        }
        match state.callback.as_mut() {
            Some(cb) => {
                cb(samples);
                true
            }
            None => false,
        }
    }

    /// Whether capture is running.
    pub fn is_capturing(&self) -> bool {
        self.state.lock().map(|s| s.capturing).unwrap_or(false)
    }

    /// Number of successful acquisitions.
    pub fn acquire_count(&self) -> usize {
        self.state.lock().map(|s| s.acquire_count).unwrap_or(0)
    }

    /// Number of releases that actually released a held device.
    pub fn release_count(&self) -> usize {
        self.state.lock().map(|s| s.release_count).unwrap_or(0)
    }
}

impl Default for MockMicrophone {
    fn default() -> Self {
        Self::new()
    }
}

impl Microphone for MockMicrophone {
    fn acquire(&mut self) -> Result<()> {
        if self.deny_access {
            return Err(LiveError::PermissionDenied {
                message: "mock microphone denied".to_string(),
            });
        }
        let mut state = self
            .state
            .lock()
            .map_err(|e| LiveError::Other(format!("mock state poisoned: {}", e)))?;
        state.acquired = true;
        state.acquire_count += 1;
        Ok(())
    }

    fn start(&mut self, on_samples: SampleCallback) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| LiveError::Other(format!("mock state poisoned: {}", e)))?;
        if !state.acquired {
            return Err(LiveError::AudioCapture {
                message: "microphone not acquired".to_string(),
            });
        }
        if self.fail_start {
            return Err(LiveError::AudioCapture {
                message: "mock capture failure".to_string(),
            });
        }
        state.callback = Some(on_samples);
        state.capturing = true;
        Ok(())
    }

    fn release(&mut self) {
        if let Ok(mut state) = self.state.lock()
            && state.acquired
        {
            state.acquired = false;
            state.capturing = false;
            state.callback = None;
            state.release_count += 1;
        }
    }

    fn is_acquired(&self) -> bool {
        self.state.lock().map(|s| s.acquired).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_microphone_acquire_and_release() {
        let mut mic = MockMicrophone::new();
        assert!(!mic.is_acquired());

        mic.acquire().unwrap();
        assert!(mic.is_acquired());
        assert_eq!(mic.acquire_count(), 1);

        mic.release();
        assert!(!mic.is_acquired());
        assert_eq!(mic.release_count(), 1);
    }

    #[test]
    fn test_mock_microphone_release_is_idempotent() {
        let mut mic = MockMicrophone::new();
        mic.acquire().unwrap();
        mic.release();
        mic.release();
        mic.release();
        assert_eq!(mic.release_count(), 1);
    }

    #[test]
    fn test_mock_microphone_permission_denied() {
        let mut mic = MockMicrophone::new().with_permission_denied();
        let result = mic.acquire();
        assert!(matches!(result, Err(LiveError::PermissionDenied { .. })));
        assert!(!mic.is_acquired());
    }

    #[test]
    fn test_start_requires_acquire() {
        let mut mic = MockMicrophone::new();
        let result = mic.start(Box::new(|_| {}));
        assert!(matches!(result, Err(LiveError::AudioCapture { .. })));
    }

    #[test]
    fn test_start_failure() {
        let mut mic = MockMicrophone::new().with_start_failure();
        mic.acquire().unwrap();
        assert!(mic.start(Box::new(|_| {})).is_err());
        assert!(!mic.is_capturing());
    }

    #[test]
    fn test_feed_reaches_callback_through_clone() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);

        let observer = MockMicrophone::new();
        let mut mic = observer.clone();
        mic.acquire().unwrap();
        mic.start(Box::new(move |s| sink.lock().unwrap().extend_from_slice(s)))
            .unwrap();

        assert!(observer.feed(&[0.25, -0.25]));
        assert_eq!(*received.lock().unwrap(), vec![0.25, -0.25]);
    }

    #[test]
    fn test_feed_after_release_is_ignored() {
        let observer = MockMicrophone::new();
        let mut mic = observer.clone();
        mic.acquire().unwrap();
        mic.start(Box::new(|_| {})).unwrap();
        mic.release();
        assert!(!observer.feed(&[0.1]));
    }

    #[test]
    fn test_microphone_trait_is_object_safe() {
        let mut mic: Box<dyn Microphone> = Box::new(MockMicrophone::new());
        assert!(mic.acquire().is_ok());
        assert!(mic.start(Box::new(|_| {})).is_ok());
        mic.release();
        assert!(!mic.is_acquired());
    }
}
