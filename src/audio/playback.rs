//! Audio output using CPAL: a small mixer driven by the device callback.
//!
//! Scheduled buffers reach the audio thread over a lock-free channel. The
//! callback sums every buffer overlapping the frames it renders, advances a
//! frame clock, and reports buffers that played to the end.

use crate::audio::capture::{SendableStream, is_preferred_device, label_devices, with_suppressed_stderr};
use crate::audio::output::{AudioOutput, EndedNotifier, SourceId};
use crate::audio::resample::resample;
use crate::error::{LiveError, Result};
use crate::pipeline::types::AudioChunk;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info, warn};

/// List available audio output devices, preferred ones marked "\[recommended\]".
///
/// # Errors
/// Returns `LiveError::AudioPlayback` if device enumeration fails.
pub fn list_output_devices() -> Result<Vec<String>> {
    let devices = with_suppressed_stderr(|| cpal::default_host().output_devices());
    let devices = devices.map_err(|e| LiveError::AudioPlayback {
        message: format!("Failed to enumerate output devices: {}", e),
    })?;

    Ok(label_devices(devices.filter_map(|d| d.name().ok())))
}

fn find_output_device(device_name: Option<&str>) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.output_devices().map_err(|e| LiveError::AudioPlayback {
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
                .or_else(|| host.default_output_device())
                .ok_or_else(|| LiveError::AudioDeviceNotFound {
                    device: "default".to_string(),
                }),
        }
    })
}

/// One buffer placed on the device timeline.
#[derive(Debug)]
struct Voice {
    id: SourceId,
    /// First device frame of the buffer.
    start: u64,
    /// Mono samples at the device rate.
    samples: Vec<f32>,
}

impl Voice {
    fn end(&self) -> u64 {
        self.start + self.samples.len() as u64
    }
}

#[derive(Debug)]
enum Command {
    Play(Voice),
    Stop(SourceId),
}

/// State owned by the output callback.
struct Mixer {
    commands: Receiver<Command>,
    voices: Vec<Voice>,
    clock: Arc<AtomicU64>,
    ended: EndedNotifier,
    channels: usize,
}

impl Mixer {
    /// Fill one interleaved device buffer.
    fn render(&mut self, out: &mut [f32]) {
        while let Ok(cmd) = self.commands.try_recv() {
            match cmd {
                Command::Play(voice) => self.voices.push(voice),
                Command::Stop(id) => self.voices.retain(|v| v.id != id),
            }
        }

        out.fill(0.0);
        let channels = self.channels.max(1);
        let frames = out.len() / channels;
        let base = self.clock.load(Ordering::Relaxed);

        for voice in &self.voices {
            let first = voice.start.saturating_sub(base) as usize;
            if first >= frames {
                continue;
            }
            let offset = (base + first as u64 - voice.start) as usize;
            let samples = voice.samples.get(offset..).unwrap_or(&[]);
            for (frame, &s) in (first..frames).zip(samples) {
                for sample in &mut out[frame * channels..(frame + 1) * channels] {
                    *sample += s;
                }
            }
        }

        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }

        let end = base + frames as u64;
        self.clock.store(end, Ordering::Relaxed);

        let ended = &self.ended;
        self.voices.retain(|v| {
            if v.end() <= end {
                // Receiver gone means the session already tore down
                let _ = ended.send(v.id);
                false
            } else {
                true
            }
        });
    }
}

/// Output device backed by CPAL, with its own frame clock.
pub struct CpalOutput {
    device_name: Option<String>,
    stream: Option<SendableStream>,
    commands: Option<Sender<Command>>,
    clock: Arc<AtomicU64>,
    device_rate: u32,
}

impl CpalOutput {
    /// Create an output for `device_name`, or the best default when `None`.
    ///
    /// No device is opened until [`AudioOutput::open`].
    pub fn new(device_name: Option<&str>) -> Self {
        Self {
            device_name: device_name.map(str::to_string),
            stream: None,
            commands: None,
            clock: Arc::new(AtomicU64::new(0)),
            device_rate: 0,
        }
    }

    fn build_stream(&self, device: &cpal::Device, mixer: Mixer) -> Result<(cpal::Stream, u32)> {
        use cpal::SampleFormat;

        let config = device
            .default_output_config()
            .map_err(|e| LiveError::AudioPlayback {
                message: format!("Failed to query default output config: {}", e),
            })?;
        let rate = config.sample_rate().0;
        let stream_config: cpal::StreamConfig = config.clone().into();
        let err_fn = |err| error!("audio output stream error: {}", err);

        info!(
            channels = config.channels(),
            rate,
            format = ?config.sample_format(),
            "opening audio output"
        );

        let mut mixer = mixer;
        let stream = match config.sample_format() {
            SampleFormat::F32 => device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| mixer.render(data),
                err_fn,
                None,
            ),
            SampleFormat::I16 => {
                let mut scratch = Vec::new();
                device.build_output_stream(
                    &stream_config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        scratch.resize(data.len(), 0.0);
                        mixer.render(&mut scratch);
                        for (out, &s) in data.iter_mut().zip(&scratch) {
                            *out = (s * i16::MAX as f32) as i16;
                        }
                    },
                    err_fn,
                    None,
                )
            }
            fmt => {
                return Err(LiveError::AudioPlayback {
                    message: format!(
                        "Unsupported output sample format: {:?}. \
                         Try specifying a device with --output-device.",
                        fmt
                    ),
                });
            }
        };

        let stream = stream.map_err(|e| LiveError::AudioPlayback {
            message: format!("Failed to build output stream: {}", e),
        })?;
        Ok((stream, rate))
    }
}

impl AudioOutput for CpalOutput {
    fn open(&mut self, ended: EndedNotifier) -> Result<()> {
        self.close();

        let device = find_output_device(self.device_name.as_deref())?;
        let (tx, rx) = crossbeam_channel::unbounded();
        self.clock.store(0, Ordering::Relaxed);

        let channels = device
            .default_output_config()
            .map(|c| c.channels() as usize)
            .unwrap_or(1);
        let mixer = Mixer {
            commands: rx,
            voices: Vec::new(),
            clock: Arc::clone(&self.clock),
            ended,
            channels,
        };

        let (stream, rate) = self.build_stream(&device, mixer)?;
        stream.play().map_err(|e| LiveError::AudioPlayback {
            message: format!("Failed to start output stream: {}", e),
        })?;

        self.device_rate = rate;
        self.commands = Some(tx);
        self.stream = Some(SendableStream(stream));
        Ok(())
    }

    fn current_time(&self) -> f64 {
        if self.device_rate == 0 {
            return 0.0;
        }
        self.clock.load(Ordering::Relaxed) as f64 / self.device_rate as f64
    }

    fn play(&mut self, id: SourceId, start_at: f64, chunk: AudioChunk) -> Result<()> {
        let commands = self.commands.as_ref().ok_or_else(|| LiveError::AudioPlayback {
            message: "output is closed".to_string(),
        })?;

        let samples = resample(&chunk.samples, chunk.sample_rate, self.device_rate);
        let start = (start_at.max(0.0) * self.device_rate as f64).round() as u64;
        commands
            .send(Command::Play(Voice { id, start, samples }))
            .map_err(|_| LiveError::AudioPlayback {
                message: "output stream stopped".to_string(),
            })
    }

    fn stop_source(&mut self, id: SourceId) {
        if let Some(commands) = self.commands.as_ref()
            && commands.send(Command::Stop(id)).is_err()
        {
            debug!(id, "output stream gone, nothing to stop");
        }
    }

    fn close(&mut self) {
        self.commands = None;
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.0.pause() {
                warn!("failed to pause output stream: {}", e);
            }
            debug!("audio output closed");
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.close();
    }
}
