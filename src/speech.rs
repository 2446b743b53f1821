//! One-shot voice-over playback of a synthesized speech payload.

use crate::audio::output::{AudioOutput, SourceId};
use crate::defaults;
use crate::error::Result;
use crate::pipeline::playback::PlaybackScheduler;
use crate::pipeline::types::ScheduledBuffer;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Slack on top of the buffer duration before `wait` gives up on the device.
const WAIT_MARGIN: Duration = Duration::from_millis(500);

/// A speech payload playing on its own output.
pub struct VoiceOver<O: AudioOutput> {
    scheduler: PlaybackScheduler<O>,
    ended: mpsc::UnboundedReceiver<SourceId>,
    buffer: Option<ScheduledBuffer>,
}

impl<O: AudioOutput> VoiceOver<O> {
    /// Decode a base64 24kHz PCM payload and start playing it now.
    ///
    /// # Errors
    /// `LiveError::Decode` for a malformed payload, or the output's open error.
    pub fn play(payload: &str, output: O) -> Result<Self> {
        Self::play_at_rate(payload, output, defaults::PLAYBACK_SAMPLE_RATE)
    }

    pub fn play_at_rate(payload: &str, output: O, sample_rate: u32) -> Result<Self> {
        let mut scheduler = PlaybackScheduler::new(output, sample_rate);
        let (tx, ended) = mpsc::unbounded_channel();
        scheduler.open(tx)?;

        let buffer = match scheduler.enqueue_payload(payload) {
            Ok(buffer) => buffer,
            Err(e) => {
                scheduler.close();
                return Err(e);
            }
        };
        if let Some(buf) = buffer.as_ref() {
            debug!(duration = buf.duration, "voice-over started");
        }

        Ok(Self {
            scheduler,
            ended,
            buffer,
        })
    }

    /// Length of the payload in seconds.
    pub fn duration(&self) -> f64 {
        self.buffer.as_ref().map_or(0.0, |b| b.duration)
    }

    /// Whether the payload is still playing.
    pub fn is_playing(&self) -> bool {
        self.buffer
            .as_ref()
            .is_some_and(|b| self.scheduler.is_active(b.id))
    }

    /// Wait until playback finishes, then close the output.
    ///
    /// Returns early if the output never reports the end of the buffer.
    pub async fn wait(&mut self) {
        if let Some(buf) = self.buffer {
            let remaining = (buf.end_at() - self.scheduler.current_time()).max(0.0);
            let limit = Duration::from_secs_f64(remaining) + WAIT_MARGIN;
            let ended = &mut self.ended;
            let finished = tokio::time::timeout(limit, async {
                while let Some(id) = ended.recv().await {
                    if id == buf.id {
                        return true;
                    }
                }
                false
            })
            .await;

            if finished.unwrap_or(false) {
                self.scheduler.on_source_ended(buf.id);
            } else {
                debug!("voice-over end not reported by the output");
            }
        }
        self.stop();
    }

    /// Stop playback and close the output. Idempotent.
    pub fn stop(&mut self) {
        self.scheduler.close();
    }
}

impl<O: AudioOutput> Drop for VoiceOver<O> {
    fn drop(&mut self) {
        self.stop();
    }
}
