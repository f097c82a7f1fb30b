//! Audio output module for VobPlayer
//!
//! This module handles the audio side of playback: the device seam the
//! decoder pushes PCM into, the sample clock the render thread paces video
//! against, and the sync arithmetic that turns both into frame decisions.

pub mod clock;
mod cpal_output;
pub mod sync;

pub use clock::AudioClock;
pub use cpal_output::{CpalAudioOutput, CpalAudioQueue};
pub use sync::{AVSyncController, FrameAction, SyncPolicy};

use std::time::{Duration, Instant};

/// Audio format specification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of interleaved channels
    pub channels: u16,

    /// Bytes per single-channel sample
    pub bytes_per_sample: u16,
}

impl AudioFormat {
    /// 16-bit interleaved stereo at 48 kHz, the only format the decoder emits
    pub const STEREO_S16_48K: AudioFormat = AudioFormat {
        sample_rate: 48_000,
        channels: 2,
        bytes_per_sample: 2,
    };

    /// Bytes in one sample frame across all channels
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.bytes_per_sample as usize
    }

    /// Interleaved samples needed to hold `duration` of audio
    pub fn samples_for(&self, duration: Duration) -> usize {
        let frames = self.sample_rate as u128 * duration.as_millis() / 1000;
        frames as usize * self.channels as usize
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::STEREO_S16_48K
    }
}

/// Result of waiting for the device to play out its queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Nothing is left queued
    Drained,

    /// The caller's cancel check fired first
    Interrupted,

    /// The deadline passed with samples still queued
    TimedOut,
}

/// Audio output device as seen by the decoder and render threads
///
/// Implementations are shared between threads by reference and must accept
/// calls from any of them.
pub trait AudioSink: Send + Sync {
    /// Output format the sink plays
    fn format(&self) -> AudioFormat;

    /// Queue as many interleaved samples as fit without blocking
    ///
    /// Returns the number of samples accepted, always a prefix of `samples`.
    fn try_queue(&self, samples: &[i16]) -> usize;

    /// Bytes handed over but not yet played
    fn queued_bytes(&self) -> usize;

    /// Discard everything that has not been played yet
    fn clear(&self);

    /// Wait until the queue is empty
    ///
    /// The default polls `queued_bytes` every `poll` and gives up at
    /// `timeout`. `cancel` is checked before every sleep.
    fn wait_drained(&self, timeout: Duration, poll: Duration, cancel: &dyn Fn() -> bool) -> DrainOutcome {
        let deadline = Instant::now() + timeout;
        loop {
            if self.queued_bytes() == 0 {
                return DrainOutcome::Drained;
            }
            if cancel() {
                return DrainOutcome::Interrupted;
            }
            let now = Instant::now();
            if now >= deadline {
                return DrainOutcome::TimedOut;
            }
            std::thread::sleep(poll.min(deadline - now));
        }
    }
}
