//! Audio/video synchronization logic for VobPlayer
//!
//! Audio is the master clock. The position the listener has actually heard
//! is estimated from the samples handed to the device minus what the device
//! still holds, plus a fixed output latency. Video frames are then delayed,
//! presented or dropped relative to that position.

use crate::audio::{AudioClock, AudioFormat, AudioSink};
use crate::decoder::TimeBase;
use crate::utils::config::SyncConfig;
use std::sync::Arc;
use std::time::Duration;

/// Tunable sync constants
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncPolicy {
    /// Added to the audio position to account for device buffering
    pub hardware_latency_ms: f64,

    /// Frames trailing audio by more than this are dropped
    pub lag_tolerance_ms: f64,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SyncPolicy {
    fn from(config: &SyncConfig) -> Self {
        Self {
            hardware_latency_ms: config.hardware_latency_ms,
            lag_tolerance_ms: config.lag_tolerance_ms,
        }
    }
}

/// What to do with a dequeued frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameAction {
    /// Present the frame immediately
    Present,

    /// The frame is early; sleep this long, then present it
    Delay(Duration),

    /// The frame is too late; release it without presenting
    Drop,
}

impl SyncPolicy {
    /// Compare a frame's time against the audio position
    pub fn decide(&self, audio_time_ms: f64, video_time_ms: f64) -> FrameAction {
        if video_time_ms > audio_time_ms {
            FrameAction::Delay(Duration::from_secs_f64((video_time_ms - audio_time_ms) / 1000.0))
        } else if audio_time_ms - video_time_ms > self.lag_tolerance_ms {
            FrameAction::Drop
        } else {
            FrameAction::Present
        }
    }
}

/// Sample frames the listener has heard
///
/// `clock_samples` counts frames handed to the device; whatever the device
/// still buffers has not been played yet.
pub fn played_samples(clock_samples: u64, queued_bytes: usize, format: &AudioFormat) -> u64 {
    let bytes_per_frame = format.bytes_per_frame().max(1);
    clock_samples.saturating_sub((queued_bytes / bytes_per_frame) as u64)
}

/// Audio position in milliseconds including output latency
pub fn audio_time_ms(played_samples: u64, format: &AudioFormat, policy: &SyncPolicy) -> f64 {
    if format.sample_rate == 0 {
        return policy.hardware_latency_ms;
    }
    played_samples as f64 * (1000.0 / format.sample_rate as f64) + policy.hardware_latency_ms
}

/// Presentation time of a timestamp in milliseconds
pub fn video_time_ms(pts: i64, time_base: TimeBase) -> f64 {
    pts as f64 * time_base.ms_per_tick()
}

/// Audio-master sync decisions for the render thread
pub struct AVSyncController {
    clock: Arc<AudioClock>,
    sink: Arc<dyn AudioSink>,
    format: AudioFormat,
    policy: SyncPolicy,
    time_base: TimeBase,
}

impl AVSyncController {
    pub fn new(
        clock: Arc<AudioClock>,
        sink: Arc<dyn AudioSink>,
        policy: SyncPolicy,
        time_base: TimeBase,
    ) -> Self {
        let format = sink.format();
        Self {
            clock,
            sink,
            format,
            policy,
            time_base,
        }
    }

    /// Current audio position in milliseconds
    pub fn audio_time_ms(&self) -> f64 {
        let played = played_samples(self.clock.samples(), self.sink.queued_bytes(), &self.format);
        audio_time_ms(played, &self.format, &self.policy)
    }

    /// Decide what to do with a frame stamped `pts`
    pub fn evaluate(&self, pts: i64) -> FrameAction {
        let audio_ms = self.audio_time_ms();
        let video_ms = video_time_ms(pts, self.time_base);
        let action = self.policy.decide(audio_ms, video_ms);
        log::trace!(
            "sync: audio {:.1} ms, video {:.1} ms -> {:?}",
            audio_ms,
            video_ms,
            action
        );
        action
    }
}
