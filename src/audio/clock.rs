//! Sample-count clock shared by the decoder and render threads

use std::sync::atomic::{AtomicU64, Ordering};

/// Running count of sample frames handed to the audio device
///
/// The decoder adds to it after every accepted push and resets it once per
/// section start. Readers never take a lock.
#[derive(Debug, Default)]
pub struct AudioClock {
    samples: AtomicU64,
}

impl AudioClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `frames` more sample frames as queued
    pub fn add(&self, frames: u64) {
        self.samples.fetch_add(frames, Ordering::AcqRel);
    }

    /// Total sample frames queued since the last reset
    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.samples.store(0, Ordering::Release);
    }
}
