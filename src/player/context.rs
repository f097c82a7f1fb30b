//! State shared by every playback thread
//!
//! Built before any thread is spawned and passed to each entry point by
//! `Arc`. Everything in here is atomic.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Exit signal, section generation and counters
#[derive(Debug, Default)]
pub struct SharedContext {
    /// Global shutdown request
    exit: AtomicBool,

    /// Bumped at the start of every section
    epoch: AtomicU64,

    /// Playback counters
    pub stats: PlaybackStats,
}

impl SharedContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every thread to stop
    pub fn request_exit(&self) {
        self.exit.store(true, Ordering::Release);
    }

    pub fn exit_requested(&self) -> bool {
        self.exit.load(Ordering::Acquire)
    }

    /// Start a new section generation and return it
    pub fn next_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Generation of the section currently playing
    pub fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }
}

/// Monotonic playback counters
#[derive(Debug, Default)]
pub struct PlaybackStats {
    pub frames_enqueued: AtomicU64,
    pub frames_presented: AtomicU64,
    pub frames_dropped_late: AtomicU64,
    pub frames_dropped_queue_full: AtomicU64,
    pub frames_dropped_stale: AtomicU64,
    pub audio_samples_queued: AtomicU64,
    pub sections_completed: AtomicU64,
    pub decode_errors: AtomicU64,
}

/// Point-in-time copy of [`PlaybackStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub frames_enqueued: u64,
    pub frames_presented: u64,
    pub frames_dropped_late: u64,
    pub frames_dropped_queue_full: u64,
    pub frames_dropped_stale: u64,
    pub audio_samples_queued: u64,
    pub sections_completed: u64,
    pub decode_errors: u64,
}

impl PlaybackStats {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            frames_enqueued: load(&self.frames_enqueued),
            frames_presented: load(&self.frames_presented),
            frames_dropped_late: load(&self.frames_dropped_late),
            frames_dropped_queue_full: load(&self.frames_dropped_queue_full),
            frames_dropped_stale: load(&self.frames_dropped_stale),
            audio_samples_queued: load(&self.audio_samples_queued),
            sections_completed: load(&self.sections_completed),
            decode_errors: load(&self.decode_errors),
        }
    }
}
