//! Render thread: dequeue, pace against audio, present
//!
//! Each frame is either presented immediately, presented after sleeping until
//! its timestamp comes up on the audio clock, or dropped because audio has
//! already moved past it. Frames from a section other than the one playing
//! are discarded unseen.

use crate::audio::{AVSyncController, FrameAction};
use crate::decoder::{Frame, FrameQueue};
use crate::player::context::{PlaybackStats, SharedContext};
use crate::renderer::VideoSurface;
use crate::utils::error::Result;
use log::{debug, error, trace};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest single sleep while delaying an early frame
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Consumer side of the video pipeline
pub struct RenderLoop<V: VideoSurface> {
    surface: V,
    queue: Arc<FrameQueue<Frame>>,
    sync: AVSyncController,
    ctx: Arc<SharedContext>,

    /// Wait for a frame before re-checking the exit flag
    wait_timeout: Duration,
}

impl<V: VideoSurface> RenderLoop<V> {
    pub fn new(
        surface: V,
        queue: Arc<FrameQueue<Frame>>,
        sync: AVSyncController,
        ctx: Arc<SharedContext>,
        wait_timeout: Duration,
    ) -> Self {
        Self {
            surface,
            queue,
            sync,
            ctx,
            wait_timeout,
        }
    }

    /// Render until exit is requested or the surface fails
    pub fn run(mut self) -> Result<()> {
        while !self.ctx.exit_requested() {
            let Some(frame) = self.next_frame() else {
                continue;
            };

            if let Err(e) = self.handle(frame) {
                error!("Rendering stopped: {}", e);
                self.ctx.request_exit();
                return Err(e);
            }
        }

        debug!("Render thread exiting");
        Ok(())
    }

    /// Dequeue one frame, or `None` if nothing arrived within the wait timeout
    fn next_frame(&self) -> Option<Frame> {
        let mut guard = self.queue.lock();
        if guard.is_empty() && !guard.wait_not_empty(self.wait_timeout) {
            return None;
        }
        guard.dequeue()
    }

    fn handle(&mut self, frame: Frame) -> Result<()> {
        if self.is_stale(&frame) {
            return Ok(());
        }

        match self.sync.evaluate(frame.pts) {
            FrameAction::Present => self.present(&frame),
            FrameAction::Delay(delay) => {
                trace!("Frame pts {} early by {:?}", frame.pts, delay);
                self.sleep(delay, frame.epoch);
                if self.ctx.exit_requested() || self.is_stale(&frame) {
                    return Ok(());
                }
                self.present(&frame)
            }
            FrameAction::Drop => {
                PlaybackStats::bump(&self.ctx.stats.frames_dropped_late);
                debug!(
                    "Dropping late frame pts {} (audio at {:.1} ms)",
                    frame.pts,
                    self.sync.audio_time_ms()
                );
                Ok(())
            }
        }
    }

    fn present(&mut self, frame: &Frame) -> Result<()> {
        self.surface.upload(frame)?;
        self.surface.present()?;
        PlaybackStats::bump(&self.ctx.stats.frames_presented);
        Ok(())
    }

    /// Frame belongs to a section that is no longer playing
    fn is_stale(&self, frame: &Frame) -> bool {
        if frame.epoch == self.ctx.current_epoch() {
            return false;
        }
        PlaybackStats::bump(&self.ctx.stats.frames_dropped_stale);
        trace!("Discarding frame pts {} from epoch {}", frame.pts, frame.epoch);
        true
    }

    /// Sleep in slices, cut short by exit or a section change
    fn sleep(&self, delay: Duration, epoch: u64) {
        let deadline = Instant::now() + delay;
        loop {
            if self.ctx.exit_requested() || self.ctx.current_epoch() != epoch {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}
