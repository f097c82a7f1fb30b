//! Section-driven decode loop
//!
//! Runs on its own thread. For every section published through
//! [`PlaybackInstructions`] it seeks the source to the start offset, decodes
//! forward while counting packet bytes, pushes PCM to the audio sink and
//! frames into the [`FrameQueue`], and finally drains both before handing
//! the instructions lock back to the controller.
//!
//! Lock order is always instructions, then queue. Nothing here takes the
//! instructions lock while holding the queue lock.

use crate::audio::{AudioClock, AudioSink, DrainOutcome};
use crate::decoder::{Frame, FrameQueue, MediaSource, PacketInfo, PcmBuffer, StreamKind};
use crate::player::context::{PlaybackStats, SharedContext};
use crate::player::instructions::{PlaybackInstructions, Section};
use crate::utils::config::PlaybackConfig;
use crate::utils::error::{Result, VobPlayerError};
use crossbeam::channel::Sender;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest single condition-variable wait before flags are re-checked
const WAIT_SLICE: Duration = Duration::from_millis(25);

/// How long an idle decoder sleeps between checks for new instructions
const IDLE_WAIT: Duration = Duration::from_millis(50);

/// Notifications from the decoder thread to the controller
#[derive(Debug, Clone, PartialEq)]
pub enum DecoderEvent {
    /// Decoding of a section began
    SectionStarted { section: Section, epoch: u64 },

    /// The section played to its end offset (or end of file) and drained
    SectionEnded { section: Section },

    /// The section was abandoned because the controller asked for another one
    Redirected { section: Section },

    /// Decoding stopped for good
    Failed { reason: String },
}

/// Timeouts and limits for the decode loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecoderSettings {
    /// Wait for queue space (video) or ring space (audio) before giving up
    pub enqueue_timeout: Duration,

    /// Sleep between audio drain polls
    pub drain_poll_interval: Duration,

    /// Upper bound on each drain phase at section end
    pub drain_timeout: Duration,

    /// Corrupt packets in a row before the section is treated as failed
    pub max_consecutive_errors: u32,
}

impl From<&PlaybackConfig> for DecoderSettings {
    fn from(config: &PlaybackConfig) -> Self {
        Self {
            enqueue_timeout: config.enqueue_timeout(),
            drain_poll_interval: config.drain_poll_interval(),
            drain_timeout: config.drain_timeout(),
            max_consecutive_errors: config.max_consecutive_decode_errors,
        }
    }
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self::from(&PlaybackConfig::default())
    }
}

/// How a section finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionOutcome {
    Completed,
    Redirected,
    Exit,
}

/// Whether the current packet was handled or a flag cut it short
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Interrupted,
}

/// Decoder thread state
pub struct DecodeLoop<S: MediaSource> {
    source: S,
    queue: Arc<FrameQueue<Frame>>,
    audio: Arc<dyn AudioSink>,
    clock: Arc<AudioClock>,
    instructions: Arc<PlaybackInstructions>,
    ctx: Arc<SharedContext>,
    events: Sender<DecoderEvent>,
    settings: DecoderSettings,
}

impl<S: MediaSource> DecodeLoop<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: S,
        queue: Arc<FrameQueue<Frame>>,
        audio: Arc<dyn AudioSink>,
        clock: Arc<AudioClock>,
        instructions: Arc<PlaybackInstructions>,
        ctx: Arc<SharedContext>,
        events: Sender<DecoderEvent>,
        settings: DecoderSettings,
    ) -> Self {
        Self {
            source,
            queue,
            audio,
            clock,
            instructions,
            ctx,
            events,
            settings,
        }
    }

    /// Decode sections until exit is requested or decoding fails
    pub fn run(mut self) -> Result<()> {
        let instructions = Arc::clone(&self.instructions);

        while !self.ctx.exit_requested() {
            let mut guard = instructions.lock();

            if !instructions.ready_to_decode() {
                // Between sections: let the controller in
                instructions.wait_for_update(&mut guard, IDLE_WAIT);
                continue;
            }

            let section = *guard;
            match self.play_section(section) {
                Ok(SectionOutcome::Completed) => {
                    instructions.mark_end_reached();
                    drop(guard);
                    PlaybackStats::bump(&self.ctx.stats.sections_completed);
                    info!("Section {}..{} finished", section.start, display_end(&section));
                    let _ = self.events.send(DecoderEvent::SectionEnded { section });
                }
                Ok(SectionOutcome::Redirected) => {
                    instructions.mark_end_reached();
                    drop(guard);
                    info!("Section {}..{} abandoned for a new section", section.start, display_end(&section));
                    let _ = self.events.send(DecoderEvent::Redirected { section });
                }
                Ok(SectionOutcome::Exit) => break,
                Err(e) => {
                    error!("Decoding stopped: {}", e);
                    self.discard_buffers();
                    instructions.mark_end_reached();
                    drop(guard);
                    self.ctx.request_exit();
                    let _ = self.events.send(DecoderEvent::Failed { reason: e.to_string() });
                    return Err(e);
                }
            }
        }

        self.discard_buffers();
        debug!("Decoder thread exiting");
        Ok(())
    }

    fn play_section(&mut self, section: Section) -> Result<SectionOutcome> {
        let epoch = self.ctx.next_epoch();

        // Anything still buffered belongs to the previous section
        self.discard_buffers();
        self.clock.reset();

        self.source.seek_to_byte(section.start)?;
        self.source.flush();

        info!(
            "Section {}..{} start (epoch {}, audio only: {})",
            section.start,
            display_end(&section),
            epoch,
            section.audio_only
        );
        let _ = self.events.send(DecoderEvent::SectionStarted { section, epoch });

        let mut offset = section.start;
        let mut consecutive_errors = 0u32;

        loop {
            if let Some(outcome) = self.interruption() {
                return Ok(self.abandon(outcome));
            }

            let (info, packet) = match self.source.read_packet() {
                Ok(Some(next)) => next,
                Ok(None) => {
                    debug!("End of file at byte {}", offset);
                    match self.finish_stream(&section, epoch) {
                        Ok(Flow::Continue) => break,
                        // Handled by the flag check at the top of the loop
                        Ok(Flow::Interrupted) => continue,
                        Err(e) if e.is_transient() => {
                            warn!("Dropping the decoders' last frames: {}", e);
                            break;
                        }
                        Err(e) => return Err(e),
                    }
                }
                Err(e) if e.is_transient() => {
                    self.note_transient(&e, &mut consecutive_errors)?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            offset = offset.saturating_add(info.size as u64);
            if offset > section.end {
                break;
            }

            match self.dispatch(&section, epoch, info, &packet) {
                Ok(Flow::Continue) => consecutive_errors = 0,
                // Flags are re-checked at the top of the loop
                Ok(Flow::Interrupted) => {}
                Err(e) if e.is_transient() => self.note_transient(&e, &mut consecutive_errors)?,
                Err(e) => return Err(e),
            }
        }

        Ok(self.drain())
    }

    fn dispatch(&mut self, section: &Section, epoch: u64, info: PacketInfo, packet: &S::Packet) -> Result<Flow> {
        match info.stream {
            StreamKind::Audio => self.handle_audio(packet),
            StreamKind::Video if !section.audio_only => self.handle_video(packet, epoch),
            StreamKind::Video | StreamKind::Other => Ok(Flow::Continue),
        }
    }

    fn handle_audio(&mut self, packet: &S::Packet) -> Result<Flow> {
        let mut buffers: Vec<PcmBuffer> = Vec::new();
        self.source.decode_audio(packet, &mut buffers)?;

        for buffer in &buffers {
            if self.push_audio(&buffer.samples) == Flow::Interrupted {
                return Ok(Flow::Interrupted);
            }
        }
        Ok(Flow::Continue)
    }

    /// Hand samples to the device, waiting for ring space
    ///
    /// If the device stays full past the enqueue timeout the rest of the
    /// buffer is discarded. The clock still advances over the discarded
    /// frames so it keeps following content time and video is not held
    /// back by the gap.
    fn push_audio(&self, samples: &[i16]) -> Flow {
        let channels = self.audio.format().channels.max(1) as usize;
        let deadline = Instant::now() + self.settings.enqueue_timeout;
        let mut offset = 0;

        while offset < samples.len() {
            let accepted = self.audio.try_queue(&samples[offset..]);
            if accepted > 0 {
                let frames = (accepted / channels) as u64;
                self.clock.add(frames);
                self.ctx.stats.audio_samples_queued.fetch_add(frames, std::sync::atomic::Ordering::Relaxed);
                offset += accepted;
                continue;
            }

            if self.interruption().is_some() {
                return Flow::Interrupted;
            }

            let now = Instant::now();
            if now >= deadline {
                let skipped = samples.len() - offset;
                warn!(
                    "Audio device full for {:?}, discarding {} samples",
                    self.settings.enqueue_timeout, skipped
                );
                self.clock.add((skipped / channels) as u64);
                break;
            }
            std::thread::sleep(self.settings.drain_poll_interval.min(deadline - now));
        }
        Flow::Continue
    }

    fn handle_video(&mut self, packet: &S::Packet, epoch: u64) -> Result<Flow> {
        let mut frames: Vec<Frame> = Vec::new();
        self.source.decode_video(packet, &mut frames)?;
        Ok(self.enqueue_all(frames, epoch))
    }

    fn enqueue_all(&self, frames: Vec<Frame>, epoch: u64) -> Flow {
        for mut frame in frames {
            frame.epoch = epoch;
            if self.enqueue_video(frame) == Flow::Interrupted {
                return Flow::Interrupted;
            }
        }
        Flow::Continue
    }

    /// Hand out what the codecs held back once the file has ended
    fn finish_stream(&mut self, section: &Section, epoch: u64) -> Result<Flow> {
        let mut pcm: Vec<PcmBuffer> = Vec::new();
        let mut frames: Vec<Frame> = Vec::new();
        self.source.drain_decoders(&mut pcm, &mut frames)?;

        for buffer in &pcm {
            if self.push_audio(&buffer.samples) == Flow::Interrupted {
                return Ok(Flow::Interrupted);
            }
        }

        if section.audio_only {
            return Ok(Flow::Continue);
        }
        Ok(self.enqueue_all(frames, epoch))
    }

    /// Wait for queue space, then move the frame in
    ///
    /// A frame that cannot be placed within the enqueue timeout is dropped;
    /// video pacing is best effort and decoding must not stall.
    fn enqueue_video(&self, frame: Frame) -> Flow {
        let deadline = Instant::now() + self.settings.enqueue_timeout;
        let mut guard = self.queue.lock();

        loop {
            if !guard.is_full() {
                if let Err(frame) = guard.enqueue(frame) {
                    // Cannot happen with the lock held, but the frame is released either way
                    warn!("Frame pts {} rejected by non-full queue", frame.pts);
                    return Flow::Continue;
                }
                PlaybackStats::bump(&self.ctx.stats.frames_enqueued);
                return Flow::Continue;
            }

            if self.interruption().is_some() {
                return Flow::Interrupted;
            }

            let now = Instant::now();
            if now >= deadline {
                PlaybackStats::bump(&self.ctx.stats.frames_dropped_queue_full);
                warn!(
                    "Video queue full for {:?}, dropping frame pts {}",
                    self.settings.enqueue_timeout, frame.pts
                );
                return Flow::Continue;
            }
            guard.wait_not_full(WAIT_SLICE.min(deadline - now));
        }
    }

    /// Wait for the device and the render thread to consume the section
    fn drain(&mut self) -> SectionOutcome {
        let ctx = Arc::clone(&self.ctx);
        let instructions = Arc::clone(&self.instructions);
        let cancel = move || ctx.exit_requested() || instructions.redirect_requested();

        match self.audio.wait_drained(
            self.settings.drain_timeout,
            self.settings.drain_poll_interval,
            &cancel,
        ) {
            DrainOutcome::Drained => {}
            DrainOutcome::Interrupted => {
                let outcome = self.interruption().unwrap_or(SectionOutcome::Redirected);
                return self.abandon(outcome);
            }
            DrainOutcome::TimedOut => {
                warn!(
                    "Audio device still holds {} bytes after {:?}, discarding",
                    self.audio.queued_bytes(),
                    self.settings.drain_timeout
                );
                self.audio.clear();
            }
        }

        let deadline = Instant::now() + self.settings.drain_timeout;
        let mut guard = self.queue.lock();
        while !guard.is_empty() {
            if let Some(outcome) = self.interruption() {
                drop(guard);
                return self.abandon(outcome);
            }

            let now = Instant::now();
            if now >= deadline {
                warn!("{} frames left unrendered after {:?}, discarding", guard.len(), self.settings.drain_timeout);
                drop(guard);
                self.queue.clear();
                return SectionOutcome::Completed;
            }
            guard.wait_empty(WAIT_SLICE.min(deadline - now));
        }

        SectionOutcome::Completed
    }

    /// Exit beats redirect when both are pending
    fn interruption(&self) -> Option<SectionOutcome> {
        if self.ctx.exit_requested() {
            Some(SectionOutcome::Exit)
        } else if self.instructions.redirect_requested() {
            Some(SectionOutcome::Redirected)
        } else {
            None
        }
    }

    fn abandon(&self, outcome: SectionOutcome) -> SectionOutcome {
        self.discard_buffers();
        outcome
    }

    fn discard_buffers(&self) {
        let dropped = self.queue.clear();
        self.audio.clear();
        if dropped > 0 {
            debug!("Discarded {} queued frames", dropped);
        }
    }

    fn note_transient(&self, err: &VobPlayerError, consecutive: &mut u32) -> Result<()> {
        *consecutive += 1;
        PlaybackStats::bump(&self.ctx.stats.decode_errors);

        if *consecutive >= self.settings.max_consecutive_errors {
            return Err(VobPlayerError::Decoder(format!(
                "{} consecutive corrupt packets, last: {}",
                consecutive, err
            )));
        }

        warn!("Skipping packet: {}", err);
        Ok(())
    }
}

fn display_end(section: &Section) -> String {
    if section.runs_to_end_of_file() {
        "EOF".to_string()
    } else {
        section.end.to_string()
    }
}
