//! Playback engine: owns the decoder and render threads
//!
//! The engine builds the shared state, opens the media source on the decoder
//! thread, waits until that succeeds and then starts rendering. The
//! controller talks to it through [`PlaybackEngine::retarget`] and the
//! decoder event channel.

use crate::audio::{AVSyncController, AudioClock, AudioSink, SyncPolicy};
use crate::decoder::decode_loop::DecoderSettings;
use crate::decoder::{DecodeLoop, DecoderEvent, Frame, FrameQueue, MediaSource, TimeBase};
use crate::internal_error;
use crate::player::context::{SharedContext, StatsSnapshot};
use crate::player::instructions::{PlaybackInstructions, Section};
use crate::renderer::{RenderLoop, VideoSurface};
use crate::utils::config::Config;
use crate::utils::error::{Result, VobPlayerError};
use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use log::{debug, error, info};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Everything the engine needs from the configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    /// Video frame queue capacity
    pub queue_capacity: usize,

    pub decoder: DecoderSettings,

    /// Render thread wait for a frame before re-checking exit
    pub render_wait_timeout: Duration,

    /// Bound on acquiring the instructions lock for a transition
    pub instruction_watchdog: Duration,

    /// How long to wait for the media source to open
    pub ready_timeout: Duration,

    pub sync: SyncPolicy,
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            queue_capacity: config.playback.video_queue_capacity,
            decoder: DecoderSettings::from(&config.playback),
            render_wait_timeout: config.playback.render_wait_timeout(),
            instruction_watchdog: config.playback.instruction_watchdog(),
            ready_timeout: config.playback.decoder_ready_timeout(),
            sync: SyncPolicy::from(&config.sync),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Running decode and render threads plus the state they share
pub struct PlaybackEngine {
    ctx: Arc<SharedContext>,
    instructions: Arc<PlaybackInstructions>,
    queue: Arc<FrameQueue<Frame>>,
    audio: Arc<dyn AudioSink>,
    events: Receiver<DecoderEvent>,
    time_base: TimeBase,
    watchdog: Duration,
    decoder_thread: Option<JoinHandle<Result<()>>>,
    render_thread: Option<JoinHandle<Result<()>>>,
}

impl PlaybackEngine {
    /// Open the source on a new decoder thread and start playing `initial`
    ///
    /// `open` runs on the decoder thread, so the source itself never has to
    /// cross threads. Errors from opening the source are returned here and
    /// no thread is left running.
    pub fn start<S, F, V>(
        open: F,
        audio: Arc<dyn AudioSink>,
        surface: V,
        initial: Section,
        settings: EngineSettings,
    ) -> Result<Self>
    where
        S: MediaSource + 'static,
        F: FnOnce() -> Result<S> + Send + 'static,
        V: VideoSurface + 'static,
    {
        let ctx = Arc::new(SharedContext::new());
        let instructions = Arc::new(PlaybackInstructions::new(initial));
        let queue = Arc::new(FrameQueue::new(settings.queue_capacity)?);
        let clock = Arc::new(AudioClock::new());
        let (event_tx, event_rx) = channel::unbounded();
        let (ready_tx, ready_rx) = channel::bounded::<Result<TimeBase>>(1);

        let decoder_thread = {
            let queue = Arc::clone(&queue);
            let audio = Arc::clone(&audio);
            let clock = Arc::clone(&clock);
            let instructions = Arc::clone(&instructions);
            let ctx = Arc::clone(&ctx);

            thread::Builder::new()
                .name("decoder".to_string())
                .spawn(move || {
                    let source = match open() {
                        Ok(source) => source,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return Ok(());
                        }
                    };

                    let _ = ready_tx.send(Ok(source.video_time_base()));
                    DecodeLoop::new(
                        source,
                        queue,
                        audio,
                        clock,
                        instructions,
                        ctx,
                        event_tx,
                        settings.decoder,
                    )
                    .run()
                })
                .map_err(|e| internal_error!("Failed to spawn decoder thread: {}", e))?
        };

        let time_base = match ready_rx.recv_timeout(settings.ready_timeout) {
            Ok(Ok(time_base)) => time_base,
            Ok(Err(e)) => {
                let _ = decoder_thread.join();
                return Err(e);
            }
            Err(RecvTimeoutError::Timeout) => {
                // The thread is stuck inside the demuxer; leave it detached
                ctx.request_exit();
                return Err(VobPlayerError::Sync(format!(
                    "media source did not open within {:?}",
                    settings.ready_timeout
                )));
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = decoder_thread.join();
                return Err(internal_error!("Decoder thread exited during setup"));
            }
        };

        info!("Media source ready, video time base {}/{}", time_base.num, time_base.den);

        let sync = AVSyncController::new(Arc::clone(&clock), Arc::clone(&audio), settings.sync, time_base);
        let render = RenderLoop::new(
            surface,
            Arc::clone(&queue),
            sync,
            Arc::clone(&ctx),
            settings.render_wait_timeout,
        );

        let render_thread = match thread::Builder::new()
            .name("render".to_string())
            .spawn(move || render.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                ctx.request_exit();
                instructions.wake();
                let _ = decoder_thread.join();
                return Err(internal_error!("Failed to spawn render thread: {}", e));
            }
        };

        Ok(Self {
            ctx,
            instructions,
            queue,
            audio,
            events: event_rx,
            time_base,
            watchdog: settings.instruction_watchdog,
            decoder_thread: Some(decoder_thread),
            render_thread: Some(render_thread),
        })
    }

    /// Move playback to another section
    ///
    /// Interrupts the current section if it is still decoding. Fails if the
    /// engine is shutting down or the decoder does not let go in time.
    pub fn retarget(&self, section: Section) -> Result<()> {
        if self.ctx.exit_requested() {
            return Err(VobPlayerError::Sync("playback is shutting down".to_string()));
        }
        self.instructions.retarget(section, self.watchdog)
    }

    /// Decoder notifications in the order they happened
    pub fn events(&self) -> &Receiver<DecoderEvent> {
        &self.events
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.ctx.stats.snapshot()
    }

    pub fn time_base(&self) -> TimeBase {
        self.time_base
    }

    /// Frames waiting for the render thread
    pub fn queued_frames(&self) -> usize {
        self.queue.len()
    }

    /// Bytes of PCM not yet played by the device
    pub fn queued_audio_bytes(&self) -> usize {
        self.audio.queued_bytes()
    }

    /// False once exit was requested by anyone, including a failing thread
    pub fn is_running(&self) -> bool {
        !self.ctx.exit_requested()
    }

    /// Stop both threads and wait for them
    ///
    /// Returns the first error a thread stopped with.
    pub fn shutdown(&mut self) -> Result<()> {
        self.ctx.request_exit();
        self.instructions.wake();

        let mut first_error = None;
        for (name, handle) in [
            ("decoder", self.decoder_thread.take()),
            ("render", self.render_thread.take()),
        ] {
            let Some(handle) = handle else {
                continue;
            };
            let outcome = match handle.join() {
                Ok(result) => result,
                Err(_) => Err(internal_error!("{} thread panicked", name)),
            };
            if let Err(e) = outcome {
                debug!("{} thread stopped with: {}", name, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        if self.decoder_thread.is_some() || self.render_thread.is_some() {
            if let Err(e) = self.shutdown() {
                error!("Playback ended with error: {}", e);
            }
        }
    }
}
