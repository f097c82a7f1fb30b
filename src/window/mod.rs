//! Window management module for VobPlayer
//!
//! Owns the winit event loop on the main thread. The window, the wgpu
//! surface, the audio stream and the playback engine are all created on the
//! first `resumed` callback; the controller is then driven from the same
//! thread by input events and by polling decoder events between frames.

pub mod events;

pub use events::{EventHandler, WindowEvent};

use crate::audio::{AudioFormat, AudioSink, CpalAudioOutput};
use crate::decoder::FfmpegSource;
use crate::player::{Controller, EngineSettings, GameTable, PlaybackEngine, StateId, StatsSnapshot};
use crate::renderer::{SurfaceSize, WgpuSurface};
use crate::utils::config::Config;
use crate::utils::error::{IntoPlayerError, Result, VobPlayerError};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent as WinitWindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Fullscreen, Window, WindowId};

/// How often decoder events are polled while no input arrives
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The game state playback starts in
const INITIAL_STATE: StateId = StateId::MainMenu1;

/// Run the player until the window closes
///
/// Returns the final playback counters.
pub fn run(config: Config) -> Result<StatsSnapshot> {
    let table = GameTable::with_overrides(&config.state_overrides()?)?;

    let event_loop = EventLoop::new().window_err("Failed to create event loop")?;
    let mut app = App::new(config, table);
    event_loop.run_app(&mut app).window_err("Event loop error")?;

    app.finish()
}

/// Application state for the winit event loop
struct App {
    config: Config,
    table: GameTable,
    window: Option<Arc<Window>>,
    size: Arc<SurfaceSize>,

    /// Not `Send`; stays on the event-loop thread
    audio: Option<CpalAudioOutput>,

    controller: Option<Controller>,
    events: EventHandler,
    fullscreen: bool,

    /// First fatal error, reported after the loop exits
    error: Option<VobPlayerError>,

    stats: StatsSnapshot,
}

impl App {
    fn new(config: Config, table: GameTable) -> Self {
        let fullscreen = config.window.fullscreen;
        Self {
            config,
            table,
            window: None,
            size: Arc::new(SurfaceSize::default()),
            audio: None,
            controller: None,
            events: EventHandler::new(),
            fullscreen,
            error: None,
            stats: StatsSnapshot::default(),
        }
    }

    /// Create the output devices and start playback
    fn start(&mut self, window: Arc<Window>) -> Result<()> {
        let path = self
            .config
            .media
            .path
            .clone()
            .ok_or_else(|| VobPlayerError::Config("No media file given".to_string()))?;

        let audio = CpalAudioOutput::open(
            AudioFormat::STEREO_S16_48K,
            Duration::from_millis(self.config.audio.buffer_ms),
        )?;
        let sink: Arc<dyn AudioSink> = audio.queue();

        let surface = WgpuSurface::new(window, Arc::clone(&self.size))?;

        let initial = self.table.get(INITIAL_STATE).section;
        let engine = PlaybackEngine::start(
            move || FfmpegSource::open(&path),
            sink,
            surface,
            initial,
            EngineSettings::from(&self.config),
        )?;

        self.audio = Some(audio);
        self.controller = Some(Controller::new(engine, self.table.clone(), INITIAL_STATE));
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: VobPlayerError) {
        error!("{}", err);
        self.error.get_or_insert(err);
        self.stop(event_loop);
    }

    fn stop(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(controller) = self.controller.take() {
            self.stats = controller.stats();
            if let Err(e) = controller.shutdown() {
                self.error.get_or_insert(e);
            }
        }
        // The stream goes only after the decoder stopped feeding it
        self.audio = None;
        event_loop.exit();
    }

    fn toggle_fullscreen(&mut self) {
        let Some(window) = &self.window else {
            return;
        };
        self.fullscreen = !self.fullscreen;
        window.set_fullscreen(self.fullscreen.then_some(Fullscreen::Borderless(None)));
    }

    fn finish(self) -> Result<StatsSnapshot> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.stats),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title(self.config.window.title.clone())
            .with_inner_size(LogicalSize::new(self.config.window.width, self.config.window.height))
            .with_fullscreen(self.fullscreen.then_some(Fullscreen::Borderless(None)));

        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                self.fail(event_loop, VobPlayerError::Window(format!("Failed to create window: {}", e)));
                return;
            }
        };
        self.window = Some(Arc::clone(&window));

        if let Err(e) = self.start(window) {
            self.fail(event_loop, e);
            return;
        }
        info!("Playback started");
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WinitWindowEvent) {
        let Some(size) = self.window.as_ref().map(|w| w.inner_size()) else {
            return;
        };

        match self.events.handle_event(&event, size) {
            Some(WindowEvent::Exit) => self.stop(event_loop),
            Some(WindowEvent::Resized { width, height }) => self.size.set(width, height),
            Some(WindowEvent::ToggleFullscreen) => self.toggle_fullscreen(),
            Some(WindowEvent::Click { x, y }) => {
                if let Some(controller) = self.controller.as_mut() {
                    if let Err(e) = controller.handle_click(x, y) {
                        warn!("Click ignored: {}", e);
                    }
                }
            }
            None => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(controller) = self.controller.as_mut() else {
            return;
        };

        if let Err(e) = controller.poll_events() {
            self.fail(event_loop, e);
            return;
        }
        if !controller.is_running() {
            // A worker stopped on its own; shutdown reports why
            self.stop(event_loop);
            self.error
                .get_or_insert_with(|| VobPlayerError::Internal("Playback stopped unexpectedly".to_string()));
            return;
        }

        event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + POLL_INTERVAL));
    }

    fn exiting(&mut self, event_loop: &ActiveEventLoop) {
        self.stop(event_loop);
    }
}
