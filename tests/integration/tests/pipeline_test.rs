//! End-to-end pipeline tests on a scripted disc
//!
//! These drive the real decoder and render threads through the engine and
//! the game controller, with the media source, audio device and window
//! surface replaced by in-memory doubles.

use mockall::mock;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use vobplayer::audio::AudioSink;
use vobplayer::decoder::{DecoderEvent, Frame, TimeBase};
use vobplayer::player::{Controller, PlaybackEngine, StateId};
use vobplayer::renderer::VideoSurface;
use vobplayer::testing::{MemorySink, PresentLog, RecordingSurface, ScriptedPacket, ScriptedSource};
use vobplayer::{Result, VobPlayerError};
use vobplayer_integration_tests::{
    av_packets, layout, scripted_disc, scripted_table, test_settings, wait_until, AUDIO_FRAMES, PACKET_BYTES,
};

const WAIT: Duration = Duration::from_secs(10);

fn start_controller(source: ScriptedSource) -> (Controller, Arc<PresentLog>) {
    let table = scripted_table();
    let surface = RecordingSurface::new();
    let presented = surface.log();
    let audio: Arc<dyn AudioSink> = Arc::new(MemorySink::instant());

    let engine = PlaybackEngine::start(
        move || Ok(source),
        audio,
        surface,
        table.get(StateId::MainMenu1).section,
        test_settings(),
    )
    .expect("engine starts");

    (Controller::new(engine, table, StateId::MainMenu1), presented)
}

/// Poll controller events until `state` is active
fn run_until_state(controller: &mut Controller, state: StateId) -> bool {
    wait_until(WAIT, || {
        controller.poll_events().expect("no decoder failure");
        controller.current_state() == state
    })
}

#[test]
fn test_menus_advance_on_section_end() {
    let (mut controller, presented) = start_controller(ScriptedSource::new(scripted_disc()));

    assert!(run_until_state(&mut controller, StateId::MainMenu2));
    assert!(run_until_state(&mut controller, StateId::MainMenu3));

    // The last menu loops on itself
    assert!(wait_until(WAIT, || {
        controller.poll_events().unwrap();
        controller.stats().sections_completed >= 4
    }));
    assert_eq!(controller.current_state(), StateId::MainMenu3);
    assert_eq!(controller.table().get(StateId::MainMenu3).section.start, layout::MENU_3);
    // Audio-only loops leave nothing for the render thread
    assert_eq!(controller.engine().queued_frames(), 0);

    // Only the first menu carries video; the others are audio-only loops.
    // Its last frame may still be in flight when the second menu starts.
    let stats = controller.stats();
    assert_eq!(stats.frames_presented + stats.frames_dropped_stale, 10);
    let pts = presented.pts();
    assert!(pts.len() >= 9);
    assert!(pts.iter().zip((0..).step_by(10)).all(|(pts, expected)| *pts == expected));

    assert_eq!(stats.frames_dropped_late, 0);
    assert_eq!(stats.frames_dropped_queue_full, 0);
    assert!(stats.audio_samples_queued > 0);

    controller.shutdown().unwrap();
}

#[test]
fn test_click_redirects_to_tutorial() {
    let source = ScriptedSource::new(scripted_disc()).with_read_delay(Duration::from_millis(2));
    let (mut controller, presented) = start_controller(source);

    // Let the first menu get going, then click while it is still decoding
    assert!(wait_until(WAIT, || !presented.is_empty()));
    assert!(controller.handle_click(0.5, 0.5).unwrap());
    assert_eq!(controller.current_state(), StateId::Tutorial);

    // The tutorial has no buttons
    assert!(!controller.handle_click(0.5, 0.5).unwrap());

    // Tutorial end returns to the first menu
    assert!(run_until_state(&mut controller, StateId::MainMenu1));

    let frames = presented.frames();
    let tutorial: Vec<_> = frames.iter().filter(|f| f.pts % 10 == 1).collect();
    assert!(tutorial.len() >= 9, "only {} tutorial frames shown", tutorial.len());

    // Nothing from an abandoned section shows up after its successor
    assert!(frames.windows(2).all(|pair| pair[0].epoch <= pair[1].epoch));

    let interrupted_menu = frames[0].epoch;
    assert!(tutorial.iter().all(|f| f.epoch > interrupted_menu));
    assert!(frames.iter().filter(|f| f.epoch == interrupted_menu).count() < 10);

    controller.shutdown().unwrap();
}

#[test]
fn test_decoder_failure_reaches_controller() {
    let mut packets = av_packets(2, 0);
    packets.push(ScriptedPacket::fatal(PACKET_BYTES));
    let (mut controller, _presented) = start_controller(ScriptedSource::new(packets));

    let mut failure = None;
    assert!(wait_until(WAIT, || {
        if let Err(e) = controller.poll_events() {
            failure = Some(e);
        }
        failure.is_some()
    }));

    assert!(matches!(failure, Some(VobPlayerError::Decoder(_))));
    assert!(!controller.is_running());
    assert!(matches!(controller.shutdown(), Err(VobPlayerError::Decoder(_))));
}

/// Wait on the engine's own events for the first section to end
fn wait_for_section_end(engine: &PlaybackEngine) -> bool {
    let deadline = std::time::Instant::now() + WAIT;
    while let Some(left) = deadline.checked_duration_since(std::time::Instant::now()) {
        match engine.events().recv_timeout(left) {
            Ok(DecoderEvent::SectionEnded { .. }) => return true,
            Ok(DecoderEvent::Failed { reason }) => panic!("decoder failed: {}", reason),
            Ok(_) => continue,
            Err(_) => return false,
        }
    }
    false
}

#[test]
fn test_corrupt_packets_do_not_stop_playback() {
    let mut packets = vec![ScriptedPacket::corrupt(PACKET_BYTES), ScriptedPacket::corrupt(PACKET_BYTES)];
    packets.extend(av_packets(3, 0));
    let surface = RecordingSurface::new();
    let presented = surface.log();
    let audio: Arc<dyn AudioSink> = Arc::new(MemorySink::instant());

    let mut engine = PlaybackEngine::start(
        move || Ok(ScriptedSource::new(packets)),
        audio,
        surface,
        scripted_table().get(StateId::MainMenu1).section,
        test_settings(),
    )
    .unwrap();

    assert!(wait_for_section_end(&engine));
    // Nothing moves the engine on, so the last frame cannot go stale
    assert!(wait_until(WAIT, || presented.len() == 3));
    assert_eq!(presented.pts(), vec![0, 10, 20]);
    assert_eq!(engine.stats().decode_errors, 2);

    engine.shutdown().unwrap();
}

#[test]
fn test_open_failure_is_returned_from_start() {
    let table = scripted_table();
    let audio: Arc<dyn AudioSink> = Arc::new(MemorySink::instant());

    let result = PlaybackEngine::start(
        || -> Result<ScriptedSource> { Err(VobPlayerError::InvalidInput("no such disc".to_string())) },
        audio,
        RecordingSurface::new(),
        table.get(StateId::MainMenu1).section,
        test_settings(),
    );

    assert!(matches!(result, Err(VobPlayerError::InvalidInput(_))));
}

#[test]
fn test_retarget_after_shutdown_is_rejected() {
    let audio: Arc<dyn AudioSink> = Arc::new(MemorySink::instant());
    let table = scripted_table();
    let mut engine = PlaybackEngine::start(
        || Ok(ScriptedSource::new(scripted_disc())),
        audio,
        RecordingSurface::new(),
        table.get(StateId::MainMenu1).section,
        test_settings(),
    )
    .unwrap();

    engine.shutdown().unwrap();
    assert!(!engine.is_running());
    assert!(matches!(
        engine.retarget(table.get(StateId::Tutorial).section),
        Err(VobPlayerError::Sync(_))
    ));
}

#[test]
fn test_engine_reports_time_base_and_backlog() {
    let sink = Arc::new(MemorySink::bounded(100_000));
    let audio: Arc<dyn AudioSink> = Arc::clone(&sink) as Arc<dyn AudioSink>;
    let surface = RecordingSurface::new();
    let presented = surface.log();
    let source = ScriptedSource::new(av_packets(3, 0)).with_time_base(TimeBase::new(1, 90_000));
    let mut settings = test_settings();
    settings.decoder.drain_timeout = Duration::from_secs(30);

    let mut engine = PlaybackEngine::start(
        move || Ok(source),
        audio,
        surface,
        scripted_table().get(StateId::MainMenu1).section,
        settings,
    )
    .unwrap();
    assert_eq!(engine.time_base(), TimeBase::new(1, 90_000));

    // The device never plays on its own, so all three packets stay queued
    let queued = 3 * AUDIO_FRAMES * 2 * 2;
    assert!(wait_until(WAIT, || engine.queued_audio_bytes() == queued));
    assert_eq!(engine.stats().sections_completed, 0);

    assert_eq!(sink.play(usize::MAX), queued / 2);
    assert!(wait_for_section_end(&engine));
    assert_eq!(engine.queued_audio_bytes(), 0);
    assert!(wait_until(WAIT, || presented.len() == 3 && engine.queued_frames() == 0));

    engine.shutdown().unwrap();
}

mock! {
    pub Surface {}

    impl VideoSurface for Surface {
        fn upload(&mut self, frame: &Frame) -> Result<()>;
        fn present(&mut self) -> Result<()>;
    }
}

#[test]
fn test_each_frame_is_uploaded_then_presented_once() {
    let uploads = Arc::new(Mutex::new(Vec::new()));

    let mut surface = MockSurface::new();
    let seen = Arc::clone(&uploads);
    surface.expect_upload().times(3).returning(move |frame| {
        assert_eq!((frame.width, frame.height), (4, 2));
        seen.lock().push(frame.pts);
        Ok(())
    });
    surface.expect_present().times(3).returning(|| Ok(()));

    let table = scripted_table();
    let audio: Arc<dyn AudioSink> = Arc::new(MemorySink::instant());
    let mut engine = PlaybackEngine::start(
        || Ok(ScriptedSource::new(av_packets(3, 0))),
        audio,
        surface,
        table.get(StateId::MainMenu1).section,
        test_settings(),
    )
    .unwrap();

    assert!(wait_until(WAIT, || engine.stats().frames_presented == 3));
    assert_eq!(*uploads.lock(), vec![0, 10, 20]);

    // The mock checks its call counts when the render thread drops it
    engine.shutdown().unwrap();
}
