//! Integration test utilities for VobPlayer
//!
//! This module provides common utilities for integration testing including:
//! - Test media file generation
//! - A scripted disc layout with a matching game-state table
//! - Polling helpers for the threaded pipeline

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use vobplayer::audio::SyncPolicy;
use vobplayer::decoder::decode_loop::DecoderSettings;
use vobplayer::player::{EngineSettings, GameTable, StateId};
use vobplayer::testing::ScriptedPacket;
use vobplayer::utils::SectionConfig;

/// Test fixture for integration tests
pub struct TestFixture {
    pub temp_dir: TempDir,
    pub media_files: MediaFiles,
}

/// Collection of test media files
pub struct MediaFiles {
    /// One second of a 440 Hz tone, 48 kHz stereo
    pub tone_48k_stereo: PathBuf,

    /// Half a second of a 440 Hz tone, 44.1 kHz mono
    pub tone_44k_mono: PathBuf,

    /// A file FFmpeg cannot open
    pub garbage: PathBuf,
}

impl TestFixture {
    /// Create a new test fixture with generated media files
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let media_files = MediaFiles::generate(temp_dir.path())?;

        Ok(Self {
            temp_dir,
            media_files,
        })
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }
}

impl MediaFiles {
    fn generate(dir: &Path) -> Result<Self> {
        let tone_48k_stereo = dir.join("tone_48k_stereo.wav");
        write_tone(&tone_48k_stereo, 48_000, 2, Duration::from_secs(1))?;

        let tone_44k_mono = dir.join("tone_44k_mono.wav");
        write_tone(&tone_44k_mono, 44_100, 1, Duration::from_millis(500))?;

        let garbage = dir.join("garbage.vob");
        std::fs::write(&garbage, b"definitely not a program stream")?;

        Ok(Self {
            tone_48k_stereo,
            tone_44k_mono,
            garbage,
        })
    }
}

/// Write a 16-bit PCM sine tone
pub fn write_tone(path: &Path, sample_rate: u32, channels: u16, length: Duration) -> Result<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;

    let frames = (sample_rate as f64 * length.as_secs_f64()) as u32;
    for n in 0..frames {
        let t = n as f64 / sample_rate as f64;
        let sample = ((t * 440.0 * std::f64::consts::TAU).sin() * 8000.0) as i16;
        for _ in 0..channels {
            writer.write_sample(sample)?;
        }
    }
    writer.finalize()?;
    Ok(())
}

/// Bytes per scripted packet
pub const PACKET_BYTES: usize = 100;

/// Sample frames per scripted audio packet (10 ms at 48 kHz)
pub const AUDIO_FRAMES: usize = 480;

/// Byte layout of the scripted disc
pub mod layout {
    pub const MENU_1: u64 = 0;
    pub const MENU_2: u64 = 2_000;
    pub const MENU_3: u64 = 3_000;
    pub const TUTORIAL: u64 = 4_000;
}

/// `count` pairs of audio then video packets, video stamped `first_pts`, +10, ...
///
/// Timestamps are in milliseconds and restart for every section so video
/// lines up with the per-section audio clock.
pub fn av_packets(count: usize, first_pts: i64) -> Vec<ScriptedPacket> {
    (0..count)
        .flat_map(|i| {
            [
                ScriptedPacket::audio(PACKET_BYTES, AUDIO_FRAMES),
                ScriptedPacket::video(PACKET_BYTES, first_pts + i as i64 * 10),
            ]
        })
        .collect()
}

/// A small disc: ten frames of menu video, two audio-only menu loops and a
/// tutorial whose frame timestamps end in 1
pub fn scripted_disc() -> Vec<ScriptedPacket> {
    let mut packets = av_packets(10, 0);
    packets.extend(av_packets(5, 0));
    packets.extend(av_packets(5, 0));
    packets.extend(av_packets(10, 1));
    packets
}

/// Game states mapped onto [`scripted_disc`]
pub fn scripted_table() -> GameTable {
    let range = |start: u64, end: Option<u64>, audio_only: bool| SectionConfig { start, end, audio_only };
    let overrides = [
        (StateId::MainMenu1, range(layout::MENU_1, Some(layout::MENU_2), false)),
        (StateId::MainMenu2, range(layout::MENU_2, Some(layout::MENU_3), true)),
        (StateId::MainMenu3, range(layout::MENU_3, Some(layout::TUTORIAL), true)),
        (StateId::Tutorial, range(layout::TUTORIAL, None, false)),
    ];
    GameTable::with_overrides(&overrides).expect("scripted table is valid")
}

/// Engine settings for tests: no output latency and a wide lag tolerance so
/// scheduling jitter never drops frames
pub fn test_settings() -> EngineSettings {
    EngineSettings {
        queue_capacity: 8,
        decoder: DecoderSettings {
            enqueue_timeout: Duration::from_secs(2),
            drain_poll_interval: Duration::from_millis(1),
            drain_timeout: Duration::from_secs(2),
            max_consecutive_errors: 3,
        },
        render_wait_timeout: Duration::from_millis(10),
        instruction_watchdog: Duration::from_secs(2),
        ready_timeout: Duration::from_secs(2),
        sync: SyncPolicy {
            hardware_latency_ms: 0.0,
            lag_tolerance_ms: 10_000.0,
        },
    }
}

/// Poll `condition` until it holds; false on timeout
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
