//! Configuration management for VobPlayer
//!
//! This module handles loading and managing application configuration
//! from config files and environment variables. Files are merged key by key
//! on top of the defaults, so a user file only needs the values it changes.

use crate::player::game_state::StateId;
use crate::utils::error::{IntoPlayerError, Result, VobPlayerError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Media source configuration
    pub media: MediaConfig,

    /// Decode/render pipeline tuning
    pub playback: PlaybackConfig,

    /// AV-sync constants
    pub sync: SyncConfig,

    /// Audio output configuration
    pub audio: AudioConfig,

    /// Window configuration
    pub window: WindowConfig,

    /// General application settings
    pub general: GeneralConfig,

    /// Per-state byte range overrides for the built-in state table, keyed by state name
    pub states: BTreeMap<String, SectionConfig>,
}

/// Media source configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Container file to play
    pub path: Option<PathBuf>,
}

/// Decode/render pipeline tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Capacity of the decoded video frame queue
    pub video_queue_capacity: usize,

    /// How long the decoder waits for queue space before dropping a frame
    pub enqueue_timeout_ms: u64,

    /// How long the render thread waits for a frame before re-checking exit
    pub render_wait_timeout_ms: u64,

    /// Poll interval while waiting for the audio device to drain
    pub drain_poll_interval_ms: u64,

    /// Upper bound on the section-end drain before buffers are discarded
    pub drain_timeout_ms: u64,

    /// Upper bound on the controller's wait for the instructions lock
    pub instruction_watchdog_ms: u64,

    /// Consecutive corrupt packets tolerated before the section is aborted
    pub max_consecutive_decode_errors: u32,

    /// How long engine start waits for the decoder thread to open the file
    pub decoder_ready_timeout_ms: u64,
}

/// AV-sync constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Output device latency added to the audio clock
    pub hardware_latency_ms: f64,

    /// How far video may trail audio before a frame is dropped
    pub lag_tolerance_ms: f64,
}

/// Audio output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Ring buffer length between the decoder and the device callback
    pub buffer_ms: u32,
}

/// Window configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Initial window width
    pub width: u32,

    /// Initial window height
    pub height: u32,

    /// Start in fullscreen mode
    pub fullscreen: bool,

    /// Window title
    pub title: String,
}

/// General application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Byte range override for one game state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionConfig {
    /// First byte of the section
    pub start: u64,

    /// Last byte of the section; omitted means play to end of file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<u64>,

    /// Discard video packets while this section plays
    #[serde(default)]
    pub audio_only: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            video_queue_capacity: 32,
            enqueue_timeout_ms: 450,
            render_wait_timeout_ms: 125,
            drain_poll_interval_ms: 5,
            drain_timeout_ms: 5000,
            instruction_watchdog_ms: 2000,
            max_consecutive_decode_errors: 8,
            decoder_ready_timeout_ms: 10_000,
        }
    }
}

impl PlaybackConfig {
    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    pub fn render_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.render_wait_timeout_ms)
    }

    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.drain_poll_interval_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn instruction_watchdog(&self) -> Duration {
        Duration::from_millis(self.instruction_watchdog_ms)
    }

    pub fn decoder_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.decoder_ready_timeout_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            hardware_latency_ms: 200.0,
            lag_tolerance_ms: 20.0,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self { buffer_ms: 500 }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 720,
            height: 480,
            fullscreen: false,
            title: "VobPlayer".to_string(),
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from various sources
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. System config file (/etc/vobplayer/config.toml on Linux)
    /// 3. User config file (~/.config/vobplayer/config.toml on Linux)
    /// 4. The explicitly requested file, if any
    /// 5. Environment variables (VOBPLAYER_* prefix)
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut merged = toml::Value::try_from(Self::default())
            .config_err("Failed to serialize default config")?;

        for path in [Self::system_config_path(), Self::user_config_path()]
            .into_iter()
            .flatten()
        {
            if path.exists() {
                log::debug!("Merging config file {}", path.display());
                merge_values(&mut merged, Self::read_value(&path)?);
            }
        }

        if let Some(path) = explicit {
            // An explicitly named file must exist
            merge_values(&mut merged, Self::read_value(path)?);
        }

        let mut config: Config = merged
            .try_into()
            .config_err("Failed to apply config file")?;

        config.apply_overrides_from(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Load a single file on top of the defaults
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let mut merged = toml::Value::try_from(Self::default())
            .config_err("Failed to serialize default config")?;
        merge_values(&mut merged, Self::read_value(path)?);

        let config: Config = merged
            .try_into()
            .config_err("Failed to apply config file")?;
        config.validate()?;
        Ok(config)
    }

    fn read_value(path: &Path) -> Result<toml::Value> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| VobPlayerError::Config(format!("Failed to read config file {}: {}", path.display(), e)))?;

        toml::from_str(&contents)
            .map_err(|e| VobPlayerError::Config(format!("Failed to parse config file {}: {}", path.display(), e)))
    }

    /// Apply `VOBPLAYER_*` overrides using the given variable lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, value: String) -> Result<T> {
            value
                .trim()
                .parse()
                .map_err(|_| VobPlayerError::Config(format!("Invalid {}: '{}'", key, value)))
        }

        if let Some(path) = lookup("VOBPLAYER_MEDIA_PATH") {
            self.media.path = Some(PathBuf::from(path));
        }

        if let Some(width) = lookup("VOBPLAYER_WINDOW_WIDTH") {
            self.window.width = parse("VOBPLAYER_WINDOW_WIDTH", width)?;
        }

        if let Some(height) = lookup("VOBPLAYER_WINDOW_HEIGHT") {
            self.window.height = parse("VOBPLAYER_WINDOW_HEIGHT", height)?;
        }

        if let Some(capacity) = lookup("VOBPLAYER_QUEUE_CAPACITY") {
            self.playback.video_queue_capacity = parse("VOBPLAYER_QUEUE_CAPACITY", capacity)?;
        }

        if let Some(latency) = lookup("VOBPLAYER_HARDWARE_LATENCY_MS") {
            self.sync.hardware_latency_ms = parse("VOBPLAYER_HARDWARE_LATENCY_MS", latency)?;
        }

        if let Some(tolerance) = lookup("VOBPLAYER_LAG_TOLERANCE_MS") {
            self.sync.lag_tolerance_ms = parse("VOBPLAYER_LAG_TOLERANCE_MS", tolerance)?;
        }

        if let Some(log_level) = lookup("VOBPLAYER_LOG_LEVEL") {
            self.general.log_level = log_level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(VobPlayerError::Config("Window dimensions must be non-zero".to_string()));
        }

        let playback = &self.playback;
        if playback.video_queue_capacity == 0 {
            return Err(VobPlayerError::Config("video_queue_capacity must be non-zero".to_string()));
        }

        let timeouts = [
            ("enqueue_timeout_ms", playback.enqueue_timeout_ms),
            ("render_wait_timeout_ms", playback.render_wait_timeout_ms),
            ("drain_poll_interval_ms", playback.drain_poll_interval_ms),
            ("drain_timeout_ms", playback.drain_timeout_ms),
            ("instruction_watchdog_ms", playback.instruction_watchdog_ms),
            ("decoder_ready_timeout_ms", playback.decoder_ready_timeout_ms),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, value)| *value == 0) {
            return Err(VobPlayerError::Config(format!("{} must be non-zero", name)));
        }

        if playback.max_consecutive_decode_errors == 0 {
            return Err(VobPlayerError::Config(
                "max_consecutive_decode_errors must be at least 1".to_string(),
            ));
        }

        if !(self.sync.hardware_latency_ms.is_finite() && self.sync.hardware_latency_ms >= 0.0) {
            return Err(VobPlayerError::Config("hardware_latency_ms must be a non-negative number".to_string()));
        }

        if !(self.sync.lag_tolerance_ms.is_finite() && self.sync.lag_tolerance_ms >= 0.0) {
            return Err(VobPlayerError::Config("lag_tolerance_ms must be a non-negative number".to_string()));
        }

        if self.audio.buffer_ms == 0 {
            return Err(VobPlayerError::Config("audio buffer_ms must be non-zero".to_string()));
        }

        self.state_overrides()?;

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.general.log_level.as_str()) {
            return Err(VobPlayerError::Config(format!(
                "Invalid log level '{}', must be one of: {:?}",
                self.general.log_level,
                valid_log_levels
            )));
        }

        Ok(())
    }

    /// Resolve the `[states.*]` tables into typed overrides
    pub fn state_overrides(&self) -> Result<Vec<(StateId, SectionConfig)>> {
        self.states
            .iter()
            .map(|(name, section)| {
                let state: StateId = name.parse()?;
                if let Some(end) = section.end {
                    if section.start > end {
                        return Err(VobPlayerError::Config(format!(
                            "State {} starts at byte {} after its end {}",
                            name, section.start, end
                        )));
                    }
                }
                Ok((state, *section))
            })
            .collect()
    }

    /// Get system config file path
    fn system_config_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        return Some(PathBuf::from("/etc/vobplayer/config.toml"));

        #[cfg(target_os = "windows")]
        return std::env::var("PROGRAMDATA").ok()
            .map(|p| PathBuf::from(p).join("VobPlayer").join("config.toml"));

        #[cfg(target_os = "macos")]
        return Some(PathBuf::from("/Library/Application Support/VobPlayer/config.toml"));

        #[allow(unreachable_code)]
        None
    }

    /// Get user config file path
    pub fn user_config_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        return dirs::config_dir()
            .map(|p| p.join("vobplayer").join("config.toml"));

        #[cfg(not(target_os = "linux"))]
        return dirs::config_dir()
            .map(|p| p.join("VobPlayer").join("config.toml"));
    }
}

/// Deep-merge `overlay` into `base`; tables merge per key, everything else replaces
fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.window.width, 720);
        assert_eq!(config.window.height, 480);
        assert_eq!(config.playback.video_queue_capacity, 32);
        assert_eq!(config.playback.enqueue_timeout(), Duration::from_millis(450));
        assert_eq!(config.sync.hardware_latency_ms, 200.0);
        assert_eq!(config.sync.lag_tolerance_ms, 20.0);
        assert!(config.states.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.window.width = 0;
        assert!(config.validate().is_err());

        config.window.width = 720;
        config.playback.video_queue_capacity = 0;
        assert!(config.validate().is_err());

        config.playback.video_queue_capacity = 4;
        config.playback.drain_poll_interval_ms = 0;
        assert!(config.validate().is_err());

        config.playback.drain_poll_interval_ms = 5;
        config.sync.lag_tolerance_ms = -1.0;
        assert!(config.validate().is_err());

        config.sync.lag_tolerance_ms = 20.0;
        config.general.log_level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.general.log_level = "debug".to_string();
        config.states.insert(
            "tutorial".to_string(),
            SectionConfig { start: 10, end: Some(5), audio_only: false },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[sync]
lag_tolerance_ms = 50.0

[states.main_menu_2]
start = 4096
end = 8192
audio_only = true
"#
        )
        .unwrap();

        let config = Config::load_from_file(file.path()).unwrap();
        assert_eq!(config.sync.lag_tolerance_ms, 50.0);
        assert_eq!(config.sync.hardware_latency_ms, 200.0);
        assert_eq!(config.playback.video_queue_capacity, 32);
        assert_eq!(
            config.state_overrides().unwrap(),
            vec![(StateId::MainMenu2, SectionConfig { start: 4096, end: Some(8192), audio_only: true })]
        );
    }

    #[test]
    fn test_unknown_state_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[states.credits]\nstart = 0").unwrap();

        assert!(matches!(
            Config::load_from_file(file.path()),
            Err(VobPlayerError::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("VOBPLAYER_MEDIA_PATH", "/media/VTS_01_1.VOB"),
            ("VOBPLAYER_QUEUE_CAPACITY", "16"),
            ("VOBPLAYER_LAG_TOLERANCE_MS", "35.5"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides_from(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.media.path, Some(PathBuf::from("/media/VTS_01_1.VOB")));
        assert_eq!(config.playback.video_queue_capacity, 16);
        assert_eq!(config.sync.lag_tolerance_ms, 35.5);

        let result = config.apply_overrides_from(|key| {
            (key == "VOBPLAYER_WINDOW_WIDTH").then(|| "wide".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_merge_values_is_per_key() {
        let mut base: toml::Value = toml::from_str("[a]\nx = 1\ny = 2").unwrap();
        let overlay: toml::Value = toml::from_str("[a]\ny = 3").unwrap();
        merge_values(&mut base, overlay);

        assert_eq!(base["a"]["x"].as_integer(), Some(1));
        assert_eq!(base["a"]["y"].as_integer(), Some(3));
    }
}
