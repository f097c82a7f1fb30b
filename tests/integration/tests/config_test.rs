//! Configuration layering through the process environment

use serial_test::serial;
use std::io::Write;
use vobplayer::player::{GameTable, StateId};
use vobplayer::utils::{load_config, Config};
use vobplayer::VobPlayerError;

const VARS: [&str; 4] = [
    "VOBPLAYER_MEDIA_PATH",
    "VOBPLAYER_QUEUE_CAPACITY",
    "VOBPLAYER_LAG_TOLERANCE_MS",
    "VOBPLAYER_LOG_LEVEL",
];

/// Removes the variables again even when an assertion fails
struct EnvGuard;

impl EnvGuard {
    fn set(pairs: &[(&str, &str)]) -> Self {
        for (key, value) in pairs {
            std::env::set_var(key, value);
        }
        EnvGuard
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for key in VARS {
            std::env::remove_var(key);
        }
    }
}

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_environment_overrides_explicit_file() {
    let file = write_config(
        r#"
[playback]
video_queue_capacity = 4

[sync]
lag_tolerance_ms = 15.0
"#,
    );

    let _env = EnvGuard::set(&[
        ("VOBPLAYER_QUEUE_CAPACITY", "12"),
        ("VOBPLAYER_MEDIA_PATH", "/media/disc/VTS_01_1.VOB"),
    ]);
    let config = load_config(Some(file.path())).unwrap();

    assert_eq!(config.playback.video_queue_capacity, 12);
    // Untouched by the environment, so the file wins over the default
    assert_eq!(config.sync.lag_tolerance_ms, 15.0);
    assert_eq!(
        config.media.path.as_deref(),
        Some(std::path::Path::new("/media/disc/VTS_01_1.VOB"))
    );
}

#[test]
#[serial]
fn test_malformed_environment_value_is_rejected() {
    let _env = EnvGuard::set(&[("VOBPLAYER_LAG_TOLERANCE_MS", "soon")]);
    assert!(matches!(Config::load(None), Err(VobPlayerError::Config(_))));
}

#[test]
#[serial]
fn test_environment_log_level_is_validated() {
    let _env = EnvGuard::set(&[("VOBPLAYER_LOG_LEVEL", "verbose")]);
    assert!(matches!(Config::load(None), Err(VobPlayerError::Config(_))));
}

#[test]
#[serial]
fn test_state_sections_from_file_reach_the_table() {
    let file = write_config(
        r#"
[states.tutorial]
start = 14460928
audio_only = false

[states.main_menu_2]
start = 13236224
end = 13848576
audio_only = true
"#,
    );

    let _env = EnvGuard::set(&[]);
    let config = load_config(Some(file.path())).unwrap();
    let table = GameTable::with_overrides(&config.state_overrides().unwrap()).unwrap();

    let tutorial = table.get(StateId::Tutorial).section;
    assert_eq!(tutorial.start, 14_460_928);
    assert!(tutorial.runs_to_end_of_file());

    let menu = table.get(StateId::MainMenu2).section;
    assert_eq!((menu.start, menu.end), (13_236_224, 13_848_576));
    assert!(menu.audio_only);

    // States the file does not mention keep the built-in layout
    assert_eq!(table.get(StateId::MainMenu1), GameTable::builtin().get(StateId::MainMenu1));
}

#[test]
#[serial]
fn test_missing_explicit_file_is_an_error() {
    let _env = EnvGuard::set(&[]);
    let dir = tempfile::tempdir().unwrap();
    assert!(load_config(Some(&dir.path().join("absent.toml"))).is_err());
}
