//! Utility module for VobPlayer
//!
//! This module provides common utilities used throughout the application:
//! - Error handling with custom error types
//! - Layered configuration
//! - Small formatting helpers

pub mod config;
pub mod error;

// Re-export commonly used items
pub use config::{Config, PlaybackConfig, SectionConfig, SyncConfig};
pub use error::{Result, VobPlayerError};

use std::path::Path;

/// Load the application configuration
///
/// Layers, later ones winning:
/// 1. Default values
/// 2. System configuration file
/// 3. User configuration file
/// 4. `explicit`, if given
/// 5. `VOBPLAYER_*` environment variables
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    Config::load(explicit)
}

/// Format a duration as "HH:MM:SS", or "MM:SS" under an hour
pub fn format_duration(duration: std::time::Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}
