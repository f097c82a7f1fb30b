//! Error types for VobPlayer
//!
//! This module defines the error taxonomy shared by the decoder, render and
//! controller threads. We use thiserror for the library error type and anyhow
//! only at the binary's top level.

use thiserror::Error;

/// Main error type for VobPlayer
#[derive(Error, Debug)]
pub enum VobPlayerError {
    /// Window-related errors
    #[error("Window error: {0}")]
    Window(String),

    /// Renderer errors
    #[error("Renderer error: {0}")]
    Renderer(String),

    /// Decoder errors (seek, decode, resample, stream setup)
    #[error("Decoder error: {0}")]
    Decoder(String),

    /// A single packet could not be decoded; the stream itself is still usable
    #[error("Corrupt packet: {0}")]
    CorruptPacket(String),

    /// Audio errors
    #[error("Audio error: {0}")]
    Audio(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File error: {0}")]
    FileIO(#[from] std::io::Error),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Synchronization error (lock watchdog, thread handoff)
    #[error("Synchronization error: {0}")]
    Sync(String),

    /// Generic error for unexpected situations
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ffmpeg_next::Error> for VobPlayerError {
    fn from(err: ffmpeg_next::Error) -> Self {
        match err {
            ffmpeg_next::Error::InvalidData => {
                VobPlayerError::CorruptPacket(format!("FFmpeg error: {}", err))
            }
            other => VobPlayerError::Decoder(format!("FFmpeg error: {}", other)),
        }
    }
}

impl VobPlayerError {
    /// Create a decoder error from string
    pub fn decoder_error<S: Into<String>>(msg: S) -> Self {
        VobPlayerError::Decoder(msg.into())
    }

    /// Whether the failure is confined to one packet and decoding may continue
    pub fn is_transient(&self) -> bool {
        matches!(self, VobPlayerError::CorruptPacket(_))
    }
}

/// Convenience type alias for Results in VobPlayer
pub type Result<T> = std::result::Result<T, VobPlayerError>;

/// Extension trait for converting other errors to VobPlayerError
pub trait IntoPlayerError<T> {
    /// Convert this error into a VobPlayerError with the given context
    fn window_err(self, context: &str) -> Result<T>;
    fn renderer_err(self, context: &str) -> Result<T>;
    fn decoder_err(self, context: &str) -> Result<T>;
    fn audio_err(self, context: &str) -> Result<T>;
    fn config_err(self, context: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> IntoPlayerError<T> for std::result::Result<T, E> {
    fn window_err(self, context: &str) -> Result<T> {
        self.map_err(|e| VobPlayerError::Window(format!("{}: {}", context, e)))
    }

    fn renderer_err(self, context: &str) -> Result<T> {
        self.map_err(|e| VobPlayerError::Renderer(format!("{}: {}", context, e)))
    }

    fn decoder_err(self, context: &str) -> Result<T> {
        self.map_err(|e| VobPlayerError::Decoder(format!("{}: {}", context, e)))
    }

    fn audio_err(self, context: &str) -> Result<T> {
        self.map_err(|e| VobPlayerError::Audio(format!("{}: {}", context, e)))
    }

    fn config_err(self, context: &str) -> Result<T> {
        self.map_err(|e| VobPlayerError::Config(format!("{}: {}", context, e)))
    }
}

/// Helper macro for creating internal errors with file and line information
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::utils::error::VobPlayerError::Internal(
            format!("{} at {}:{}", $msg, file!(), line!())
        )
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::utils::error::VobPlayerError::Internal(
            format!("{} at {}:{}", format!($fmt, $($arg)*), file!(), line!())
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VobPlayerError::Window("Failed to create window".to_string());
        assert_eq!(err.to_string(), "Window error: Failed to create window");

        let err = VobPlayerError::Sync("instructions lock timed out".to_string());
        assert_eq!(err.to_string(), "Synchronization error: instructions lock timed out");
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let player_err: VobPlayerError = io_err.into();
        assert!(matches!(player_err, VobPlayerError::FileIO(_)));
    }

    #[test]
    fn test_ffmpeg_invalid_data_is_transient() {
        let err: VobPlayerError = ffmpeg_next::Error::InvalidData.into();
        assert!(err.is_transient());

        let err: VobPlayerError = ffmpeg_next::Error::Eof.into();
        assert!(!err.is_transient());
        assert!(matches!(err, VobPlayerError::Decoder(_)));
    }

    #[test]
    fn test_into_player_error_trait() {
        let result: std::result::Result<(), &str> = Err("Something went wrong");
        let converted = result.audio_err("Opening stream");

        match converted {
            Err(VobPlayerError::Audio(msg)) => {
                assert_eq!(msg, "Opening stream: Something went wrong");
            }
            _ => panic!("Expected Audio error"),
        }
    }

    #[test]
    fn test_internal_error_macro() {
        let err = internal_error!("slot {} missing", 3);
        assert!(err.to_string().contains("slot 3 missing"));
        assert!(err.to_string().contains("error.rs"));
    }
}
