//! VobPlayer: a section-addressable video player
//!
//! Decodes byte ranges of a single DVD-style container, pushes audio to the
//! output device and paces video frames against the audio clock. A game
//! controller redirects playback between sections in response to clicks and
//! section ends.

pub mod audio;
pub mod decoder;
pub mod player;
pub mod renderer;
pub mod utils;
pub mod window;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use utils::error::{Result, VobPlayerError};
