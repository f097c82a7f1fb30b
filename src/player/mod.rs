//! Player module for VobPlayer
//!
//! This module ties the pipeline together: the shared context and section
//! handoff the worker threads synchronize on, the engine that owns those
//! threads, and the game-state controller that decides which section plays.

pub mod context;
pub mod controller;
pub mod engine;
pub mod game_state;
pub mod instructions;

pub use context::{PlaybackStats, SharedContext, StatsSnapshot};
pub use controller::Controller;
pub use engine::{EngineSettings, PlaybackEngine};
pub use game_state::{Button, GameState, GameTable, StateId};
pub use instructions::{PlaybackInstructions, Section, END_OF_FILE};
