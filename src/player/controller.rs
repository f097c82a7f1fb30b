//! Game controller for VobPlayer
//!
//! Runs on the event-loop thread. It knows which game state is active, turns
//! clicks and finished sections into state transitions and hands the
//! resulting sections to the engine.

use crate::decoder::DecoderEvent;
use crate::player::context::StatsSnapshot;
use crate::player::engine::PlaybackEngine;
use crate::player::game_state::{GameTable, StateId};
use crate::utils::error::{Result, VobPlayerError};
use log::{debug, error, info};

/// Current game state plus the engine playing it
pub struct Controller {
    engine: PlaybackEngine,
    table: GameTable,
    current: StateId,
}

impl Controller {
    /// Take over an engine that is already playing `initial`'s section
    pub fn new(engine: PlaybackEngine, table: GameTable, initial: StateId) -> Self {
        info!("Game state {}", initial);
        Self {
            engine,
            table,
            current: initial,
        }
    }

    pub fn current_state(&self) -> StateId {
        self.current
    }

    pub fn table(&self) -> &GameTable {
        &self.table
    }

    pub fn engine(&self) -> &PlaybackEngine {
        &self.engine
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.engine.stats()
    }

    pub fn is_running(&self) -> bool {
        self.engine.is_running()
    }

    /// Switch to `next`, interrupting the section that is playing
    pub fn change_state(&mut self, next: StateId) -> Result<()> {
        let section = self.table.get(next).section;
        self.engine.retarget(section)?;
        info!("Game state {} -> {}", self.current, next);
        self.current = next;
        Ok(())
    }

    /// Dispatch a click at normalized window coordinates
    ///
    /// Returns whether a button was hit.
    pub fn handle_click(&mut self, x: f32, y: f32) -> Result<bool> {
        match self.table.get(self.current).button_at(x, y) {
            Some(target) => {
                self.change_state(target)?;
                Ok(true)
            }
            None => {
                debug!("Click at ({:.2}, {:.2}) hit no button in {}", x, y, self.current);
                Ok(false)
            }
        }
    }

    /// Process pending decoder events
    ///
    /// A fatal decoder failure comes back as an error.
    pub fn poll_events(&mut self) -> Result<()> {
        while let Ok(event) = self.engine.events().try_recv() {
            self.on_decoder_event(event)?;
        }
        Ok(())
    }

    fn on_decoder_event(&mut self, event: DecoderEvent) -> Result<()> {
        match event {
            DecoderEvent::SectionEnded { section } => {
                // Ignore an end that raced with a click into another state
                if section != self.table.get(self.current).section {
                    debug!("Section {}.. ended after leaving its state", section.start);
                    return Ok(());
                }
                self.change_state(self.current.next_on_end())
            }
            DecoderEvent::Failed { reason } => {
                error!("Playback failed in state {}: {}", self.current, reason);
                Err(VobPlayerError::Decoder(reason))
            }
            DecoderEvent::SectionStarted { section, epoch } => {
                debug!("Section {}.. started (epoch {})", section.start, epoch);
                Ok(())
            }
            DecoderEvent::Redirected { section } => {
                debug!("Section {}.. interrupted", section.start);
                Ok(())
            }
        }
    }

    /// Stop playback and join the worker threads
    pub fn shutdown(mut self) -> Result<()> {
        info!("Shutting down in state {}", self.current);
        self.engine.shutdown()
    }
}
