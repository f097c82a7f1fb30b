//! Game states and the transitions between them
//!
//! Each state names a section of the disc image plus the on-screen buttons
//! that are live while it plays. The state graph is closed: every
//! transition is a `match` over [`StateId`].

use crate::player::instructions::{Section, END_OF_FILE};
use crate::utils::config::SectionConfig;
use crate::utils::error::{Result, VobPlayerError};
use std::fmt;
use std::str::FromStr;

/// DVD sector size; the built-in offsets are sector indices
pub const SECTOR_BYTES: u64 = 2048;

/// Identifier of a game state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StateId {
    MainMenu1,
    MainMenu2,
    MainMenu3,
    Tutorial,
}

impl StateId {
    pub const ALL: [StateId; 4] = [
        StateId::MainMenu1,
        StateId::MainMenu2,
        StateId::MainMenu3,
        StateId::Tutorial,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StateId::MainMenu1 => "main_menu_1",
            StateId::MainMenu2 => "main_menu_2",
            StateId::MainMenu3 => "main_menu_3",
            StateId::Tutorial => "tutorial",
        }
    }

    /// State to enter when this state's section plays to its end
    pub fn next_on_end(self) -> StateId {
        match self {
            StateId::MainMenu1 => StateId::MainMenu2,
            StateId::MainMenu2 => StateId::MainMenu3,
            // The last menu loop repeats until the player clicks
            StateId::MainMenu3 => StateId::MainMenu3,
            StateId::Tutorial => StateId::MainMenu1,
        }
    }

    fn index(self) -> usize {
        match self {
            StateId::MainMenu1 => 0,
            StateId::MainMenu2 => 1,
            StateId::MainMenu3 => 2,
            StateId::Tutorial => 3,
        }
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StateId {
    type Err = VobPlayerError;

    fn from_str(s: &str) -> Result<Self> {
        StateId::ALL
            .into_iter()
            .find(|id| id.name() == s)
            .ok_or_else(|| VobPlayerError::Config(format!("Unknown game state '{}'", s)))
    }
}

/// Clickable region in normalized window coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Button {
    /// Left, top corner (0.0 to 1.0)
    pub min: (f32, f32),

    /// Right, bottom corner (0.0 to 1.0)
    pub max: (f32, f32),

    /// State entered when the button is clicked
    pub target: StateId,
}

impl Button {
    pub fn contains(&self, x: f32, y: f32) -> bool {
        (self.min.0..=self.max.0).contains(&x) && (self.min.1..=self.max.1).contains(&y)
    }
}

/// The menus accept a click anywhere to start the tutorial
const MENU_BUTTONS: &[Button] = &[Button {
    min: (0.0, 0.0),
    max: (1.0, 1.0),
    target: StateId::Tutorial,
}];

/// A state's section and its live buttons
#[derive(Debug, Clone, PartialEq)]
pub struct GameState {
    pub id: StateId,
    pub section: Section,
    pub buttons: &'static [Button],
}

impl GameState {
    /// Target of the first button under a normalized click position
    pub fn button_at(&self, x: f32, y: f32) -> Option<StateId> {
        self.buttons.iter().find(|b| b.contains(x, y)).map(|b| b.target)
    }
}

/// Lookup table from [`StateId`] to [`GameState`]
#[derive(Debug, Clone, PartialEq)]
pub struct GameTable {
    states: [GameState; 4],
}

impl GameTable {
    /// The disc layout the player ships with
    pub fn builtin() -> Self {
        let sectors = |start: u64, end: u64, audio_only: bool| Section {
            start: start * SECTOR_BYTES,
            end: end * SECTOR_BYTES,
            audio_only,
        };

        Self {
            states: [
                GameState {
                    id: StateId::MainMenu1,
                    section: sectors(0, 6463, false),
                    buttons: MENU_BUTTONS,
                },
                GameState {
                    id: StateId::MainMenu2,
                    section: sectors(6463, 6762, true),
                    buttons: MENU_BUTTONS,
                },
                GameState {
                    id: StateId::MainMenu3,
                    section: sectors(6762, 7064, true),
                    buttons: MENU_BUTTONS,
                },
                GameState {
                    id: StateId::Tutorial,
                    section: Section::to_end_of_file(7064 * SECTOR_BYTES, false),
                    buttons: &[],
                },
            ],
        }
    }

    /// Built-in table with configured byte ranges applied
    pub fn with_overrides(overrides: &[(StateId, SectionConfig)]) -> Result<Self> {
        let mut table = Self::builtin();
        for (id, config) in overrides {
            let section = Section::new(config.start, config.end.unwrap_or(END_OF_FILE), config.audio_only)?;
            table.states[id.index()].section = section;
        }
        Ok(table)
    }

    pub fn get(&self, id: StateId) -> &GameState {
        &self.states[id.index()]
    }
}

impl Default for GameTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names_round_trip() {
        for id in StateId::ALL {
            assert_eq!(id.name().parse::<StateId>().unwrap(), id);
        }
        assert!(matches!("credits".parse::<StateId>(), Err(VobPlayerError::Config(_))));
    }

    #[test]
    fn test_section_end_dispatch() {
        assert_eq!(StateId::MainMenu1.next_on_end(), StateId::MainMenu2);
        assert_eq!(StateId::MainMenu2.next_on_end(), StateId::MainMenu3);
        assert_eq!(StateId::MainMenu3.next_on_end(), StateId::MainMenu3);
        assert_eq!(StateId::Tutorial.next_on_end(), StateId::MainMenu1);
    }

    #[test]
    fn test_builtin_table_is_consistent() {
        let table = GameTable::builtin();
        for id in StateId::ALL {
            let state = table.get(id);
            assert_eq!(state.id, id);
            assert!(state.section.start <= state.section.end);
        }

        let menu2 = table.get(StateId::MainMenu2);
        assert_eq!(menu2.section.start, 6463 * 2048);
        assert!(menu2.section.audio_only);

        // The last menu loop stops where the tutorial begins
        let menu3 = table.get(StateId::MainMenu3).section;
        let tutorial = table.get(StateId::Tutorial).section;
        assert!(!menu3.runs_to_end_of_file());
        assert_eq!(menu3.end, tutorial.start);
        assert_eq!((menu3.start, menu3.end), (6762 * 2048, 7064 * 2048));
        assert!(tutorial.runs_to_end_of_file());

        // Menus tile the disc up to the tutorial without gaps
        let menu1 = table.get(StateId::MainMenu1).section;
        assert_eq!(menu1.end, menu2.section.start);
        assert_eq!(menu2.section.end, menu3.start);
    }

    #[test]
    fn test_click_dispatch() {
        let table = GameTable::builtin();
        assert_eq!(table.get(StateId::MainMenu1).button_at(0.5, 0.5), Some(StateId::Tutorial));
        assert_eq!(table.get(StateId::Tutorial).button_at(0.5, 0.5), None);
    }

    #[test]
    fn test_overrides_replace_sections() {
        let overrides = [(
            StateId::Tutorial,
            SectionConfig { start: 1024, end: Some(4096), audio_only: true },
        )];
        let table = GameTable::with_overrides(&overrides).unwrap();
        assert_eq!(
            table.get(StateId::Tutorial).section,
            Section { start: 1024, end: 4096, audio_only: true }
        );

        let bad = [(StateId::Tutorial, SectionConfig { start: 10, end: Some(1), audio_only: false })];
        assert!(GameTable::with_overrides(&bad).is_err());
    }
}
