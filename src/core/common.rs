//! Common types for the board model: cell markers and fire outcomes.

use core::fmt;

use crate::core::config::BOARD_SIZE;

/// Marker stored in each board cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub enum Cell {
    /// Nothing known or nothing placed.
    #[default]
    Empty,
    /// Own ship segment that has not been hit.
    Ship,
    /// Ship segment that has been hit.
    Hit,
    /// Shot that landed on water, or water implied by a sunk ship's border.
    Miss,
    /// Segment of a ship known to be fully destroyed.
    Sunk,
}

impl Cell {
    /// `true` for segments of a ship that has taken damage.
    pub fn is_struck(self) -> bool {
        matches!(self, Cell::Hit | Cell::Sunk)
    }

    /// `true` once a shot at this cell can tell nothing new.
    pub fn is_resolved(self) -> bool {
        matches!(self, Cell::Hit | Cell::Miss | Cell::Sunk)
    }

    /// Marker as shown to the opponent; sunk collapses to hit.
    pub fn opponent_facing(self) -> Cell {
        match self {
            Cell::Sunk => Cell::Hit,
            other => other,
        }
    }
}

/// Fixed 10×10 matrix of markers, indexed `[y][x]`.
pub type Grid = [[Cell; BOARD_SIZE as usize]; BOARD_SIZE as usize];

/// Result the authority reports for a single shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub enum FireOutcome {
    /// Shot struck a ship that is still afloat.
    Hit,
    /// Shot landed on water.
    Miss,
    /// Shot destroyed the last segment of a ship.
    Sunk,
}

impl FireOutcome {
    /// Marker recorded on the opponent board for this outcome.
    pub fn marker(self) -> Cell {
        match self {
            FireOutcome::Hit => Cell::Hit,
            FireOutcome::Miss => Cell::Miss,
            FireOutcome::Sunk => Cell::Sunk,
        }
    }

    /// `true` for hit and sunk.
    pub fn is_hit(self) -> bool {
        !matches!(self, FireOutcome::Miss)
    }
}

impl fmt::Display for FireOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FireOutcome::Hit => write!(f, "hit"),
            FireOutcome::Miss => write!(f, "miss"),
            FireOutcome::Sunk => write!(f, "sunk"),
        }
    }
}
