//! Fleet composition: per-length ship counts, random fleets and fleet checks.

use alloc::vec::Vec;
use rand::Rng;

use crate::core::board::Board;
use crate::core::common::Cell;
use crate::core::config::{BOARD_SIZE, FLEET, MAX_SHIP_LEN, TOTAL_SHIP_CELLS};
use crate::core::border::ship_extent;
use crate::core::coord::Coord;
use crate::core::placement::{is_valid_placement, PlacementError, PlacementSession};

/// Attempts per ship before a random fleet is restarted from scratch.
const SHIP_ATTEMPTS: usize = 100;

/// Full restarts before random placement gives up.
const FLEET_ATTEMPTS: usize = 50;

/// Count of ships per length, indexed by length (`1..=MAX_SHIP_LEN`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub struct FleetTally {
    counts: [u8; MAX_SHIP_LEN + 1],
}

impl FleetTally {
    /// Tally seeded with the fixed fleet composition.
    pub fn standard() -> Self {
        let mut counts = [0u8; MAX_SHIP_LEN + 1];
        for (len, count) in FLEET {
            counts[len] = count;
        }
        Self { counts }
    }

    /// Ships of `len` still counted. Lengths outside the fleet read as zero.
    pub fn remaining(&self, len: usize) -> u8 {
        self.counts.get(len).copied().unwrap_or(0)
    }

    /// Remove one ship of `len`. Returns `false`, changing nothing, when the
    /// bucket is already empty or the length is not part of the fleet.
    pub fn decrement(&mut self, len: usize) -> bool {
        match self.counts.get_mut(len) {
            Some(count) if *count > 0 && len > 0 => {
                *count -= 1;
                true
            }
            _ => false,
        }
    }

    /// Total number of ships counted.
    pub fn total(&self) -> usize {
        self.counts.iter().map(|&c| c as usize).sum()
    }

    /// Longest length with a non-zero count.
    pub fn longest(&self) -> Option<usize> {
        (1..=MAX_SHIP_LEN).rev().find(|&len| self.counts[len] > 0)
    }

    /// `(length, count)` pairs, longest first.
    pub fn iter(&self) -> impl Iterator<Item = (usize, u8)> + '_ {
        (1..=MAX_SHIP_LEN).rev().map(move |len| (len, self.counts[len]))
    }
}

/// Try to fit one straight ship of `len` onto `board` at random.
///
/// Returns `None` when no valid spot turned up within the attempt limit.
pub fn random_ship<R: Rng>(rng: &mut R, board: &Board, len: usize) -> Option<Vec<Coord>> {
    let span = BOARD_SIZE - len as u8 + 1;
    for _ in 0..SHIP_ATTEMPTS {
        let horizontal: bool = rng.random();
        let (x, y) = if horizontal {
            (rng.random_range(0..span), rng.random_range(0..BOARD_SIZE))
        } else {
            (rng.random_range(0..BOARD_SIZE), rng.random_range(0..span))
        };
        let cells: Vec<Coord> = (0..len as u8)
            .filter_map(|i| {
                if horizontal {
                    Coord::new(x + i, y)
                } else {
                    Coord::new(x, y + i)
                }
            })
            .collect();
        if cells.len() == len && is_valid_placement(board, &cells) {
            return Some(cells);
        }
    }
    None
}

/// Generate a complete random fleet that satisfies the placement rules.
pub fn random_fleet<R: Rng>(rng: &mut R) -> Result<Vec<Coord>, PlacementError> {
    for _ in 0..FLEET_ATTEMPTS {
        let mut session = PlacementSession::new();
        while let Some(len) = session.next_length() {
            match random_ship(rng, session.board(), len) {
                Some(cells) => {
                    session.propose(&cells)?;
                }
                None => break,
            }
        }
        if session.is_complete() {
            return Ok(session.ships());
        }
    }
    Err(PlacementError::UnableToPlaceFleet)
}

/// Check that `ships` is exactly one standard fleet obeying the placement
/// rules. Cell order does not matter.
pub fn validate_fleet(ships: &[Coord]) -> Result<(), PlacementError> {
    let mut sorted = ships.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    if sorted.len() != TOTAL_SHIP_CELLS || ships.len() != TOTAL_SHIP_CELLS {
        return Err(PlacementError::WrongFleet);
    }

    let layout = Board::from_ships(&sorted);
    let mut seen = Board::new();
    let mut session = PlacementSession::new();
    for &cell in &sorted {
        if seen.get(cell) == Cell::Ship {
            continue;
        }
        let ship = ship_extent(&layout, cell, |c| c == Cell::Ship);
        for &part in &ship {
            seen.mark_at_opponent(part, Cell::Ship);
        }
        session.propose(&ship)?;
    }
    if session.is_complete() {
        Ok(())
    } else {
        Err(PlacementError::WrongFleet)
    }
}
