//! Ship placement validation and the interactive placement session.

use alloc::vec::Vec;
use core::fmt;

use crate::core::board::Board;
use crate::core::common::Cell;
use crate::core::config::{MAX_SHIP_LEN, NUM_SHIPS, TOTAL_SHIP_CELLS};
use crate::core::coord::Coord;
use crate::core::fleet::FleetTally;

/// Reasons a proposed placement was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementError {
    /// No cells were proposed.
    Empty,
    /// More cells than the longest ship.
    TooLong(usize),
    /// Consecutive cells are not one straight cardinal run.
    NotStraight,
    /// A cell is already occupied by a committed ship.
    Overlaps(Coord),
    /// A cell touches a committed ship, diagonals included.
    Touching(Coord),
    /// Every ship of this length has already been placed.
    LengthExhausted(usize),
    /// Random placement gave up.
    UnableToPlaceFleet,
    /// A submitted fleet does not match the fixed composition.
    WrongFleet,
}

impl fmt::Display for PlacementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlacementError::Empty => write!(f, "No cells selected"),
            PlacementError::TooLong(len) => {
                write!(f, "Ship of length {} exceeds maximum {}", len, MAX_SHIP_LEN)
            }
            PlacementError::NotStraight => write!(f, "Ship cells must form a straight line"),
            PlacementError::Overlaps(c) => write!(f, "{} is already occupied", c),
            PlacementError::Touching(c) => write!(f, "{} touches another ship", c),
            PlacementError::LengthExhausted(len) => {
                write!(f, "No ships of length {} left to place", len)
            }
            PlacementError::UnableToPlaceFleet => write!(f, "Unable to place fleet"),
            PlacementError::WrongFleet => write!(f, "Fleet does not match the required composition"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PlacementError {}

/// Check `cells`, in the order given, as a single ship against the ships
/// already committed to `board`.
pub fn check_placement(board: &Board, cells: &[Coord]) -> Result<(), PlacementError> {
    if cells.is_empty() {
        return Err(PlacementError::Empty);
    }
    if cells.len() > MAX_SHIP_LEN {
        return Err(PlacementError::TooLong(cells.len()));
    }

    let mut direction = None;
    for pair in cells.windows(2) {
        let step = pair[0].step_to(pair[1]).ok_or(PlacementError::NotStraight)?;
        match direction {
            None => direction = Some(step),
            Some(d) if d == step => {}
            Some(_) => return Err(PlacementError::NotStraight),
        }
    }

    for &cell in cells {
        if board.get(cell) == Cell::Ship {
            return Err(PlacementError::Overlaps(cell));
        }
        if let Some(near) = cell.surrounding().find(|&n| board.get(n) == Cell::Ship) {
            return Err(PlacementError::Touching(near));
        }
    }
    Ok(())
}

/// Convenience form of [`check_placement`].
pub fn is_valid_placement(board: &Board, cells: &[Coord]) -> bool {
    check_placement(board, cells).is_ok()
}

/// Places a full fleet one ship at a time.
///
/// Rejected proposals leave the session untouched so the same slot can be
/// retried.
#[derive(Debug, Clone)]
pub struct PlacementSession {
    board: Board,
    pool: FleetTally,
    ships: Vec<Vec<Coord>>,
}

impl Default for PlacementSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PlacementSession {
    /// Start with an empty board and the standard fleet to place.
    pub fn new() -> Self {
        Self {
            board: Board::new(),
            pool: FleetTally::standard(),
            ships: Vec::with_capacity(NUM_SHIPS),
        }
    }

    /// Validate and commit one ship. Returns its length.
    pub fn propose(&mut self, cells: &[Coord]) -> Result<usize, PlacementError> {
        check_placement(&self.board, cells)?;
        let len = cells.len();
        if self.pool.remaining(len) == 0 {
            return Err(PlacementError::LengthExhausted(len));
        }
        self.pool.decrement(len);
        for &c in cells {
            self.board.mark_at_opponent(c, Cell::Ship);
        }
        self.ships.push(cells.to_vec());
        Ok(len)
    }

    /// Longest length still waiting to be placed.
    pub fn next_length(&self) -> Option<usize> {
        self.pool.longest()
    }

    /// Ships of each length still waiting to be placed.
    pub fn pool(&self) -> &FleetTally {
        &self.pool
    }

    /// `true` once the whole fleet is on the board.
    pub fn is_complete(&self) -> bool {
        self.pool.total() == 0
    }

    /// Board with every committed ship.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// All committed ship cells, in placement order.
    pub fn ships(&self) -> Vec<Coord> {
        let mut all = Vec::with_capacity(TOTAL_SHIP_CELLS);
        for ship in &self.ships {
            all.extend_from_slice(ship);
        }
        all
    }
}
