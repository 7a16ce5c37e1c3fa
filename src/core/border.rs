//! Sunk-ship detection on a partially revealed board.
//!
//! Ships are straight runs of one to four cells and never touch, not even
//! diagonally. Once a ship is reported sunk its full extent can be recovered
//! from the struck cells around the final shot, and every cell bordering it is
//! known to be water.

use alloc::vec::Vec;

use crate::core::board::Board;
use crate::core::common::Cell;
use crate::core::coord::{Coord, CARDINAL};

/// Outcome of processing a sunk notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkReport {
    /// Every cell of the destroyed ship, sorted.
    pub ship: Vec<Coord>,
    /// `false` when every cell was already marked sunk, i.e. a repeated
    /// notification for a ship that was counted before.
    pub fresh: bool,
}

impl SinkReport {
    /// Length of the destroyed ship.
    pub fn len(&self) -> usize {
        self.ship.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ship.is_empty()
    }
}

/// Cells of the straight run through `origin` whose markers satisfy `is_part`.
///
/// Walks outward in each cardinal direction until the predicate fails or the
/// board ends. The origin is always included. The result is sorted, so a
/// straight ship comes back in board order.
pub fn ship_extent<F>(board: &Board, origin: Coord, is_part: F) -> Vec<Coord>
where
    F: Fn(Cell) -> bool,
{
    let mut cells = Vec::with_capacity(4);
    cells.push(origin);
    for (dx, dy) in CARDINAL {
        let mut cursor = origin;
        while let Some(next) = cursor.offset(dx, dy) {
            if !is_part(board.get(next)) {
                break;
            }
            cells.push(next);
            cursor = next;
        }
    }
    cells.sort_unstable();
    cells.dedup();
    cells
}

/// Locate the ship containing `origin` on an opponent board, following
/// struck (`Hit` or `Sunk`) cells.
pub fn find_ship(board: &Board, origin: Coord) -> Vec<Coord> {
    ship_extent(board, origin, Cell::is_struck)
}

/// Mark every in-bounds cell around the ship through `origin` as `Miss`,
/// leaving struck cells untouched. Returns the ship's cells.
pub fn draw_border(board: &mut Board, origin: Coord) -> Vec<Coord> {
    let ship = find_ship(board, origin);
    for &cell in &ship {
        for around in cell.surrounding() {
            if !board.get(around).is_struck() {
                board.mark_at_opponent(around, Cell::Miss);
            }
        }
    }
    ship
}

/// Handle a sunk report at `origin`: mark the shot, recover the ship, clear
/// its border and flag every segment as sunk.
///
/// Safe to call repeatedly for the same ship; later calls change nothing and
/// report `fresh == false`.
pub fn mark_sunk(board: &mut Board, origin: Coord) -> SinkReport {
    if !board.get(origin).is_struck() {
        board.mark_at_opponent(origin, Cell::Hit);
    }
    let ship = draw_border(board, origin);
    let mut fresh = false;
    for &cell in &ship {
        if board.get(cell) != Cell::Sunk {
            fresh = true;
            board.mark_at_opponent(cell, Cell::Sunk);
        }
    }
    SinkReport { ship, fresh }
}
