//! Game board: a fixed grid of cell markers and the marking rules applied to it.

use alloc::vec::Vec;
use core::fmt;

use crate::core::common::{Cell, Grid};
use crate::core::coord::Coord;

/// 10×10 grid of markers. Two exist per match: the player's own fleet and the
/// record of shots fired at the opponent.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Board {
    cells: Grid,
}

impl Board {
    /// Create a board with every cell empty.
    pub fn new() -> Self {
        Self::default()
    }

    /// Board with `Ship` at every listed coordinate.
    pub fn from_ships(ships: &[Coord]) -> Self {
        let mut board = Self::new();
        for &c in ships {
            board.cells[c.y()][c.x()] = Cell::Ship;
        }
        board
    }

    /// Marker at `c`.
    pub fn get(&self, c: Coord) -> Cell {
        self.cells[c.y()][c.x()]
    }

    /// Copy of the raw grid.
    pub fn grid(&self) -> Grid {
        self.cells
    }

    /// Overwrite the whole grid.
    pub fn set_player_state(&mut self, grid: Grid) {
        self.cells = grid;
    }

    /// Apply an incoming shot: `Ship` becomes `Hit`, `Empty` becomes `Miss`.
    /// Cells already marked are left alone. Returns the marker now at `c`.
    pub fn mark_at_player(&mut self, c: Coord) -> Cell {
        let cell = &mut self.cells[c.y()][c.x()];
        *cell = match *cell {
            Cell::Ship => Cell::Hit,
            Cell::Empty => Cell::Miss,
            other => other,
        };
        *cell
    }

    /// Record a fire result unconditionally.
    pub fn mark_at_opponent(&mut self, c: Coord, marker: Cell) {
        self.cells[c.y()][c.x()] = marker;
    }

    /// Grid as the opponent sees it, with sunk segments shown as hits.
    pub fn opponent_view(&self) -> Grid {
        let mut view = self.cells;
        for row in view.iter_mut() {
            for cell in row.iter_mut() {
                *cell = cell.opponent_facing();
            }
        }
        view
    }

    /// Coordinates whose marker satisfies `pred`, in row-major order.
    pub fn cells_matching<F>(&self, pred: F) -> Vec<Coord>
    where
        F: Fn(Cell) -> bool,
    {
        Coord::all().filter(|&c| pred(self.get(c))).collect()
    }

    /// Number of cells holding `marker`.
    pub fn count(&self, marker: Cell) -> usize {
        self.cells
            .iter()
            .flat_map(|row| row.iter())
            .filter(|&&cell| cell == marker)
            .count()
    }
}

impl From<Grid> for Board {
    fn from(cells: Grid) -> Self {
        Self { cells }
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.cells.iter() {
            for cell in row.iter() {
                let ch = match cell {
                    Cell::Empty => '.',
                    Cell::Ship => 'S',
                    Cell::Hit => 'X',
                    Cell::Miss => 'o',
                    Cell::Sunk => '#',
                };
                write!(f, "{}", ch)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
