//! Board coordinates and the "A1".."J10" notation used on the wire and in the UI.
//!
//! The letter selects the column (`x`), the number selects the row (`y + 1`).
//! A `Coord` can only be built through checked constructors, so anything that
//! holds one is guaranteed to address a cell inside the board.

use core::fmt;
use core::str::FromStr;

use crate::core::config::BOARD_SIZE;

const GRID: i8 = BOARD_SIZE as i8;

/// The four cardinal steps.
pub const CARDINAL: [(i8, i8); 4] = [(1, 0), (0, 1), (-1, 0), (0, -1)];

/// The eight steps to every surrounding cell.
pub const SURROUNDING: [(i8, i8); 8] = [
    (1, 0),
    (0, 1),
    (-1, 0),
    (0, -1),
    (1, 1),
    (-1, 1),
    (-1, -1),
    (1, -1),
];

/// A cell address inside the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "std",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "(u8, u8)", into = "(u8, u8)")
)]
pub struct Coord {
    x: u8,
    y: u8,
}

/// Reasons a textual coordinate was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordError {
    /// Input was empty or too long to be a coordinate.
    Malformed,
    /// Column letter outside `A..=J`.
    BadColumn,
    /// Row number missing, unparsable or outside `1..=10`.
    BadRow,
}

impl fmt::Display for CoordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordError::Malformed => write!(f, "Coordinate must look like A1..J10"),
            CoordError::BadColumn => write!(f, "Column must be a letter from A to J"),
            CoordError::BadRow => write!(f, "Row must be a number from 1 to 10"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CoordError {}

impl Coord {
    /// Checked constructor; `None` when either axis is off the board.
    pub const fn new(x: u8, y: u8) -> Option<Self> {
        if x < BOARD_SIZE && y < BOARD_SIZE {
            Some(Self { x, y })
        } else {
            None
        }
    }

    /// Column index (the letter).
    pub fn x(self) -> usize {
        self.x as usize
    }

    /// Row index (the number minus one).
    pub fn y(self) -> usize {
        self.y as usize
    }

    /// Neighbour reached by stepping `(dx, dy)`, if it stays on the board.
    pub fn offset(self, dx: i8, dy: i8) -> Option<Self> {
        let x = self.x as i8 + dx;
        let y = self.y as i8 + dy;
        if (0..GRID).contains(&x) && (0..GRID).contains(&y) {
            Some(Self {
                x: x as u8,
                y: y as u8,
            })
        } else {
            None
        }
    }

    /// Every in-bounds cell touching this one, diagonals included.
    pub fn surrounding(self) -> impl Iterator<Item = Coord> {
        SURROUNDING
            .into_iter()
            .filter_map(move |(dx, dy)| self.offset(dx, dy))
    }

    /// Every in-bounds cell sharing an edge with this one.
    pub fn cardinal(self) -> impl Iterator<Item = Coord> {
        CARDINAL
            .into_iter()
            .filter_map(move |(dx, dy)| self.offset(dx, dy))
    }

    /// All cells of the board in row-major order.
    pub fn all() -> impl Iterator<Item = Coord> {
        (0..BOARD_SIZE).flat_map(|y| (0..BOARD_SIZE).map(move |x| Coord { x, y }))
    }

    /// Step from `self` to `next` when the two share an edge.
    pub fn step_to(self, next: Coord) -> Option<(i8, i8)> {
        let dx = next.x as i8 - self.x as i8;
        let dy = next.y as i8 - self.y as i8;
        CARDINAL.into_iter().find(|&step| step == (dx, dy))
    }
}

// Deserialisation goes through this, so decoded frames stay on the board too.
impl TryFrom<(u8, u8)> for Coord {
    type Error = CoordError;

    fn try_from((x, y): (u8, u8)) -> Result<Self, Self::Error> {
        if x >= BOARD_SIZE {
            return Err(CoordError::BadColumn);
        }
        Coord::new(x, y).ok_or(CoordError::BadRow)
    }
}

impl From<Coord> for (u8, u8) {
    fn from(c: Coord) -> Self {
        (c.x, c.y)
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", (b'A' + self.x) as char, self.y + 1)
    }
}

impl FromStr for Coord {
    type Err = CoordError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        if input.len() < 2 || input.len() > 3 {
            return Err(CoordError::Malformed);
        }
        let mut chars = input.chars();
        let col = chars.next().ok_or(CoordError::Malformed)?.to_ascii_uppercase();
        if !col.is_ascii_uppercase() {
            return Err(CoordError::BadColumn);
        }
        let x = col as u8 - b'A';
        let row: u8 = chars.as_str().parse().map_err(|_| CoordError::BadRow)?;
        if row == 0 || row > BOARD_SIZE {
            return Err(CoordError::BadRow);
        }
        Coord::new(x, row - 1).ok_or(CoordError::BadColumn)
    }
}
