//! Fixed game rules shared by the client and the bot authority.

/// Width and height of every board.
pub const BOARD_SIZE: u8 = 10;

/// Longest ship in the fleet.
pub const MAX_SHIP_LEN: usize = 4;

/// Fleet composition as `(length, count)` pairs, longest first.
pub const FLEET: [(usize, u8); MAX_SHIP_LEN] = [(4, 1), (3, 2), (2, 3), (1, 4)];

/// Number of ships in a full fleet.
pub const NUM_SHIPS: usize = 1 + 2 + 3 + 4;

/// Total number of ship segments in a full fleet.
pub const TOTAL_SHIP_CELLS: usize = 4 + 3 * 2 + 2 * 3 + 4;
