//! Core board model (no_std compatible)
//!
//! Grid, coordinates, sunk-ship detection, placement rules and fleet
//! bookkeeping. Needs only `alloc` and `rand`, so it builds without the
//! `std` feature.

pub mod board;
pub mod border;
pub mod common;
pub mod config;
pub mod coord;
pub mod fleet;
pub mod placement;
pub mod target;

// Re-export commonly used types
pub use board::Board;
pub use border::{draw_border, find_ship, mark_sunk, ship_extent, SinkReport};
pub use common::{Cell, FireOutcome, Grid};
pub use config::*;
pub use coord::{Coord, CoordError};
pub use fleet::{random_fleet, random_ship, validate_fleet, FleetTally};
pub use placement::{check_placement, is_valid_placement, PlacementError, PlacementSession};
pub use target::{follow_up_targets, pick_target};
