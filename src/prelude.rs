//! Commonly used types and utilities for ease of import.

pub use crate::core::{Board, Cell, Coord, FireOutcome, FleetTally, PlacementSession};

#[cfg(feature = "std")]
pub use crate::{
    feeds, present, AbortHandle, CellSource, Display, GameState, LocalAuthority, MatchOutcome,
    RemoteGameService, Snapshot, StartRequest, SyncConfig, SyncEngine,
};
