#![cfg(feature = "std")]

//! Shared match state behind a single lock.
//!
//! Every method takes the lock once, does its work and releases it before
//! returning. Nothing here awaits, so the guard never crosses a suspension
//! point and callers on any task can use it freely.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::core::{mark_sunk, Board, Cell, Coord, FireOutcome, FleetTally, Grid};

/// Nickname and free-text description of one side.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PlayerInfo {
    pub nick: String,
    pub desc: String,
}

/// Copied, point-in-time view of the match. Owns its grids.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Snapshot {
    pub player_board: Grid,
    pub opponent_board: Grid,
    pub player: PlayerInfo,
    pub opponent: PlayerInfo,
    pub total_shots: u32,
    pub total_hits: u32,
    pub ships_remaining: FleetTally,
    pub last_status: String,
}

impl Snapshot {
    /// Hits as a percentage of shots fired; zero before the first shot.
    pub fn accuracy(&self) -> f64 {
        if self.total_shots == 0 {
            return 0.0;
        }
        self.total_hits as f64 / self.total_shots as f64 * 100.0
    }
}

/// What a recorded fire result did to the opponent board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireRecord {
    Hit,
    Miss,
    /// Ship destroyed; `counted` is `false` for a repeated notification that
    /// left the remaining-ship tally alone.
    Sunk { ship: Vec<Coord>, counted: bool },
}

#[derive(Debug, Clone)]
struct Inner {
    player: PlayerInfo,
    opponent: PlayerInfo,
    player_board: Board,
    opponent_board: Board,
    total_shots: u32,
    total_hits: u32,
    opp_ships_remaining: FleetTally,
    last_game_status: String,
}

impl Inner {
    fn fresh(player: PlayerInfo, last_game_status: String) -> Self {
        Self {
            player,
            opponent: PlayerInfo::default(),
            player_board: Board::new(),
            opponent_board: Board::new(),
            total_shots: 0,
            total_hits: 0,
            opp_ships_remaining: FleetTally::standard(),
            last_game_status,
        }
    }
}

/// Single source of truth for the client's view of a match.
#[derive(Debug)]
pub struct GameState {
    inner: Mutex<Inner>,
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

impl GameState {
    /// Empty boards, zero counters, full fleet remaining.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::fresh(PlayerInfo::default(), String::new())),
        }
    }

    // Poisoning is ignored; every mutation leaves `Inner` consistent.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set both identities at once.
    pub fn update_players(&self, player: PlayerInfo, opponent: PlayerInfo) {
        let mut inner = self.lock();
        inner.player = player;
        inner.opponent = opponent;
    }

    /// Set the player's own nickname and description.
    pub fn update_player_info(&self, nick: &str, desc: &str) {
        let mut inner = self.lock();
        inner.player.nick = nick.to_string();
        inner.player.desc = desc.to_string();
    }

    /// Refresh nicknames reported by a status poll, keeping descriptions.
    pub fn update_nicks(&self, nick: &str, opponent: &str) {
        let mut inner = self.lock();
        if !nick.is_empty() {
            inner.player.nick = nick.to_string();
        }
        if !opponent.is_empty() {
            inner.opponent.nick = opponent.to_string();
        }
    }

    /// Replace the player board with `Ship` at each coordinate.
    pub fn set_player_board(&self, ships: &[Coord]) -> Grid {
        let mut inner = self.lock();
        inner.player_board = Board::from_ships(ships);
        inner.player_board.grid()
    }

    /// Every ship cell on the player board, in row-major order.
    pub fn player_ships(&self) -> Vec<Coord> {
        self.lock()
            .player_board
            .cells_matching(|c| matches!(c, Cell::Ship | Cell::Hit | Cell::Sunk))
    }

    /// Copy of the player board.
    pub fn player_board(&self) -> Grid {
        self.lock().player_board.grid()
    }

    /// Copy of the opponent board.
    pub fn opponent_board(&self) -> Board {
        self.lock().opponent_board
    }

    /// Apply one incoming opponent shot.
    pub fn mark_player(&self, c: Coord) -> Cell {
        self.lock().player_board.mark_at_player(c)
    }

    /// Apply a batch of incoming opponent shots under one lock.
    pub fn mark_player_shots(&self, shots: &[Coord]) {
        let mut inner = self.lock();
        for &c in shots {
            inner.player_board.mark_at_player(c);
        }
    }

    /// `true` when our own shot at `c` has already been resolved.
    pub fn is_resolved(&self, c: Coord) -> bool {
        self.lock().opponent_board.get(c).is_resolved()
    }

    /// Record the authority's answer to one of our shots.
    ///
    /// Counts the shot, and on a sinking recovers the ship, clears its border
    /// and decrements the tally for that length (at most once per ship).
    pub fn record_fire(&self, c: Coord, outcome: FireOutcome) -> FireRecord {
        let mut inner = self.lock();
        inner.total_shots += 1;
        if outcome.is_hit() {
            inner.total_hits += 1;
        }
        match outcome {
            FireOutcome::Miss => {
                inner.opponent_board.mark_at_opponent(c, Cell::Miss);
                FireRecord::Miss
            }
            FireOutcome::Hit => {
                inner.opponent_board.mark_at_opponent(c, Cell::Hit);
                FireRecord::Hit
            }
            FireOutcome::Sunk => {
                let report = mark_sunk(&mut inner.opponent_board, c);
                let counted = report.fresh && inner.opp_ships_remaining.decrement(report.len());
                FireRecord::Sunk {
                    ship: report.ship,
                    counted,
                }
            }
        }
    }

    /// Tally of opponent ships not yet sunk.
    pub fn ships_remaining(&self) -> FleetTally {
        self.lock().opp_ships_remaining
    }

    /// `(total_shots, total_hits)`.
    pub fn counters(&self) -> (u32, u32) {
        let inner = self.lock();
        (inner.total_shots, inner.total_hits)
    }

    pub fn set_last_status(&self, status: &str) {
        self.lock().last_game_status = status.to_string();
    }

    pub fn last_status(&self) -> String {
        self.lock().last_game_status.clone()
    }

    /// Consistent copy of everything under a single lock.
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.lock();
        Snapshot {
            player_board: inner.player_board.grid(),
            opponent_board: inner.opponent_board.grid(),
            player: inner.player.clone(),
            opponent: inner.opponent.clone(),
            total_shots: inner.total_shots,
            total_hits: inner.total_hits,
            ships_remaining: inner.opp_ships_remaining,
            last_status: inner.last_game_status.clone(),
        }
    }

    /// Reset for the next match. Keeps our own identity and the last status.
    pub fn clear(&self) {
        let mut inner = self.lock();
        let player = std::mem::take(&mut inner.player);
        let last = std::mem::take(&mut inner.last_game_status);
        *inner = Inner::fresh(player, last);
    }
}
