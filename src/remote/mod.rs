//! Contract with the remote game authority.
//!
//! The engine only ever sees [`RemoteGameService`]. Two implementations ship
//! with the crate: [`local::LocalAuthority`] runs a bot match in-process, and
//! [`tcp::TcpRemote`] forwards every call to an authority hosted elsewhere.

use core::fmt;

use crate::core::{Coord, FireOutcome};

pub mod local;
pub mod tcp;
pub mod wire;

/// Coarse phase of a match as reported by the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MatchPhase {
    /// Waiting for an opponent or for the bot to get ready.
    Starting,
    InProgress,
    Ended,
}

impl fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchPhase::Starting => write!(f, "waiting"),
            MatchPhase::InProgress => write!(f, "game_in_progress"),
            MatchPhase::Ended => write!(f, "ended"),
        }
    }
}

/// Parameters for requesting a new match.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StartRequest {
    pub nick: String,
    pub desc: String,
    /// Specific opponent to challenge, if any.
    pub target_nick: Option<String>,
    pub ships: Vec<Coord>,
    pub vs_bot: bool,
}

/// Opaque session credential issued by `start_match`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SessionToken(pub String);

/// One status poll.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StatusReport {
    pub phase: MatchPhase,
    /// Outcome text once the match is over ("win", "lose", ...).
    pub last_status: String,
    pub nick: String,
    pub opponent: String,
    /// Opponent shots fired since the previous poll.
    pub opponent_shots: Vec<Coord>,
    pub should_fire: bool,
    /// Seconds left in the current turn.
    pub timer: u32,
}

impl StatusReport {
    pub fn is_terminal(&self) -> bool {
        self.phase == MatchPhase::Ended
    }
}

/// The player's fleet as the authority recorded it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BoardLayout {
    pub ships: Vec<Coord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Description {
    pub nick: String,
    pub desc: String,
    pub opponent: String,
    pub opponent_desc: String,
}

/// Player waiting in the lobby.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LobbyPlayer {
    pub nick: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PlayerStats {
    pub nick: String,
    pub games: u32,
    pub wins: u32,
    pub points: u32,
    pub rank: u32,
}

impl fmt::Display for PlayerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Nick: {}, Games: {}, Points: {}, Rank: {}, Wins: {}",
            self.nick, self.games, self.points, self.rank, self.wins
        )
    }
}

/// Failures reported by an authority or by the link to it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RemoteError {
    /// Network, timeout or framing failure.
    Transport(String),
    /// Missing or expired session.
    Unauthorized(String),
    /// Session not allowed to perform the operation.
    Forbidden(String),
    /// Too many requests.
    RateLimited(String),
    /// Request rejected as malformed or out of turn.
    BadRequest(String),
    /// Requested resource does not exist.
    NotFound(String),
    /// Shot at a cell that was already resolved.
    AlreadyResolved,
}

/// How the engine treats a [`RemoteError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Retried by the next poll tick.
    TransportFailure,
    /// The match attempt cannot continue.
    AuthorizationFailure,
    /// Surfaced; the status loop backs off.
    RateLimited,
    /// Swallowed as a no-op.
    AlreadyResolvedShot,
    /// Surfaced; the loop carries on.
    Rejected,
}

impl RemoteError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RemoteError::Transport(_) => ErrorKind::TransportFailure,
            RemoteError::Unauthorized(_) | RemoteError::Forbidden(_) => {
                ErrorKind::AuthorizationFailure
            }
            RemoteError::RateLimited(_) => ErrorKind::RateLimited,
            RemoteError::AlreadyResolved => ErrorKind::AlreadyResolvedShot,
            RemoteError::BadRequest(_) | RemoteError::NotFound(_) => ErrorKind::Rejected,
        }
    }

    pub fn is_authorization(&self) -> bool {
        self.kind() == ErrorKind::AuthorizationFailure
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::Transport(m) => write!(f, "transport: {}", m),
            RemoteError::Unauthorized(m) => write!(f, "unauthorized: {}", m),
            RemoteError::Forbidden(m) => write!(f, "forbidden: {}", m),
            RemoteError::RateLimited(m) => write!(f, "rate limited: {}", m),
            RemoteError::BadRequest(m) => write!(f, "bad request: {}", m),
            RemoteError::NotFound(m) => write!(f, "not found: {}", m),
            RemoteError::AlreadyResolved => write!(f, "already hit"),
        }
    }
}

impl std::error::Error for RemoteError {}

impl From<std::io::Error> for RemoteError {
    fn from(err: std::io::Error) -> Self {
        RemoteError::Transport(err.to_string())
    }
}

/// Operations offered by a game authority.
///
/// Methods take `&self` so one service can be shared by all engine loops;
/// implementations synchronise internally.
#[async_trait::async_trait]
pub trait RemoteGameService: Send + Sync {
    async fn start_match(&self, request: StartRequest) -> Result<SessionToken, RemoteError>;
    async fn status(&self) -> Result<StatusReport, RemoteError>;
    async fn board(&self) -> Result<BoardLayout, RemoteError>;
    async fn fire(&self, coord: Coord) -> Result<FireOutcome, RemoteError>;
    async fn abandon(&self) -> Result<(), RemoteError>;
    async fn description(&self) -> Result<Description, RemoteError>;
    async fn lobby(&self) -> Result<Vec<LobbyPlayer>, RemoteError>;
    async fn stats(&self, nick: Option<String>) -> Result<Vec<PlayerStats>, RemoteError>;
}
