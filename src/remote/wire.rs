//! Frames exchanged between [`TcpRemote`](crate::remote::tcp::TcpRemote) and
//! the authority server.

use crate::core::{Coord, FireOutcome};
use crate::remote::{
    BoardLayout, Description, LobbyPlayer, PlayerStats, RemoteError, SessionToken, StartRequest,
    StatusReport,
};

/// Wire format version; bumped whenever a frame layout changes.
pub const PROTOCOL_VERSION: u8 = 1;

/// Client-to-server call, one per [`RemoteGameService`](crate::remote::RemoteGameService) method.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Request {
    Start(StartRequest),
    Status,
    Board,
    Fire(Coord),
    Abandon,
    Description,
    Lobby,
    Stats(Option<String>),
}

/// Server reply to a [`Request`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Response {
    Started(SessionToken),
    Status(StatusReport),
    Board(BoardLayout),
    Fired(FireOutcome),
    Abandoned,
    Description(Description),
    Lobby(Vec<LobbyPlayer>),
    Stats(Vec<PlayerStats>),
    Failure(RemoteError),
}

/// Versioned envelope around every frame.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Envelope<T> {
    pub version: u8,
    pub body: T,
}

impl<T> Envelope<T> {
    pub fn new(body: T) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            body,
        }
    }
}
