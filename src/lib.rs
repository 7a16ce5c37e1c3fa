#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod core;
#[cfg(feature = "std")]
pub mod config;
#[cfg(feature = "std")]
pub mod display;
#[cfg(feature = "std")]
mod logging;
pub mod prelude;
#[cfg(feature = "std")]
pub mod remote;
#[cfg(feature = "std")]
pub mod state;
#[cfg(feature = "std")]
pub mod sync;
#[cfg(feature = "std")]
pub mod terminal;

pub use crate::core::*;
#[cfg(feature = "std")]
pub use config::SyncConfig;
#[cfg(feature = "std")]
pub use display::{present, CellSource, Display};
#[cfg(feature = "std")]
pub use logging::{init_logging, level_from, LOG_ENV};
#[cfg(feature = "std")]
pub use remote::{
    local::{AuthorityConfig, LocalAuthority, PlayerRegistry},
    tcp::{serve, TcpRemote},
    RemoteError, RemoteGameService, StartRequest, StatusReport,
};
#[cfg(feature = "std")]
pub use state::{FireRecord, GameState, PlayerInfo, Snapshot};
#[cfg(feature = "std")]
pub use sync::{feeds, AbortHandle, FeedReceivers, Feeds, MatchOutcome, Shutdown, SyncEngine};
#[cfg(feature = "std")]
pub use terminal::{place_fleet, AutoTargeter, LineInput, Terminal};
