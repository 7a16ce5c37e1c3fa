#![cfg(feature = "std")]

//! Seams between the engine and whatever shows the match to a player.

use tokio::sync::mpsc;

use crate::core::Coord;
use crate::remote::StatusReport;
use crate::state::Snapshot;
use crate::sync::FeedReceivers;

/// Renders engine output. Calls are made from a single task, in arrival order.
pub trait Display {
    fn render_status(&mut self, status: &StatusReport);
    fn render_state(&mut self, snapshot: &Snapshot);
    fn log(&mut self, line: &str);
}

/// Source of shot intents.
#[async_trait::async_trait]
pub trait CellSource: Send {
    /// Next cell to fire at, or `None` once input is exhausted.
    ///
    /// Must be cancel-safe: the presenter drops the future whenever another
    /// event arrives first.
    async fn select_cell(&mut self) -> Option<Coord>;
}

/// Pump engine feeds into `display`, forwarding shots picked from `input`.
///
/// Input is only consulted while the latest status says it is our turn, and
/// at most once per status event. Returns when the status and snapshot feeds
/// have both closed.
pub async fn present<D, C>(
    display: &mut D,
    input: &mut C,
    mut feeds: FeedReceivers,
    shots: mpsc::Sender<Coord>,
) where
    D: Display + ?Sized,
    C: CellSource + ?Sized,
{
    let mut status_open = true;
    let mut snapshots_open = true;
    let mut log_open = true;
    let mut input_open = true;
    let mut can_fire = false;

    while status_open || snapshots_open {
        tokio::select! {
            biased;
            status = feeds.status.recv(), if status_open => match status {
                Some(status) => {
                    can_fire = status.should_fire;
                    display.render_status(&status);
                }
                None => {
                    status_open = false;
                    can_fire = false;
                }
            },
            line = feeds.log.recv(), if log_open => match line {
                Some(line) => display.log(&line),
                None => log_open = false,
            },
            snapshot = feeds.snapshots.recv(), if snapshots_open => match snapshot {
                Some(snapshot) => display.render_state(&snapshot),
                None => snapshots_open = false,
            },
            cell = input.select_cell(), if can_fire && input_open => {
                can_fire = false;
                match cell {
                    Some(cell) => {
                        if shots.send(cell).await.is_err() {
                            log::debug!("[present] engine stopped taking shots");
                        }
                    }
                    None => {
                        log::debug!("[present] input closed");
                        input_open = false;
                    }
                }
            }
        }
    }

    while let Ok(line) = feeds.log.try_recv() {
        display.log(&line);
    }
}
