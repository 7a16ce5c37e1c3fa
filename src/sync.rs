#![cfg(feature = "std")]

//! Match synchronisation engine.
//!
//! A match attempt moves through `AwaitingStart -> InProgress -> Ended |
//! Aborted`. While in progress, four tasks share one [`Shutdown`]:
//!
//! * the status loop polls the authority, applies opponent shots and detects
//!   the end of the match,
//! * the snapshot loop publishes copies of [`GameState`],
//! * the shot loop turns shot intents into `fire` calls,
//! * the error loop reports every failure the others hit.
//!
//! Sends to the status and snapshot feeds race the shutdown with the
//! shutdown polled first, so nothing reaches them once it has fired.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::SyncConfig;
use crate::core::Coord;
use crate::remote::{
    Description, ErrorKind, MatchPhase, RemoteError, RemoteGameService, StartRequest,
    StatusReport,
};
use crate::state::{FireRecord, GameState, PlayerInfo, Snapshot};

/// Shared cancellation signal. Clones observe the same signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Fire the signal. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal has fired, immediately if it already has.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|&fired| fired).await;
    }
}

/// Handle the caller keeps to abort a running match.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    signal: Shutdown,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.signal.trigger();
    }

    pub fn is_aborted(&self) -> bool {
        self.signal.is_triggered()
    }

    pub async fn aborted(&self) {
        self.signal.cancelled().await
    }
}

/// Sending halves of the downstream feeds.
#[derive(Debug, Clone)]
pub struct Feeds {
    pub status: mpsc::Sender<StatusReport>,
    pub snapshots: mpsc::Sender<Snapshot>,
    pub log: mpsc::UnboundedSender<String>,
}

/// Receiving halves, handed to the presentation layer.
#[derive(Debug)]
pub struct FeedReceivers {
    pub status: mpsc::Receiver<StatusReport>,
    pub snapshots: mpsc::Receiver<Snapshot>,
    pub log: mpsc::UnboundedReceiver<String>,
}

/// Create the three feeds. Status and snapshot feeds hold `capacity` events.
pub fn feeds(capacity: usize) -> (Feeds, FeedReceivers) {
    let capacity = capacity.max(1);
    let (status_tx, status_rx) = mpsc::channel(capacity);
    let (snap_tx, snap_rx) = mpsc::channel(capacity);
    let (log_tx, log_rx) = mpsc::unbounded_channel();
    (
        Feeds {
            status: status_tx,
            snapshots: snap_tx,
            log: log_tx,
        },
        FeedReceivers {
            status: status_rx,
            snapshots: snap_rx,
            log: log_rx,
        },
    )
}

/// How a match attempt finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The authority reported the end of the match.
    Ended { last_status: String },
    /// Aborted locally; the match was abandoned.
    Aborted,
    /// The authority refused the session.
    Denied(RemoteError),
}

/// Why the status loop stopped.
#[derive(Debug)]
enum LoopExit {
    Cancelled,
    Ended(String),
    Denied(RemoteError),
}

/// Everything a spawned loop needs, cloned once per loop.
#[derive(Clone)]
struct LoopContext {
    remote: Arc<dyn RemoteGameService>,
    state: Arc<GameState>,
    config: SyncConfig,
    shutdown: Shutdown,
    errors: mpsc::UnboundedSender<RemoteError>,
}

impl LoopContext {
    fn report(&self, err: RemoteError) {
        // The error loop outlives every producer; a closed channel means the
        // engine is already unwinding.
        let _ = self.errors.send(err);
    }

    /// Send `value` unless the shutdown fires first. Returns `false` once
    /// the shutdown has fired.
    async fn forward<T>(&self, feed: &mpsc::Sender<T>, value: T) -> bool {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => false,
            sent = feed.send(value) => {
                if sent.is_err() {
                    log::trace!("[SyncEngine] feed closed, event dropped");
                }
                true
            }
        }
    }

    fn apply_description(&self, d: Description) {
        self.state.update_players(
            PlayerInfo {
                nick: d.nick,
                desc: d.desc,
            },
            PlayerInfo {
                nick: d.opponent,
                desc: d.opponent_desc,
            },
        );
    }

    /// Await a remote call unless the shutdown fires first. `None` means
    /// the call was dropped.
    async fn call<T, F>(&self, op: F) -> Option<Result<T, RemoteError>>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            result = op => Some(result),
        }
    }
}

fn terminal_status(report: &StatusReport) -> String {
    if report.last_status.is_empty() {
        report.phase.to_string()
    } else {
        report.last_status.clone()
    }
}

/// Drives one match against a [`RemoteGameService`].
pub struct SyncEngine {
    remote: Arc<dyn RemoteGameService>,
    state: Arc<GameState>,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(
        remote: Arc<dyn RemoteGameService>,
        state: Arc<GameState>,
        config: SyncConfig,
    ) -> Self {
        Self {
            remote,
            state,
            config,
        }
    }

    pub fn state(&self) -> &Arc<GameState> {
        &self.state
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Play one match to completion.
    ///
    /// Returns `Err` only when the authority rejects `start_match` for a
    /// reason other than authorization. Every loop has been joined and the
    /// feeds dropped by the time this returns.
    pub async fn play(
        &self,
        request: StartRequest,
        shots: mpsc::Receiver<Coord>,
        feeds: Feeds,
        abort: AbortHandle,
    ) -> Result<MatchOutcome, RemoteError> {
        let shutdown = Shutdown::new();
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();
        let ctx = LoopContext {
            remote: Arc::clone(&self.remote),
            state: Arc::clone(&self.state),
            config: self.config.clone(),
            shutdown: shutdown.clone(),
            errors: errors_tx,
        };

        self.state.clear();
        self.state.update_player_info(&request.nick, &request.desc);
        self.state.set_player_board(&request.ships);

        log::info!("[SyncEngine] requesting match for {}", request.nick);
        match self.remote.start_match(request).await {
            Ok(token) => log::debug!("[SyncEngine] session {} issued", token.0),
            Err(e) if e.is_authorization() => {
                log::warn!("[SyncEngine] start refused: {}", e);
                ctx.state.set_last_status(&e.to_string());
                ctx.state.clear();
                return Ok(MatchOutcome::Denied(e));
            }
            Err(e) => {
                log::warn!("[SyncEngine] start failed: {}", e);
                return Err(e);
            }
        }

        let errors_task = tokio::spawn(error_loop(errors_rx, feeds.log.clone()));
        let relay = {
            let shutdown = shutdown.clone();
            let abort = abort.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = abort.aborted() => {
                        log::info!("[SyncEngine] abort requested");
                        shutdown.trigger();
                    }
                    _ = shutdown.cancelled() => {}
                }
            })
        };

        let exit = match await_start(&ctx, &feeds).await {
            StartPhase::Running(report) => self.run_match(&ctx, report, shots, &feeds).await,
            StartPhase::Finished(exit) => exit,
        };

        shutdown.trigger();
        if let Err(e) = relay.await {
            log::error!("[SyncEngine] abort relay failed: {}", e);
        }

        // Every loop has been joined, so nothing races the reset below.
        let outcome = match exit {
            LoopExit::Ended(last_status) => {
                self.state.set_last_status(&last_status);
                MatchOutcome::Ended { last_status }
            }
            LoopExit::Denied(e) => {
                self.state.set_last_status(&e.to_string());
                MatchOutcome::Denied(e)
            }
            LoopExit::Cancelled => {
                if !abort.is_aborted() {
                    log::warn!("[SyncEngine] match stopped without an end or an abort");
                }
                if let Err(e) = self.remote.abandon().await {
                    ctx.report(e);
                }
                self.state.set_last_status("abandoned");
                MatchOutcome::Aborted
            }
        };
        self.state.clear();

        drop(ctx);
        drop(feeds);
        if let Err(e) = errors_task.await {
            log::error!("[SyncEngine] error loop failed: {}", e);
        }
        log::info!("[SyncEngine] match finished: {:?}", outcome);
        Ok(outcome)
    }

    /// Load details, spawn the in-progress loops and wait for all of them.
    async fn run_match(
        &self,
        ctx: &LoopContext,
        first: StatusReport,
        shots: mpsc::Receiver<Coord>,
        feeds: &Feeds,
    ) -> LoopExit {
        let mut described = false;
        match ctx.call(ctx.remote.description()).await {
            None => return LoopExit::Cancelled,
            Some(Ok(d)) => {
                ctx.apply_description(d);
                described = true;
            }
            Some(Err(e)) if e.is_authorization() => return deny(ctx, e),
            Some(Err(e)) => ctx.report(e),
        }
        match ctx.call(ctx.remote.board()).await {
            None => return LoopExit::Cancelled,
            Some(Ok(layout)) => {
                ctx.state.set_player_board(&layout.ships);
            }
            Some(Err(e)) if e.is_authorization() => return deny(ctx, e),
            Some(Err(e)) => ctx.report(e),
        }
        ctx.state.mark_player_shots(&first.opponent_shots);
        ctx.state.update_nicks(&first.nick, &first.opponent);
        log::info!(
            "[SyncEngine] match in progress against {}",
            ctx.state.snapshot().opponent.nick
        );
        if !ctx.forward(&feeds.status, first).await {
            return LoopExit::Cancelled;
        }

        let status: JoinHandle<LoopExit> = tokio::spawn(status_loop(
            ctx.clone(),
            feeds.status.clone(),
            described,
        ));
        let snapshots = tokio::spawn(snapshot_loop(ctx.clone(), feeds.snapshots.clone()));
        let shooter = tokio::spawn(shot_loop(ctx.clone(), shots));

        let exit = match status.await {
            Ok(exit) => exit,
            Err(e) => {
                log::error!("[SyncEngine] status loop failed: {}", e);
                ctx.shutdown.trigger();
                LoopExit::Cancelled
            }
        };
        for (name, handle) in [("snapshot", snapshots), ("shot", shooter)] {
            if let Err(e) = handle.await {
                log::error!("[SyncEngine] {} loop failed: {}", name, e);
            }
        }
        exit
    }
}

enum StartPhase {
    Running(StatusReport),
    Finished(LoopExit),
}

fn deny(ctx: &LoopContext, err: RemoteError) -> LoopExit {
    log::warn!("[SyncEngine] session refused: {}", err);
    ctx.report(err.clone());
    ctx.shutdown.trigger();
    LoopExit::Denied(err)
}

/// Poll until the authority reports the match as running.
async fn await_start(ctx: &LoopContext, feeds: &Feeds) -> StartPhase {
    let mut ticker = interval(ctx.config.start_poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = ctx.shutdown.cancelled() => return StartPhase::Finished(LoopExit::Cancelled),
            _ = ticker.tick() => {}
        }
        let Some(polled) = ctx.call(ctx.remote.status()).await else {
            return StartPhase::Finished(LoopExit::Cancelled);
        };
        match polled {
            Ok(report) if report.phase == MatchPhase::InProgress => {
                return StartPhase::Running(report)
            }
            Ok(report) if report.is_terminal() => {
                let last = terminal_status(&report);
                ctx.forward(&feeds.status, report).await;
                ctx.shutdown.trigger();
                log::info!("[SyncEngine] match ended before it started: {}", last);
                return StartPhase::Finished(LoopExit::Ended(last));
            }
            Ok(report) => {
                log::debug!("[SyncEngine] waiting for match start ({})", report.phase);
                ctx.state.update_nicks(&report.nick, &report.opponent);
                if !ctx.forward(&feeds.status, report).await {
                    return StartPhase::Finished(LoopExit::Cancelled);
                }
            }
            Err(e) if e.is_authorization() => return StartPhase::Finished(deny(ctx, e)),
            Err(e) => ctx.report(e),
        }
    }
}

async fn status_loop(
    ctx: LoopContext,
    feed: mpsc::Sender<StatusReport>,
    mut described: bool,
) -> LoopExit {
    let mut ticker = interval(ctx.config.status_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the entry report already covered it.
    ticker.tick().await;
    let mut rate_limited = 0u32;
    let mut skip = 0u32;

    loop {
        tokio::select! {
            biased;
            _ = ctx.shutdown.cancelled() => return LoopExit::Cancelled,
            _ = ticker.tick() => {}
        }
        if skip > 0 {
            skip -= 1;
            log::trace!("[SyncEngine] status poll skipped, {} left", skip);
            continue;
        }
        let Some(polled) = ctx.call(ctx.remote.status()).await else {
            return LoopExit::Cancelled;
        };
        let report = match polled {
            Ok(report) => report,
            Err(e) if e.is_authorization() => return deny(&ctx, e),
            Err(e) => {
                if e.kind() == ErrorKind::RateLimited {
                    rate_limited += 1;
                    skip = ctx.config.backoff_ticks(rate_limited);
                    log::debug!("[SyncEngine] rate limited, skipping {} polls", skip);
                }
                ctx.report(e);
                continue;
            }
        };
        rate_limited = 0;

        log::trace!(
            "[SyncEngine] status {} with {} opponent shots",
            report.phase,
            report.opponent_shots.len()
        );
        ctx.state.mark_player_shots(&report.opponent_shots);
        ctx.state.update_nicks(&report.nick, &report.opponent);

        if report.phase == MatchPhase::InProgress && !described {
            match ctx.call(ctx.remote.description()).await {
                None => return LoopExit::Cancelled,
                Some(Ok(d)) => {
                    ctx.apply_description(d);
                    described = true;
                }
                Some(Err(e)) if e.is_authorization() => return deny(&ctx, e),
                Some(Err(e)) => ctx.report(e),
            }
        }

        if report.is_terminal() {
            let last = terminal_status(&report);
            ctx.forward(&feed, report).await;
            ctx.shutdown.trigger();
            log::info!("[SyncEngine] match ended: {}", last);
            return LoopExit::Ended(last);
        }
        if !ctx.forward(&feed, report).await {
            return LoopExit::Cancelled;
        }
    }
}

async fn snapshot_loop(ctx: LoopContext, feed: mpsc::Sender<Snapshot>) {
    let mut ticker = interval(ctx.config.snapshot_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = ctx.shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let snapshot = ctx.state.snapshot();
        if !ctx.forward(&feed, snapshot).await {
            break;
        }
    }
    log::debug!("[SyncEngine] snapshot loop stopped");
}

async fn shot_loop(ctx: LoopContext, mut shots: mpsc::Receiver<Coord>) {
    loop {
        let coord = tokio::select! {
            biased;
            _ = ctx.shutdown.cancelled() => break,
            next = shots.recv() => match next {
                Some(coord) => coord,
                None => {
                    log::debug!("[SyncEngine] shot intents closed");
                    ctx.shutdown.cancelled().await;
                    break;
                }
            },
        };
        if ctx.state.is_resolved(coord) {
            log::debug!("[SyncEngine] {} already resolved, not firing", coord);
            continue;
        }
        let Some(fired) = ctx.call(ctx.remote.fire(coord)).await else {
            break;
        };
        match fired {
            Ok(outcome) => match ctx.state.record_fire(coord, outcome) {
                FireRecord::Sunk { ship, counted } => {
                    log::info!(
                        "[SyncEngine] {} sank a ship of length {}{}",
                        coord,
                        ship.len(),
                        if counted { "" } else { " (already counted)" }
                    );
                }
                record => log::debug!("[SyncEngine] {} -> {:?}", coord, record),
            },
            Err(RemoteError::AlreadyResolved) => {
                log::debug!("[SyncEngine] {} already hit on the remote side", coord);
            }
            Err(e) => ctx.report(e),
        }
    }
    log::debug!("[SyncEngine] shot loop stopped");
}

/// Report failures until every producer has gone away.
async fn error_loop(
    mut errors: mpsc::UnboundedReceiver<RemoteError>,
    log_feed: mpsc::UnboundedSender<String>,
) {
    while let Some(err) = errors.recv().await {
        log::warn!("[SyncEngine] {}", err);
        let _ = log_feed.send(format!("error: {}", err));
    }
}
