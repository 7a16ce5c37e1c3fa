use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::{rngs::SmallRng, SeedableRng};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use warships::remote::{
    BoardLayout, Description, LobbyPlayer, MatchPhase, PlayerStats, SessionToken,
};
use warships::{
    feeds, random_fleet, AbortHandle, Cell, Coord, FeedReceivers, FireOutcome, GameState,
    MatchOutcome, RemoteError, RemoteGameService, Snapshot, StartRequest, StatusReport,
    SyncConfig, SyncEngine,
};

#[derive(Default)]
struct Script {
    statuses: VecDeque<Result<StatusReport, RemoteError>>,
    fallback: Option<Result<StatusReport, RemoteError>>,
    fire: HashMap<Coord, Result<FireOutcome, RemoteError>>,
    start_error: Option<RemoteError>,
    description_delay: Option<Duration>,
}

/// Authority that replays canned answers and records what it was asked.
#[derive(Default)]
struct Scripted {
    script: Mutex<Script>,
    ships: Mutex<Vec<Coord>>,
    fired: Mutex<Vec<Coord>>,
    status_calls: AtomicUsize,
    abandoned: AtomicBool,
}

impl Scripted {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            ..Default::default()
        })
    }

    fn fired(&self) -> Vec<Coord> {
        self.fired.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl RemoteGameService for Scripted {
    async fn start_match(&self, request: StartRequest) -> Result<SessionToken, RemoteError> {
        if let Some(e) = self.script.lock().unwrap().start_error.clone() {
            return Err(e);
        }
        *self.ships.lock().unwrap() = request.ships;
        Ok(SessionToken("token".into()))
    }

    async fn status(&self) -> Result<StatusReport, RemoteError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        match script.statuses.pop_front() {
            Some(next) => next,
            None => script
                .fallback
                .clone()
                .unwrap_or_else(|| Ok(report(MatchPhase::InProgress, false, vec![], ""))),
        }
    }

    async fn board(&self) -> Result<BoardLayout, RemoteError> {
        Ok(BoardLayout {
            ships: self.ships.lock().unwrap().clone(),
        })
    }

    async fn fire(&self, coord: Coord) -> Result<FireOutcome, RemoteError> {
        self.fired.lock().unwrap().push(coord);
        self.script
            .lock()
            .unwrap()
            .fire
            .get(&coord)
            .cloned()
            .unwrap_or(Ok(FireOutcome::Miss))
    }

    async fn abandon(&self) -> Result<(), RemoteError> {
        self.abandoned.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn description(&self) -> Result<Description, RemoteError> {
        let delay = self.script.lock().unwrap().description_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(Description {
            nick: "tester".into(),
            desc: "scripted".into(),
            opponent: "bot".into(),
            opponent_desc: "canned".into(),
        })
    }

    async fn lobby(&self) -> Result<Vec<LobbyPlayer>, RemoteError> {
        Ok(vec![])
    }

    async fn stats(&self, _nick: Option<String>) -> Result<Vec<PlayerStats>, RemoteError> {
        Ok(vec![])
    }
}

fn report(phase: MatchPhase, should_fire: bool, shots: Vec<Coord>, last: &str) -> StatusReport {
    StatusReport {
        phase,
        last_status: last.to_string(),
        nick: "tester".into(),
        opponent: "bot".into(),
        opponent_shots: shots,
        should_fire,
        timer: 60,
    }
}

fn in_progress() -> Result<StatusReport, RemoteError> {
    Ok(report(MatchPhase::InProgress, true, vec![], ""))
}

fn c(s: &str) -> Coord {
    s.parse().unwrap()
}

fn fast() -> SyncConfig {
    SyncConfig::default()
        .with_status_interval(Duration::from_millis(5))
        .with_snapshot_interval(Duration::from_millis(5))
        .with_start_poll_interval(Duration::from_millis(5))
}

fn request() -> StartRequest {
    let mut rng = SmallRng::seed_from_u64(3);
    StartRequest {
        nick: "tester".into(),
        desc: "scripted".into(),
        target_nick: None,
        ships: random_fleet(&mut rng).unwrap(),
        vs_bot: true,
    }
}

#[derive(Debug, Default)]
struct Collected {
    statuses: Vec<StatusReport>,
    snapshots: Vec<Snapshot>,
    log: Vec<String>,
}

fn collect(rx: FeedReceivers) -> JoinHandle<Collected> {
    tokio::spawn(async move {
        let FeedReceivers {
            mut status,
            mut snapshots,
            mut log,
        } = rx;
        let mut out = Collected::default();
        let (mut status_open, mut snapshots_open) = (true, true);
        while status_open || snapshots_open {
            tokio::select! {
                s = status.recv(), if status_open => match s {
                    Some(s) => out.statuses.push(s),
                    None => status_open = false,
                },
                s = snapshots.recv(), if snapshots_open => match s {
                    Some(s) => out.snapshots.push(s),
                    None => snapshots_open = false,
                },
            }
        }
        while let Some(line) = log.recv().await {
            out.log.push(line);
        }
        out
    })
}

async fn wait_until<F: Fn() -> bool>(cond: F) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

struct Harness {
    remote: Arc<Scripted>,
    state: Arc<GameState>,
    abort: AbortHandle,
    shots: mpsc::Sender<Coord>,
    play: JoinHandle<Result<MatchOutcome, RemoteError>>,
    collected: JoinHandle<Collected>,
}

fn start(script: Script, config: SyncConfig) -> Harness {
    let remote = Scripted::new(script);
    let state = Arc::new(GameState::new());
    let engine = SyncEngine::new(
        remote.clone() as Arc<dyn RemoteGameService>,
        Arc::clone(&state),
        config.clone(),
    );
    let (tx, rx) = feeds(config.feed_capacity);
    let (shots, shot_rx) = mpsc::channel(8);
    let abort = AbortHandle::new();
    let play = {
        let abort = abort.clone();
        tokio::spawn(async move { engine.play(request(), shot_rx, tx, abort).await })
    };
    Harness {
        remote,
        state,
        abort,
        shots,
        play,
        collected: collect(rx),
    }
}

async fn finish(h: Harness) -> (MatchOutcome, Collected, Arc<Scripted>, Arc<GameState>) {
    let outcome = tokio::time::timeout(Duration::from_secs(10), h.play)
        .await
        .expect("engine did not stop")
        .unwrap()
        .unwrap();
    drop(h.shots);
    let collected = h.collected.await.unwrap();
    (outcome, collected, h.remote, h.state)
}

#[tokio::test(flavor = "multi_thread")]
async fn ended_status_stops_loops_and_clears_state() {
    let script = Script {
        statuses: VecDeque::from(vec![
            Ok(report(MatchPhase::Starting, false, vec![], "")),
            Ok(report(MatchPhase::InProgress, false, vec![], "")),
            in_progress(),
            in_progress(),
            Ok(report(MatchPhase::Ended, false, vec![], "win")),
        ]),
        ..Default::default()
    };
    let h = start(script, fast());
    let (outcome, collected, remote, state) = finish(h).await;

    assert_eq!(
        outcome,
        MatchOutcome::Ended {
            last_status: "win".into()
        }
    );
    let last = collected.statuses.last().unwrap();
    assert_eq!(last.phase, MatchPhase::Ended);
    assert_eq!(
        collected
            .statuses
            .iter()
            .filter(|s| s.phase == MatchPhase::Ended)
            .count(),
        1
    );
    assert!(collected.snapshots.iter().all(|s| s.last_status != "win"));
    assert!(!remote.abandoned.load(Ordering::SeqCst));

    let snap = state.snapshot();
    assert_eq!(snap.last_status, "win");
    assert_eq!(snap.player.nick, "tester");
    assert_eq!(snap.opponent.nick, "");
    assert!(state.player_ships().is_empty());

    // No more polling once the match is over.
    let calls = remote.status_calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(remote.status_calls.load(Ordering::SeqCst), calls);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_final_status_falls_back_to_phase_name() {
    let script = Script {
        statuses: VecDeque::from(vec![
            in_progress(),
            Ok(report(MatchPhase::Ended, false, vec![], "")),
        ]),
        ..Default::default()
    };
    let (outcome, _, _, state) = finish(start(script, fast())).await;
    assert_eq!(
        outcome,
        MatchOutcome::Ended {
            last_status: "ended".into()
        }
    );
    assert_eq!(state.last_status(), "ended");
}

#[tokio::test(flavor = "multi_thread")]
async fn abort_abandons_the_match() {
    let h = start(Script::default(), fast());
    let state = Arc::clone(&h.state);
    wait_until(|| state.snapshot().opponent.desc == "canned").await;
    h.abort.abort();
    let (outcome, collected, remote, state) = finish(h).await;

    assert_eq!(outcome, MatchOutcome::Aborted);
    assert!(remote.abandoned.load(Ordering::SeqCst));
    assert_eq!(state.last_status(), "abandoned");
    assert!(!collected.statuses.is_empty());
    assert_eq!(state.snapshot().total_shots, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn abort_while_waiting_for_start() {
    let script = Script {
        fallback: Some(Ok(report(MatchPhase::Starting, false, vec![], ""))),
        ..Default::default()
    };
    let h = start(script, fast());
    let remote = Arc::clone(&h.remote);
    wait_until(|| remote.status_calls.load(Ordering::SeqCst) >= 3).await;
    h.abort.abort();
    let (outcome, collected, remote, _) = finish(h).await;
    assert_eq!(outcome, MatchOutcome::Aborted);
    assert!(remote.abandoned.load(Ordering::SeqCst));
    assert!(collected
        .statuses
        .iter()
        .all(|s| s.phase == MatchPhase::Starting));
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_errors_are_reported_and_polling_continues() {
    let script = Script {
        statuses: VecDeque::from(vec![
            Err(RemoteError::Transport("boom".into())),
            in_progress(),
            Err(RemoteError::Transport("connection reset".into())),
            Err(RemoteError::NotFound("game".into())),
            in_progress(),
            Ok(report(MatchPhase::Ended, false, vec![], "lose")),
        ]),
        ..Default::default()
    };
    let (outcome, collected, _, _) = finish(start(script, fast())).await;
    assert_eq!(
        outcome,
        MatchOutcome::Ended {
            last_status: "lose".into()
        }
    );
    assert_eq!(collected.log.len(), 3);
    assert!(collected.log[0].contains("boom"));
    assert!(collected.log[2].contains("not found"));
}

#[tokio::test(flavor = "multi_thread")]
async fn shots_are_fired_and_already_resolved_is_swallowed() {
    let ships = request().ships;
    let mut fire = HashMap::new();
    fire.insert(c("A1"), Err(RemoteError::AlreadyResolved));
    fire.insert(c("B2"), Ok(FireOutcome::Hit));
    fire.insert(c("B3"), Ok(FireOutcome::Sunk));
    let script = Script {
        statuses: VecDeque::from(vec![Ok(report(
            MatchPhase::InProgress,
            true,
            vec![ships[0], c("J10")],
            "",
        ))]),
        fire,
        ..Default::default()
    };
    let h = start(script, fast());

    for s in ["A1", "B2", "B2", "B3", "E5"] {
        h.shots.send(c(s)).await.unwrap();
    }
    let remote = Arc::clone(&h.remote);
    wait_until(|| remote.fired().len() == 4).await;
    let state = Arc::clone(&h.state);
    wait_until(|| state.counters().0 == 3).await;

    assert_eq!(h.remote.fired(), vec![c("A1"), c("B2"), c("B3"), c("E5")]);
    let snap = h.state.snapshot();
    assert_eq!((snap.total_shots, snap.total_hits), (3, 2));
    assert_eq!(snap.ships_remaining.remaining(2), 2);
    assert_eq!(snap.opponent_board[1][1], Cell::Sunk);
    // C4 borders the sunk ship, E5 was a plain miss
    assert_eq!(snap.opponent_board[3][2], Cell::Miss);
    assert_eq!(snap.opponent_board[4][4], Cell::Miss);
    assert_eq!(snap.player_board[ships[0].y()][ships[0].x()], Cell::Hit);
    let j10 = snap.player_board[9][9];
    assert!(j10 == Cell::Miss || j10 == Cell::Hit);

    h.abort.abort();
    let (outcome, collected, _, _) = finish(h).await;
    assert_eq!(outcome, MatchOutcome::Aborted);
    assert!(collected.log.iter().all(|l| !l.contains("already")));
}

#[tokio::test(flavor = "multi_thread")]
async fn authorization_failure_denies_the_match() {
    let script = Script {
        statuses: VecDeque::from(vec![
            in_progress(),
            in_progress(),
            Err(RemoteError::Unauthorized("session expired".into())),
        ]),
        ..Default::default()
    };
    let (outcome, collected, remote, state) = finish(start(script, fast())).await;
    assert_eq!(
        outcome,
        MatchOutcome::Denied(RemoteError::Unauthorized("session expired".into()))
    );
    assert!(!remote.abandoned.load(Ordering::SeqCst));
    assert_eq!(state.last_status(), "unauthorized: session expired");
    assert!(collected.log.iter().any(|l| l.contains("session expired")));
}

#[tokio::test(flavor = "multi_thread")]
async fn start_refusals() {
    let forbidden = Script {
        start_error: Some(RemoteError::Forbidden("busy".into())),
        ..Default::default()
    };
    let (outcome, _, remote, _) = finish(start(forbidden, fast())).await;
    assert_eq!(
        outcome,
        MatchOutcome::Denied(RemoteError::Forbidden("busy".into()))
    );
    assert_eq!(remote.status_calls.load(Ordering::SeqCst), 0);

    let bad = Script {
        start_error: Some(RemoteError::BadRequest("fleet".into())),
        ..Default::default()
    };
    let h = start(bad, fast());
    let result = h.play.await.unwrap();
    assert_eq!(result, Err(RemoteError::BadRequest("fleet".into())));
}

#[test]
fn backoff_doubles_and_caps() {
    let config = SyncConfig::default();
    let ticks: Vec<u32> = (0..6).map(|n| config.backoff_ticks(n)).collect();
    assert_eq!(ticks, vec![0, 1, 2, 4, 8, 8]);
    assert_eq!(config.clone().with_max_backoff_ticks(3).backoff_ticks(5), 3);
    assert_eq!(config.with_rate_limit_backoff(false).backoff_ticks(4), 0);
}

async fn status_calls_while_rate_limited(config: SyncConfig) -> usize {
    let script = Script {
        statuses: VecDeque::from(vec![in_progress()]),
        fallback: Some(Err(RemoteError::RateLimited("slow down".into()))),
        ..Default::default()
    };
    let h = start(script, config);
    let state = Arc::clone(&h.state);
    wait_until(|| state.snapshot().opponent.desc == "canned").await;
    let before = h.remote.status_calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(300)).await;
    let calls = h.remote.status_calls.load(Ordering::SeqCst) - before;
    h.abort.abort();
    let (outcome, collected, _, _) = finish(h).await;
    assert_eq!(outcome, MatchOutcome::Aborted);
    assert!(collected.log.iter().all(|l| l.contains("rate limited")));
    calls
}

#[tokio::test(flavor = "multi_thread")]
async fn rate_limits_back_off_the_status_loop() {
    let base = SyncConfig::default()
        .with_status_interval(Duration::from_millis(10))
        .with_snapshot_interval(Duration::from_millis(10))
        .with_start_poll_interval(Duration::from_millis(10));
    let backed_off = status_calls_while_rate_limited(base.clone()).await;
    let fixed = status_calls_while_rate_limited(base.with_rate_limit_backoff(false)).await;
    assert!(
        backed_off * 2 < fixed,
        "backoff {} vs fixed {}",
        backed_off,
        fixed
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn abort_interrupts_a_slow_description() {
    let script = Script {
        description_delay: Some(Duration::from_secs(5)),
        ..Default::default()
    };
    let h = start(script, fast());
    let remote = Arc::clone(&h.remote);
    wait_until(|| remote.status_calls.load(Ordering::SeqCst) >= 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let aborted_at = Instant::now();
    h.abort.abort();
    let (outcome, _, remote, state) = finish(h).await;
    assert_eq!(outcome, MatchOutcome::Aborted);
    assert!(
        aborted_at.elapsed() < Duration::from_millis(500),
        "abort took {:?}",
        aborted_at.elapsed()
    );
    assert!(remote.abandoned.load(Ordering::SeqCst));
    assert_eq!(state.last_status(), "abandoned");
}

#[tokio::test(flavor = "multi_thread")]
async fn abort_returns_within_one_interval() {
    let interval = Duration::from_millis(50);
    let config = SyncConfig::default()
        .with_status_interval(interval)
        .with_snapshot_interval(interval)
        .with_start_poll_interval(interval);
    let h = start(Script::default(), config);
    let state = Arc::clone(&h.state);
    wait_until(|| state.snapshot().opponent.desc == "canned").await;
    tokio::time::sleep(Duration::from_millis(120)).await;

    let aborted_at = Instant::now();
    h.abort.abort();
    let (outcome, _, _, _) = finish(h).await;
    assert_eq!(outcome, MatchOutcome::Aborted);
    assert!(
        aborted_at.elapsed() < interval + Duration::from_millis(400),
        "abort took {:?}",
        aborted_at.elapsed()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn stalled_feeds_get_nothing_after_abort() {
    let remote = Scripted::new(Script::default());
    let state = Arc::new(GameState::new());
    let config = fast().with_feed_capacity(1);
    let engine = SyncEngine::new(
        remote.clone() as Arc<dyn RemoteGameService>,
        Arc::clone(&state),
        config.clone(),
    );
    // Nobody reads the feeds until the engine has stopped.
    let (tx, mut rx) = feeds(config.feed_capacity);
    let (_shots, shot_rx) = mpsc::channel(1);
    let abort = AbortHandle::new();
    let play = {
        let abort = abort.clone();
        tokio::spawn(async move { engine.play(request(), shot_rx, tx, abort).await })
    };

    wait_until(|| state.snapshot().opponent.desc == "canned").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    state.set_last_status("stalled");
    tokio::time::sleep(Duration::from_millis(20)).await;
    abort.abort();
    let outcome = tokio::time::timeout(Duration::from_secs(2), play)
        .await
        .expect("engine did not stop")
        .unwrap()
        .unwrap();
    assert_eq!(outcome, MatchOutcome::Aborted);

    let mut snapshots = Vec::new();
    while let Some(s) = rx.snapshots.recv().await {
        snapshots.push(s);
    }
    assert_eq!(snapshots.len(), 1);
    assert_ne!(snapshots[0].last_status, "stalled");
    let mut statuses = 0;
    while rx.status.recv().await.is_some() {
        statuses += 1;
    }
    assert_eq!(statuses, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn one_engine_plays_matches_back_to_back() {
    let remote = Scripted::new(Script::default());
    let state = Arc::new(GameState::new());
    let engine = Arc::new(SyncEngine::new(
        remote.clone() as Arc<dyn RemoteGameService>,
        Arc::clone(&state),
        fast(),
    ));
    let run = |shot_rx: mpsc::Receiver<Coord>| {
        let engine = Arc::clone(&engine);
        let (tx, rx) = feeds(16);
        let collected = collect(rx);
        let play = tokio::spawn(async move {
            engine
                .play(request(), shot_rx, tx, AbortHandle::new())
                .await
        });
        (play, collected)
    };
    let end_with = |last: &str| {
        remote
            .script
            .lock()
            .unwrap()
            .statuses
            .push_back(Ok(report(MatchPhase::Ended, false, vec![], last)));
    };

    let (shots, shot_rx) = mpsc::channel(1);
    let (play, collected) = run(shot_rx);
    shots.send(c("A1")).await.unwrap();
    wait_until(|| state.counters() == (1, 0)).await;
    end_with("win");
    let first = tokio::time::timeout(Duration::from_secs(5), play)
        .await
        .expect("first match did not end")
        .unwrap()
        .unwrap();
    drop(shots);
    collected.await.unwrap();
    assert_eq!(
        first,
        MatchOutcome::Ended {
            last_status: "win".into()
        }
    );
    assert_eq!(state.counters(), (0, 0));
    assert_eq!(state.last_status(), "win");
    assert_eq!(state.opponent_board().count(Cell::Miss), 0);

    let (shots, shot_rx) = mpsc::channel(1);
    let (play, collected) = run(shot_rx);
    wait_until(|| state.snapshot().opponent.desc == "canned").await;
    assert_eq!(state.player_ships().len(), request().ships.len());
    end_with("lose");
    let second = tokio::time::timeout(Duration::from_secs(5), play)
        .await
        .expect("second match did not end")
        .unwrap()
        .unwrap();
    drop(shots);
    collected.await.unwrap();
    assert_eq!(
        second,
        MatchOutcome::Ended {
            last_status: "lose".into()
        }
    );
    assert_eq!(state.counters(), (0, 0));
    assert_eq!(state.last_status(), "lose");
    assert_eq!(remote.fired(), vec![c("A1")]);
    assert!(!remote.abandoned.load(Ordering::SeqCst));
}
