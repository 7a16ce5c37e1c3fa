use std::sync::Arc;
use std::time::Duration;

use rand::{rngs::SmallRng, SeedableRng};
use serde_json::json;
use tokio::sync::mpsc;
use warships::{
    feeds, present, random_fleet, AbortHandle, AutoTargeter, Display, GameState, LocalAuthority,
    MatchOutcome, RemoteGameService, Snapshot, StartRequest, StatusReport, SyncConfig, SyncEngine,
};

/// Keeps the last snapshot and counts events instead of drawing anything.
#[derive(Default)]
struct Recorder {
    statuses: usize,
    snapshots: usize,
    errors: Vec<String>,
    last: Option<Snapshot>,
}

impl Display for Recorder {
    fn render_status(&mut self, _status: &StatusReport) {
        self.statuses += 1;
    }

    fn render_state(&mut self, snapshot: &Snapshot) {
        self.snapshots += 1;
        self.last = Some(snapshot.clone());
    }

    fn log(&mut self, line: &str) {
        self.errors.push(line.to_string());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        eprintln!("Usage: {} <bot-seed> <player-seed>", args[0]);
        std::process::exit(1);
    }
    let bot_seed: u64 = args[1].parse()?;
    let player_seed: u64 = args[2].parse()?;

    let mut rng = SmallRng::seed_from_u64(player_seed);
    let request = StartRequest {
        nick: "sim".to_string(),
        desc: "autoplay".to_string(),
        target_nick: None,
        ships: random_fleet(&mut rng)?,
        vs_bot: true,
    };

    let remote: Arc<dyn RemoteGameService> = Arc::new(LocalAuthority::new(Some(bot_seed)));
    let state = Arc::new(GameState::new());
    let config = SyncConfig::default()
        .with_status_interval(Duration::from_millis(5))
        .with_snapshot_interval(Duration::from_millis(5))
        .with_start_poll_interval(Duration::from_millis(5));
    let engine = SyncEngine::new(Arc::clone(&remote), Arc::clone(&state), config.clone());

    let (feed_tx, feed_rx) = feeds(config.feed_capacity);
    let (shot_tx, shot_rx) = mpsc::channel(4);
    let mut targeter = AutoTargeter::new(
        Arc::clone(&state),
        SmallRng::from_rng(&mut rng),
        Duration::from_millis(1),
    );
    let mut recorder = Recorder::default();

    let (outcome, ()) = tokio::join!(
        engine.play(request, shot_rx, feed_tx, AbortHandle::new()),
        present(&mut recorder, &mut targeter, feed_rx, shot_tx),
    );

    let result = match outcome? {
        MatchOutcome::Ended { last_status } => last_status,
        MatchOutcome::Aborted => "aborted".to_string(),
        MatchOutcome::Denied(e) => format!("denied: {}", e),
    };
    let (shots, hits, accuracy) = recorder
        .last
        .as_ref()
        .map(|s| (s.total_shots, s.total_hits, s.accuracy()))
        .unwrap_or((0, 0, 0.0));
    let stats = remote.stats(Some("sim".to_string())).await.unwrap_or_default();

    let summary = json!({
        "result": result,
        "shots": shots,
        "hits": hits,
        "accuracy": accuracy,
        "status_events": recorder.statuses,
        "snapshot_events": recorder.snapshots,
        "errors": recorder.errors,
        "games_recorded": stats.first().map(|s| s.games).unwrap_or(0),
    });

    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}
