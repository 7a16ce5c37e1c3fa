use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc;
use warships::remote::MatchPhase;
use warships::{
    feeds, present, CellSource, Coord, Display, GameState, Snapshot, StatusReport,
};

fn status(phase: MatchPhase, should_fire: bool) -> StatusReport {
    StatusReport {
        phase,
        last_status: String::new(),
        nick: "me".into(),
        opponent: "them".into(),
        opponent_shots: vec![],
        should_fire,
        timer: 30,
    }
}

#[derive(Default)]
struct Recorder {
    events: Vec<String>,
}

impl Display for Recorder {
    fn render_status(&mut self, status: &StatusReport) {
        self.events
            .push(format!("status {} {}", status.phase, status.should_fire));
    }

    fn render_state(&mut self, snapshot: &Snapshot) {
        self.events.push(format!("state {}", snapshot.total_shots));
    }

    fn log(&mut self, line: &str) {
        self.events.push(format!("log {}", line));
    }
}

/// Hands out queued cells and counts how often it was asked.
struct Queued {
    cells: VecDeque<Coord>,
    asked: usize,
}

impl Queued {
    fn new(cells: &[&str]) -> Self {
        Self {
            cells: cells.iter().map(|c| c.parse().unwrap()).collect(),
            asked: 0,
        }
    }
}

#[async_trait::async_trait]
impl CellSource for Queued {
    async fn select_cell(&mut self) -> Option<Coord> {
        self.asked += 1;
        self.cells.pop_front()
    }
}

#[tokio::test]
async fn renders_in_order_and_returns_when_feeds_close() {
    let (tx, rx) = feeds(8);
    let (shot_tx, mut shot_rx) = mpsc::channel(4);
    let snapshot = GameState::new().snapshot();

    tx.status.send(status(MatchPhase::Starting, false)).await.unwrap();
    tx.log.send("error: transport: down".into()).unwrap();
    tx.snapshots.send(snapshot).await.unwrap();
    drop(tx);

    let mut display = Recorder::default();
    let mut input = Queued::new(&["A1"]);
    tokio::time::timeout(
        Duration::from_secs(2),
        present(&mut display, &mut input, rx, shot_tx),
    )
    .await
    .expect("presenter did not return");

    assert_eq!(
        display.events,
        vec!["status waiting false", "log error: transport: down", "state 0"]
    );
    assert_eq!(input.asked, 0);
    assert!(shot_rx.recv().await.is_none());
}

#[tokio::test]
async fn one_shot_per_turn_status() {
    let (tx, rx) = feeds(8);
    let (shot_tx, mut shot_rx) = mpsc::channel(4);
    let mut display = Recorder::default();
    let mut input = Queued::new(&["A1", "B2", "C3"]);

    let driver = async move {
        let mut fired = Vec::new();
        tx.status.send(status(MatchPhase::InProgress, true)).await.unwrap();
        fired.push(shot_rx.recv().await.unwrap());
        // Nothing more until the next turn status arrives.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(shot_rx.try_recv().is_err());

        tx.status.send(status(MatchPhase::InProgress, false)).await.unwrap();
        tx.status.send(status(MatchPhase::InProgress, true)).await.unwrap();
        fired.push(shot_rx.recv().await.unwrap());
        drop(tx);
        fired
    };

    let (fired, ()) = tokio::time::timeout(Duration::from_secs(2), async {
        tokio::join!(driver, present(&mut display, &mut input, rx, shot_tx))
    })
    .await
    .expect("presenter did not return");

    let expected: Vec<Coord> = vec!["A1".parse().unwrap(), "B2".parse().unwrap()];
    assert_eq!(fired, expected);
    assert_eq!(input.asked, 2);
}

#[tokio::test]
async fn exhausted_input_stops_asking() {
    let (tx, rx) = feeds(8);
    let (shot_tx, _shot_rx) = mpsc::channel(4);
    let mut display = Recorder::default();
    let mut input = Queued::new(&[]);

    let driver = async move {
        tx.status.send(status(MatchPhase::InProgress, true)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.status.send(status(MatchPhase::InProgress, true)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(tx);
    };

    tokio::time::timeout(Duration::from_secs(2), async {
        tokio::join!(driver, present(&mut display, &mut input, rx, shot_tx))
    })
    .await
    .expect("presenter did not return");

    assert_eq!(input.asked, 1);
    assert_eq!(display.events.len(), 2);
}
