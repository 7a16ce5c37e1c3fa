#![cfg(feature = "std")]

//! Plain-text terminal front end: board rendering, line input, autoplay and
//! interactive fleet placement.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::Rng;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::core::{
    pick_target, random_ship, Board, Cell, Coord, Grid, PlacementSession, BOARD_SIZE,
};
use crate::display::{CellSource, Display};
use crate::remote::{MatchPhase, StatusReport};
use crate::state::{GameState, Snapshot};

/// Width of one rendered board, row label included.
const BOARD_WIDTH: usize = 3 + 2 * BOARD_SIZE as usize;

fn glyph(cell: Cell) -> char {
    match cell {
        Cell::Empty => '.',
        Cell::Ship => 'S',
        Cell::Hit => 'X',
        Cell::Miss => 'o',
        Cell::Sunk => '#',
    }
}

/// Column header followed by one line per row.
fn grid_lines(grid: &Grid) -> Vec<String> {
    let mut lines = Vec::with_capacity(BOARD_SIZE as usize + 1);
    let mut header = String::from("  ");
    for c in 0..BOARD_SIZE {
        header.push(' ');
        header.push((b'A' + c) as char);
    }
    lines.push(header);
    for (r, row) in grid.iter().enumerate() {
        let mut line = format!("{:2}", r + 1);
        for &cell in row {
            line.push(' ');
            line.push(glyph(cell));
        }
        lines.push(line);
    }
    lines
}

/// Render a single grid, one row per line.
pub fn render_grid(grid: &Grid) -> String {
    let mut out = String::new();
    for line in grid_lines(grid) {
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Both boards side by side with the shot counters and remaining fleet.
///
/// The opponent board shows sunk cells as plain hits.
pub fn render_boards(snapshot: &Snapshot) -> String {
    let opponent_view = Board::from(snapshot.opponent_board).opponent_view();
    let left_title = format!("{} (you)", snapshot.player.nick);
    let right_title = if snapshot.opponent.nick.is_empty() {
        "Opponent".to_string()
    } else {
        snapshot.opponent.nick.clone()
    };

    let mut out = format!("{:<w$}   {}\n", left_title, right_title, w = BOARD_WIDTH);
    let left = grid_lines(&snapshot.player_board);
    let right = grid_lines(&opponent_view);
    for (l, r) in left.iter().zip(right.iter()) {
        out.push_str(&format!("{:<w$}   {}\n", l, r, w = BOARD_WIDTH));
    }
    out.push_str(&format!(
        "Shots: {}  Hits: {}  Accuracy: {:.1}%\n",
        snapshot.total_shots,
        snapshot.total_hits,
        snapshot.accuracy()
    ));
    out.push_str("Ships left:");
    for (len, count) in snapshot.ships_remaining.iter() {
        out.push_str(&format!(" {}x{}", count, len));
    }
    out.push('\n');
    out
}

/// Text [`Display`] writing to any `Write`, stdout by default.
pub struct Terminal<W> {
    out: W,
    last_snapshot: Option<Snapshot>,
    last_status: Option<(MatchPhase, bool, String)>,
    timer: u32,
}

impl Terminal<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Terminal<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            last_snapshot: None,
            last_status: None,
            timer: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, text: &str) {
        // Nothing useful to do if the terminal went away.
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
    }
}

impl<W: Write> Display for Terminal<W> {
    fn render_status(&mut self, status: &StatusReport) {
        self.timer = status.timer;
        let key = (status.phase, status.should_fire, status.last_status.clone());
        if self.last_status.as_ref() == Some(&key) {
            return;
        }
        self.last_status = Some(key);

        let line = match status.phase {
            MatchPhase::Starting => format!("Waiting for the match to start ({})\n", status.phase),
            MatchPhase::InProgress if status.should_fire => format!(
                "Your turn ({}s left). Enter a cell (e.g. B7):\n",
                status.timer
            ),
            MatchPhase::InProgress => format!("{} is aiming...\n", status.opponent),
            MatchPhase::Ended => format!("Match over: {}\n", status.last_status),
        };
        self.emit(&line);
    }

    fn render_state(&mut self, snapshot: &Snapshot) {
        if self.last_snapshot.as_ref() == Some(snapshot) {
            return;
        }
        let mut text = render_boards(snapshot);
        text.push_str(&format!("Timer: {}s\n", self.timer));
        self.emit(&text);
        self.last_snapshot = Some(snapshot.clone());
    }

    fn log(&mut self, line: &str) {
        self.emit(&format!("! {}\n", line));
    }
}

/// Line-oriented input, stdin by default.
pub struct LineInput<R> {
    lines: Lines<R>,
}

impl LineInput<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin> LineInput<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }

    /// Next line, or `None` at end of input. Cancel-safe.
    pub async fn next_line(&mut self) -> Option<String> {
        match self.lines.next_line().await {
            Ok(line) => line,
            Err(e) => {
                log::warn!("[LineInput] read failed: {}", e);
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl<R: AsyncBufRead + Unpin + Send> CellSource for LineInput<R> {
    async fn select_cell(&mut self) -> Option<Coord> {
        loop {
            let line = self.next_line().await?;
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            match text.parse::<Coord>() {
                Ok(cell) => return Some(cell),
                Err(e) => eprintln!("{}: {}", text, e),
            }
        }
    }
}

/// [`CellSource`] that picks its own shots from the live opponent board.
pub struct AutoTargeter {
    state: Arc<GameState>,
    rng: SmallRng,
    delay: Duration,
}

impl AutoTargeter {
    pub fn new(state: Arc<GameState>, rng: SmallRng, delay: Duration) -> Self {
        Self { state, rng, delay }
    }
}

#[async_trait::async_trait]
impl CellSource for AutoTargeter {
    async fn select_cell(&mut self) -> Option<Coord> {
        tokio::time::sleep(self.delay).await;
        let board = self.state.opponent_board();
        pick_target(&board, &mut self.rng)
    }
}

/// Parse one ship entry: an origin with `H`/`V` and the current length, or
/// an explicit list of cells.
pub fn parse_ship(line: &str, len: usize) -> Result<Vec<Coord>, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let parse = |t: &str| t.parse::<Coord>().map_err(|e| format!("{}: {}", t, e));
    match tokens.as_slice() {
        [] => Err("Nothing entered".to_string()),
        [origin, dir] if dir.eq_ignore_ascii_case("h") || dir.eq_ignore_ascii_case("v") => {
            let start = parse(*origin)?;
            let (dx, dy) = if dir.eq_ignore_ascii_case("h") {
                (1, 0)
            } else {
                (0, 1)
            };
            (0..len as i8)
                .map(|i| {
                    start
                        .offset(dx * i, dy * i)
                        .ok_or_else(|| "Ship runs off the board".to_string())
                })
                .collect()
        }
        cells => cells.iter().map(|t| parse(*t)).collect(),
    }
}

/// Interactive fleet placement. Rejected entries re-prompt for the same
/// ship; an empty line places it at random.
pub async fn place_fleet<R, W, G>(
    input: &mut LineInput<R>,
    out: &mut W,
    rng: &mut G,
) -> anyhow::Result<Vec<Coord>>
where
    R: AsyncBufRead + Unpin,
    W: Write,
    G: Rng,
{
    writeln!(
        out,
        "Place your fleet. Enter a cell and H or V (e.g. A5 H), the cells \
         themselves (e.g. A5 B5), or an empty line for a random spot."
    )?;
    let mut session = PlacementSession::new();
    while let Some(len) = session.next_length() {
        write!(out, "{}", render_grid(&session.board().grid()))?;
        write!(
            out,
            "Ship of length {} ({} to place): ",
            len,
            session.pool().remaining(len)
        )?;
        out.flush()?;

        let line = input
            .next_line()
            .await
            .ok_or_else(|| anyhow::anyhow!("input closed during placement"))?;
        let cells = if line.trim().is_empty() {
            match random_ship(rng, session.board(), len) {
                Some(cells) => cells,
                None => {
                    writeln!(out, "No room left for a ship of length {}, starting over.", len)?;
                    session = PlacementSession::new();
                    continue;
                }
            }
        } else {
            match parse_ship(&line, len) {
                Ok(cells) => cells,
                Err(msg) => {
                    writeln!(out, "{}", msg)?;
                    continue;
                }
            }
        };
        if let Err(e) = session.propose(&cells) {
            writeln!(out, "Rejected: {}", e)?;
        }
    }
    write!(out, "{}", render_grid(&session.board().grid()))?;
    Ok(session.ships())
}
