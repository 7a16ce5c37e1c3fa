//! In-process game authority playing a bot opponent.
//!
//! Adjudicates shots and runs the bot's turns. Finished games and waiting
//! players live in a [`PlayerRegistry`], which several authorities can share.
//! Used for offline play, by the TCP server, and in tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::core::{
    mark_sunk, pick_target, random_fleet, ship_extent, validate_fleet, Board, Cell, Coord,
    FireOutcome,
};
use crate::remote::{
    BoardLayout, Description, LobbyPlayer, MatchPhase, PlayerStats, RemoteError,
    RemoteGameService, SessionToken, StartRequest, StatusReport,
};

/// Points awarded per win in the stats table.
const POINTS_PER_WIN: u32 = 10;

/// Tunables for the bot authority.
#[derive(Debug, Clone)]
pub struct AuthorityConfig {
    /// Status polls answered with `Starting` before the match begins.
    pub warmup_polls: u32,
    /// Seconds reported by the turn timer.
    pub turn_seconds: u32,
    pub bot_nick: String,
    pub bot_desc: String,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            warmup_polls: 2,
            turn_seconds: 60,
            bot_nick: "WP_Bot".to_string(),
            bot_desc: "Automated opponent".to_string(),
        }
    }
}

#[derive(Debug)]
struct Session {
    nick: String,
    desc: String,
    player_fleet: Board,
    bot_fleet: Board,
    /// What the bot has learned about the player's fleet.
    bot_view: Board,
    phase: MatchPhase,
    warmup: u32,
    player_turn: bool,
    turn_started: Instant,
    pending_shots: Vec<Coord>,
    last_status: String,
}

#[derive(Debug, Default, Clone, Copy)]
struct Record {
    games: u32,
    wins: u32,
}

#[derive(Debug, Default)]
struct Players {
    records: BTreeMap<String, Record>,
    /// Nick of each authority whose match is still starting, by authority id.
    waiting: BTreeMap<u64, String>,
    next_id: u64,
}

/// Lobby and stats shared by every authority a server hosts.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: Mutex<Players>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Players> {
        self.players.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self) -> u64 {
        let mut players = self.lock();
        players.next_id += 1;
        players.next_id
    }

    fn set_waiting(&self, id: u64, nick: Option<&str>) {
        let mut players = self.lock();
        match nick {
            Some(nick) => {
                players.waiting.insert(id, nick.to_string());
            }
            None => {
                players.waiting.remove(&id);
            }
        }
    }

    fn record(&self, nick: &str, won: bool) {
        let mut players = self.lock();
        let record = players.records.entry(nick.to_string()).or_default();
        record.games += 1;
        if won {
            record.wins += 1;
        }
    }

    /// Players whose match is still starting.
    pub fn lobby(&self) -> Vec<LobbyPlayer> {
        self.lock()
            .waiting
            .values()
            .map(|nick| LobbyPlayer {
                nick: nick.clone(),
                status: MatchPhase::Starting.to_string(),
            })
            .collect()
    }

    /// Ranked table of finished games, optionally narrowed to one nick.
    pub fn stats(&self, nick: Option<&str>) -> Result<Vec<PlayerStats>, RemoteError> {
        let mut table: Vec<PlayerStats> = self
            .lock()
            .records
            .iter()
            .map(|(name, r)| PlayerStats {
                nick: name.clone(),
                games: r.games,
                wins: r.wins,
                points: r.wins * POINTS_PER_WIN,
                rank: 0,
            })
            .collect();
        table.sort_by(|a, b| b.wins.cmp(&a.wins).then_with(|| a.nick.cmp(&b.nick)));
        for (i, entry) in table.iter_mut().enumerate() {
            entry.rank = i as u32 + 1;
        }
        match nick {
            Some(n) => {
                table.retain(|s| s.nick == n);
                if table.is_empty() {
                    return Err(RemoteError::NotFound(format!("no stats for {}", n)));
                }
                Ok(table)
            }
            None => Ok(table),
        }
    }
}

struct Inner {
    rng: SmallRng,
    session: Option<Session>,
}

/// Bot opponent implementing [`RemoteGameService`] without any network.
pub struct LocalAuthority {
    config: AuthorityConfig,
    registry: Arc<PlayerRegistry>,
    id: u64,
    inner: Mutex<Inner>,
}

/// Apply a shot to an authoritative fleet board.
fn resolve_shot(fleet: &mut Board, c: Coord) -> Result<FireOutcome, RemoteError> {
    if fleet.get(c).is_resolved() {
        return Err(RemoteError::AlreadyResolved);
    }
    if fleet.mark_at_player(c) == Cell::Miss {
        return Ok(FireOutcome::Miss);
    }
    let ship = ship_extent(fleet, c, |m| matches!(m, Cell::Ship | Cell::Hit | Cell::Sunk));
    if ship.iter().any(|&p| fleet.get(p) == Cell::Ship) {
        return Ok(FireOutcome::Hit);
    }
    for p in ship {
        fleet.mark_at_opponent(p, Cell::Sunk);
    }
    Ok(FireOutcome::Sunk)
}

fn fleet_destroyed(fleet: &Board) -> bool {
    fleet.count(Cell::Ship) == 0
}

impl LocalAuthority {
    /// Authority with default settings; `seed` fixes the bot's fleet and shots.
    pub fn new(seed: Option<u64>) -> Self {
        Self::with_config(seed, AuthorityConfig::default())
    }

    pub fn with_config(seed: Option<u64>, config: AuthorityConfig) -> Self {
        Self::with_registry(seed, config, Arc::new(PlayerRegistry::new()))
    }

    /// Authority that reports its players into a shared `registry`.
    pub fn with_registry(
        seed: Option<u64>,
        config: AuthorityConfig,
        registry: Arc<PlayerRegistry>,
    ) -> Self {
        let rng = match seed {
            Some(s) => SmallRng::seed_from_u64(s),
            None => SmallRng::from_rng(&mut rand::rng()),
        };
        let id = registry.register();
        Self {
            config,
            registry,
            id,
            inner: Mutex::new(Inner { rng, session: None }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self, session: &mut Session, status: &str) {
        session.phase = MatchPhase::Ended;
        session.player_turn = false;
        session.last_status = status.to_string();
        self.registry.set_waiting(self.id, None);
        self.registry.record(&session.nick, status == "win");
        log::info!("[LocalAuthority] match for {} ended: {}", session.nick, status);
    }

    /// Bot keeps firing until it misses or sinks the whole fleet.
    fn bot_turn(&self, rng: &mut SmallRng, session: &mut Session) {
        while let Some(target) = pick_target(&session.bot_view, rng) {
            let outcome = match resolve_shot(&mut session.player_fleet, target) {
                Ok(outcome) => outcome,
                Err(_) => {
                    // bot_view and the fleet disagree; trust the fleet
                    let actual = session.player_fleet.get(target);
                    session.bot_view.mark_at_opponent(target, actual.opponent_facing());
                    continue;
                }
            };
            session.pending_shots.push(target);
            match outcome {
                FireOutcome::Miss => {
                    session.bot_view.mark_at_opponent(target, Cell::Miss);
                    break;
                }
                FireOutcome::Hit => session.bot_view.mark_at_opponent(target, Cell::Hit),
                FireOutcome::Sunk => {
                    mark_sunk(&mut session.bot_view, target);
                }
            }
            if fleet_destroyed(&session.player_fleet) {
                self.finish(session, "lose");
                return;
            }
        }
        session.player_turn = true;
        session.turn_started = Instant::now();
    }

    fn session_mut(inner: &mut Inner) -> Result<&mut Session, RemoteError> {
        inner
            .session
            .as_mut()
            .ok_or_else(|| RemoteError::Unauthorized("no active session".to_string()))
    }
}

#[async_trait::async_trait]
impl RemoteGameService for LocalAuthority {
    async fn start_match(&self, request: StartRequest) -> Result<SessionToken, RemoteError> {
        if !request.vs_bot {
            return Err(RemoteError::Forbidden(
                "only bot matches are hosted here".to_string(),
            ));
        }
        validate_fleet(&request.ships).map_err(|e| RemoteError::BadRequest(e.to_string()))?;

        let mut inner = self.lock();
        if matches!(&inner.session, Some(s) if s.phase != MatchPhase::Ended) {
            return Err(RemoteError::Forbidden("match already running".to_string()));
        }
        let bot_ships = random_fleet(&mut inner.rng)
            .map_err(|e| RemoteError::Transport(format!("bot placement failed: {}", e)))?;
        let token = format!("{:016x}", inner.rng.random::<u64>());
        self.registry.set_waiting(self.id, Some(&request.nick));
        inner.session = Some(Session {
            nick: request.nick,
            desc: request.desc,
            player_fleet: Board::from_ships(&request.ships),
            bot_fleet: Board::from_ships(&bot_ships),
            bot_view: Board::new(),
            phase: MatchPhase::Starting,
            warmup: self.config.warmup_polls,
            player_turn: true,
            turn_started: Instant::now(),
            pending_shots: Vec::new(),
            last_status: String::new(),
        });
        log::debug!("[LocalAuthority] session {} started", token);
        Ok(SessionToken(token))
    }

    async fn status(&self) -> Result<StatusReport, RemoteError> {
        let mut inner = self.lock();
        let session = Self::session_mut(&mut inner)?;
        if session.phase == MatchPhase::Starting {
            if session.warmup == 0 {
                session.phase = MatchPhase::InProgress;
                session.turn_started = Instant::now();
                self.registry.set_waiting(self.id, None);
            } else {
                session.warmup -= 1;
            }
        }
        let elapsed = session.turn_started.elapsed().as_secs() as u32;
        Ok(StatusReport {
            phase: session.phase,
            last_status: session.last_status.clone(),
            nick: session.nick.clone(),
            opponent: self.config.bot_nick.clone(),
            opponent_shots: std::mem::take(&mut session.pending_shots),
            should_fire: session.phase == MatchPhase::InProgress && session.player_turn,
            timer: self.config.turn_seconds.saturating_sub(elapsed),
        })
    }

    async fn board(&self) -> Result<BoardLayout, RemoteError> {
        let mut inner = self.lock();
        let session = Self::session_mut(&mut inner)?;
        Ok(BoardLayout {
            ships: session
                .player_fleet
                .cells_matching(|c| matches!(c, Cell::Ship | Cell::Hit | Cell::Sunk)),
        })
    }

    async fn fire(&self, coord: Coord) -> Result<FireOutcome, RemoteError> {
        let mut guard = self.lock();
        let Inner { rng, session } = &mut *guard;
        let session = session
            .as_mut()
            .ok_or_else(|| RemoteError::Unauthorized("no active session".to_string()))?;
        if session.phase != MatchPhase::InProgress {
            return Err(RemoteError::BadRequest("match is not in progress".to_string()));
        }
        if !session.player_turn {
            return Err(RemoteError::BadRequest("not your turn".to_string()));
        }

        let outcome = resolve_shot(&mut session.bot_fleet, coord)?;
        if fleet_destroyed(&session.bot_fleet) {
            self.finish(session, "win");
        } else if outcome == FireOutcome::Miss {
            session.player_turn = false;
            self.bot_turn(rng, session);
        }
        Ok(outcome)
    }

    async fn abandon(&self) -> Result<(), RemoteError> {
        let mut guard = self.lock();
        let session = guard
            .session
            .as_mut()
            .ok_or_else(|| RemoteError::Unauthorized("no active session".to_string()))?;
        if session.phase == MatchPhase::Ended {
            return Err(RemoteError::BadRequest("match already over".to_string()));
        }
        self.finish(session, "abandoned");
        Ok(())
    }

    async fn description(&self) -> Result<Description, RemoteError> {
        let mut inner = self.lock();
        let session = Self::session_mut(&mut inner)?;
        Ok(Description {
            nick: session.nick.clone(),
            desc: session.desc.clone(),
            opponent: self.config.bot_nick.clone(),
            opponent_desc: self.config.bot_desc.clone(),
        })
    }

    async fn lobby(&self) -> Result<Vec<LobbyPlayer>, RemoteError> {
        Ok(self.registry.lobby())
    }

    async fn stats(&self, nick: Option<String>) -> Result<Vec<PlayerStats>, RemoteError> {
        self.registry.stats(nick.as_deref())
    }
}

impl Drop for LocalAuthority {
    fn drop(&mut self) {
        self.registry.set_waiting(self.id, None);
    }
}
