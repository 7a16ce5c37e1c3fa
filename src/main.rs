#[cfg(not(feature = "std"))]
fn main() {}

#[cfg(feature = "std")]
use std::sync::Arc;

#[cfg(feature = "std")]
use clap::{Args, Parser};
#[cfg(feature = "std")]
use rand::rngs::SmallRng;
#[cfg(feature = "std")]
use rand::SeedableRng;
#[cfg(feature = "std")]
use tokio::net::TcpListener;
#[cfg(feature = "std")]
use tokio::sync::mpsc;
#[cfg(feature = "std")]
use tokio::time::Duration;
#[cfg(feature = "std")]
use warships::{
    feeds, init_logging, place_fleet, present, random_fleet, serve, AbortHandle, AutoTargeter,
    CellSource, GameState, LineInput, LocalAuthority, MatchOutcome, RemoteGameService,
    StartRequest, SyncConfig, SyncEngine, TcpRemote, Terminal,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[cfg(feature = "std")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Engine tuning shared by the commands that play a match.
#[derive(Args, Clone, Debug)]
#[cfg(feature = "std")]
struct SyncArgs {
    #[arg(long, default_value_t = 500, help = "Status poll interval in milliseconds")]
    status_ms: u64,
    #[arg(long, default_value_t = 100, help = "Board refresh interval in milliseconds")]
    snapshot_ms: u64,
    #[arg(long, help = "Keep polling at full rate when rate limited")]
    no_backoff: bool,
}

#[cfg(feature = "std")]
impl SyncArgs {
    fn config(&self) -> SyncConfig {
        SyncConfig::default()
            .with_status_interval(Duration::from_millis(self.status_ms.max(1)))
            .with_snapshot_interval(Duration::from_millis(self.snapshot_ms.max(1)))
            .with_rate_limit_backoff(!self.no_backoff)
    }
}

/// How the player's side of a match is driven.
#[derive(Args, Clone, Debug)]
#[cfg(feature = "std")]
struct PlayArgs {
    #[arg(long, default_value = "player")]
    nick: String,
    #[arg(long, default_value = "")]
    desc: String,
    #[arg(long, help = "Let the client pick every shot")]
    autoplay: bool,
    #[arg(long, help = "Skip interactive placement and use a random fleet")]
    random_fleet: bool,
}

#[derive(Parser)]
#[cfg(feature = "std")]
enum Commands {
    /// Play against a bot running in this process.
    Local {
        #[command(flatten)]
        play: PlayArgs,
        #[arg(long, help = "Fix RNG seed for reproducible games (e.g., --seed 12345)")]
        seed: Option<u64>,
        #[command(flatten)]
        sync: SyncArgs,
    },
    /// Host bot matches for remote clients.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
        #[arg(long, help = "Fix RNG seed for reproducible games (e.g., --seed 12345)")]
        seed: Option<u64>,
    },
    /// Play against a hosted authority.
    Connect {
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: String,
        #[command(flatten)]
        play: PlayArgs,
        #[arg(long, help = "Challenge a specific player instead of the bot")]
        target: Option<String>,
        #[command(flatten)]
        sync: SyncArgs,
    },
    /// List players waiting for a match.
    Lobby {
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: String,
    },
    /// Show player statistics.
    Stats {
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: String,
        #[arg(long, help = "Only show this player")]
        nick: Option<String>,
    },
}

#[cfg(feature = "std")]
fn seeded_rng(seed: Option<u64>) -> SmallRng {
    match seed {
        Some(s) => SmallRng::seed_from_u64(s),
        None => {
            let mut seed_rng = rand::rng();
            SmallRng::from_rng(&mut seed_rng)
        }
    }
}

#[cfg(feature = "std")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Local { play, seed, sync } => {
            if let Some(s) = seed {
                println!("Using fixed seed: {} (game will be reproducible)", s);
            }
            let remote: Arc<dyn RemoteGameService> = Arc::new(LocalAuthority::new(seed));
            let request = StartRequest {
                nick: play.nick.clone(),
                desc: play.desc.clone(),
                target_nick: None,
                ships: Vec::new(),
                vs_bot: true,
            };
            let rng = seeded_rng(seed.map(|s| s.wrapping_add(1)));
            run_match(remote, request, &play, rng, sync.config()).await?;
        }
        Commands::Serve { bind, seed } => {
            let listener = TcpListener::bind(&bind).await?;
            println!("Hosting bot matches on {}", bind);
            tokio::select! {
                res = serve(listener, seed) => res?,
                _ = tokio::signal::ctrl_c() => println!("Shutting down."),
            }
        }
        Commands::Connect {
            addr,
            play,
            target,
            sync,
        } => {
            let config = sync.config();
            println!("Connecting to {}...", addr);
            let remote: Arc<dyn RemoteGameService> = Arc::new(
                TcpRemote::connect_with_timeout(addr.as_str(), config.remote_timeout).await?,
            );
            let request = StartRequest {
                nick: play.nick.clone(),
                desc: play.desc.clone(),
                vs_bot: target.is_none(),
                target_nick: target,
                ships: Vec::new(),
            };
            run_match(remote, request, &play, seeded_rng(None), config).await?;
        }
        Commands::Lobby { addr } => {
            let remote = TcpRemote::connect(addr.as_str()).await?;
            let players = remote.lobby().await?;
            if players.is_empty() {
                println!("Nobody is waiting.");
            }
            for p in players {
                println!("{} ({})", p.nick, p.status);
            }
        }
        Commands::Stats { addr, nick } => {
            let remote = TcpRemote::connect(addr.as_str()).await?;
            for entry in remote.stats(nick).await? {
                println!("{}", entry);
            }
        }
    }
    Ok(())
}

/// Place a fleet, then play one match with the terminal attached.
#[cfg(feature = "std")]
async fn run_match(
    remote: Arc<dyn RemoteGameService>,
    mut request: StartRequest,
    play: &PlayArgs,
    mut rng: SmallRng,
    config: SyncConfig,
) -> anyhow::Result<()> {
    let mut lines = LineInput::stdin();
    request.ships = if play.random_fleet || play.autoplay {
        random_fleet(&mut rng)?
    } else {
        place_fleet(&mut lines, &mut std::io::stdout(), &mut rng).await?
    };

    let state = Arc::new(GameState::new());
    let engine = SyncEngine::new(remote, Arc::clone(&state), config.clone());
    let (feed_tx, feed_rx) = feeds(config.feed_capacity);
    let (shot_tx, shot_rx) = mpsc::channel(4);
    let abort = AbortHandle::new();
    let ctrl_c = {
        let abort = abort.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!("\nAbandoning match...");
                abort.abort();
            }
        })
    };

    let mut input: Box<dyn CellSource> = if play.autoplay {
        Box::new(AutoTargeter::new(
            Arc::clone(&state),
            SmallRng::from_rng(&mut rng),
            Duration::from_millis(150),
        ))
    } else {
        Box::new(lines)
    };
    let mut display = Terminal::stdout();
    let (outcome, ()) = tokio::join!(
        engine.play(request, shot_rx, feed_tx, abort),
        present(&mut display, input.as_mut(), feed_rx, shot_tx),
    );
    ctrl_c.abort();

    match outcome? {
        MatchOutcome::Ended { last_status } => println!("Match over: {}", last_status),
        MatchOutcome::Aborted => println!("Match abandoned."),
        MatchOutcome::Denied(e) => println!("Match refused: {}", e),
    }
    Ok(())
}
