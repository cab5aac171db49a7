// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! pingpongd: plays one pingpong game and exposes its control socket.
//!
//! ```text
//! pingpongd <rounds> <players> [--socket PATH] [--stats-dir DIR] ...
//! ```
//!
//! Exits 0 when Root completes every round, 1 otherwise.

mod control;
mod signals;

use anyhow::{Context, Result};
use clap::Parser;
use pingpong_app_core::{prefs::HOST_PREFS_KEY, ConfigService, ConfigStore, HostPrefs};
use pingpong_config_fs::FsConfigStore;
use pingpong_core::{ChannelRegistry, FsStatsStore, Game, GameConfig, GameReport};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pingpongd", version, about = "Pass a ball down a chain and back")]
struct Args {
    /// Round trips Root waits for.
    rounds: String,
    /// Participants in the chain, Root included.
    players: String,
    /// Control socket path (overrides prefs).
    #[arg(long)]
    socket: Option<PathBuf>,
    /// Directory for Stats Block records (overrides prefs).
    #[arg(long)]
    stats_dir: Option<PathBuf>,
    /// Idle poll backoff in milliseconds (overrides prefs).
    #[arg(long)]
    poll_ms: Option<u64>,
    /// Per-channel queue capacity (overrides prefs).
    #[arg(long)]
    capacity: Option<usize>,
    /// Token shared by every channel key (overrides prefs).
    #[arg(long)]
    path_token: Option<String>,
    /// Seed for discriminator selection.
    #[arg(long)]
    seed: Option<u64>,
    /// Wait for SIGUSR1 or an inject request instead of serving the first ball.
    #[arg(long)]
    no_serve: bool,
}

/// Effective settings after prefs and flags are merged.
#[derive(Debug)]
struct Settings {
    game: GameConfig,
    socket: PathBuf,
    stats_dir: PathBuf,
}

impl Settings {
    fn resolve(args: &Args, prefs: &HostPrefs) -> Result<Self> {
        let mut game = GameConfig::from_args(&args.rounds, &args.players)
            .context("invalid rounds/players")?
            .with_poll_interval(Duration::from_millis(args.poll_ms.unwrap_or(prefs.poll_interval_ms)))
            .with_channel_capacity(args.capacity.unwrap_or(prefs.channel_capacity))
            .with_path_token(args.path_token.clone().unwrap_or_else(|| prefs.path_token.clone()))
            .with_serve_on_start(!args.no_serve);
        if let Some(seed) = args.seed {
            game = game.with_seed(seed);
        }
        game.validate().context("invalid game configuration")?;
        Ok(Self {
            game,
            socket: args.socket.clone().unwrap_or_else(|| PathBuf::from(&prefs.socket_path)),
            stats_dir: args.stats_dir.clone().unwrap_or_else(|| PathBuf::from(&prefs.stats_dir)),
        })
    }
}

/// Prefs are best-effort: any failure falls back to defaults.
fn load_prefs() -> HostPrefs {
    let service = match FsConfigStore::new() {
        Ok(store) => ConfigService::new(store),
        Err(err) => {
            warn!(%err, "config store unavailable, using default prefs");
            return HostPrefs::default();
        }
    };
    prefs_from(&service)
}

fn prefs_from<S: ConfigStore>(service: &ConfigService<S>) -> HostPrefs {
    let (prefs, err) = service.load_or_init::<HostPrefs>(HOST_PREFS_KEY);
    if let Some(err) = err {
        warn!(%err, "could not load or persist prefs");
    }
    prefs
}

fn bind_control_socket(path: &Path) -> Result<UnixListener> {
    // Stale socket from a previous run.
    let _ = std::fs::remove_file(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    UnixListener::bind(path).with_context(|| format!("bind control socket {}", path.display()))
}

async fn run(args: Args) -> Result<GameReport> {
    let prefs = load_prefs();
    let settings = Settings::resolve(&args, &prefs)?;

    let stats = FsStatsStore::new(&settings.stats_dir)
        .with_context(|| format!("open stats dir {}", settings.stats_dir.display()))?;
    let registry = ChannelRegistry::new(settings.game.channel_capacity);
    let game = Game::launch(settings.game.clone(), registry, Arc::new(stats)).context("launch game")?;
    let controls = game.controls();
    info!(
        rounds = settings.game.total_rounds,
        players = settings.game.participant_count,
        stats_dir = %settings.stats_dir.display(),
        "game running"
    );

    let server = match bind_control_socket(&settings.socket) {
        Ok(listener) => {
            info!(socket = %settings.socket.display(), "control socket listening");
            let controls = controls.clone();
            Some(tokio::spawn(async move {
                if let Err(err) = control::serve(listener, controls).await {
                    warn!(?err, "control socket stopped");
                }
            }))
        }
        Err(err) => {
            warn!(?err, "control socket disabled");
            None
        }
    };
    let bridge = tokio::spawn(async move {
        if let Err(err) = signals::bridge(controls).await {
            warn!(?err, "signal bridge stopped");
        }
    });

    let result = game.wait().await;

    bridge.abort();
    if let Some(server) = server {
        server.abort();
        let _ = std::fs::remove_file(&settings.socket);
    }
    Ok(result?)
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    match run(args).await {
        Ok(report) => {
            for (id, stats) in &report.stats {
                match stats {
                    Some(stats) => info!(participant = %id, "{stats}"),
                    None => warn!(participant = %id, "no stats published"),
                }
            }
            info!(rounds = report.rounds, "game complete");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("pingpongd failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}
