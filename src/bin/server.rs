use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use dog_walk_server::config;
use dog_walk_server::constants::{DEFAULT_DB_POOL_SIZE, SERVER_PORT};
use dog_walk_server::db::RecordsDb;
use dog_walk_server::server_api::{build_router, persist_retirees, AppContext};
use dog_walk_server::state_store;
use dog_walk_server::types::{GameMode, SpawnMode};
use tokio::sync::Mutex;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Map catalog to load
    #[arg(long = "config-file", value_name = "file")]
    config_file: PathBuf,

    /// Static files root
    #[arg(long = "www-root", value_name = "dir")]
    www_root: PathBuf,

    /// Simulation tick period; omitted means TEST mode (ticks come from
    /// the API)
    #[arg(long = "tick-period", value_name = "milliseconds")]
    tick_period: Option<u64>,

    /// Spawn dogs at random road points instead of the first road start
    #[arg(long = "randomize-spawn-points")]
    randomize_spawn_points: bool,

    /// Checkpoint file; restored at startup when present, written at
    /// shutdown
    #[arg(long = "state-file", value_name = "file")]
    state_file: Option<PathBuf>,

    /// Periodic checkpoint interval; effective only together with
    /// --state-file
    #[arg(long = "save-state-period", value_name = "milliseconds")]
    save_state_period: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let db_url = std::env::var("GAME_DB_URL")
        .context("GAME_DB_URL environment variable is not set")?;

    let mut game = config::load_game(&args.config_file)
        .with_context(|| format!("failed to load config {}", args.config_file.display()))?;

    if let Some(state_file) = &args.state_file {
        game.set_save_file(state_file.clone());
        if state_file.exists() {
            state_store::load_state(&mut game, state_file)
                .with_context(|| format!("failed to restore state {}", state_file.display()))?;
        }
        if let Some(period) = args.save_state_period {
            game.set_save_period(period);
        }
    }

    game.set_spawn_mode(if args.randomize_spawn_points {
        SpawnMode::Random
    } else {
        SpawnMode::Fix
    });

    match args.tick_period {
        Some(_) => {
            game.set_mode(GameMode::Normal);
            game.mark_started();
        }
        None => game.set_mode(GameMode::Test),
    }

    let db = RecordsDb::connect_lazy(&db_url, DEFAULT_DB_POOL_SIZE)
        .context("failed to build the records pool")?;
    db.initialize()
        .await
        .context("failed to initialize the records schema")?;

    let ctx = AppContext {
        game: Arc::new(Mutex::new(game)),
        db,
    };

    if let Some(period) = args.tick_period {
        start_tick_loop(ctx.clone(), period);
    }

    let app = build_router(ctx.clone(), &args.www_root);
    let bind_addr = format!("0.0.0.0:{SERVER_PORT}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    log::info!("server started on :{SERVER_PORT}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server runtime failed")?;

    if args.state_file.is_some() {
        let game = ctx.game.lock().await;
        game.save_state()
            .context("failed to save state on shutdown")?;
    }

    log::info!("server exited");
    Ok(())
}

/// NORMAL-mode driver: one update per period with the measured elapsed
/// delta, so a delayed wakeup does not slow the simulation down.
fn start_tick_loop(ctx: AppContext, period_ms: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(period_ms.max(1)));
        let mut last_tick = Instant::now();
        loop {
            interval.tick().await;
            let now = Instant::now();
            let delta_ms = now.duration_since(last_tick).as_millis() as u64;
            last_tick = now;

            let retirees = {
                let mut game = ctx.game.lock().await;
                match game.update(delta_ms) {
                    Ok(retirees) => retirees,
                    Err(error) => {
                        log::error!("tick update failed: {error}");
                        continue;
                    }
                }
            };
            persist_retirees(&ctx, retirees).await;
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install the ctrl+c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install the sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received");
}
