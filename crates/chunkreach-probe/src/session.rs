//! One headless game session against a real chunk server.
//!
//! The in-memory host stands in for the game client. The session task plays
//! the world thread: it ticks the controller every [`TICK`], drains queued
//! world work, and once per second hands the controller a flat chunk under
//! the player as if the game server had sent it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chunkreach_chunk::{Chunk, ChunkData, CutoffPolicy, KeepAllSections};
use chunkreach_config::{CliArgs, Config};
use chunkreach_coords::Pos2;
use chunkreach_net::{ConnectionState, ProtocolConnection};
use chunkreach_stream::{AdmissionController, GameHost, MemoryHost};
use tokio::runtime::Handle;
use tokio::time::{Instant, MissedTickBehavior};

/// World tick interval.
pub const TICK: Duration = Duration::from_millis(50);

const TICKS_PER_SECOND: u64 = 20;

/// Time allowed for the closing disconnect to reach the controller.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

/// Bedrock, three stone, dirt, grass.
const FLAT_LAYERS: [u32; 6] = [7 << 4, 1 << 4, 1 << 4, 1 << 4, 3 << 4, 2 << 4];

/// Session parameters, resolved from CLI arguments.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub game_server: String,
    pub player: Pos2,
    pub render_distance: i32,
    pub duration: Duration,
    /// Polled once per second for config changes.
    pub config_dir: Option<PathBuf>,
}

impl SessionOptions {
    pub fn from_args(args: &CliArgs, config_dir: Option<PathBuf>) -> Self {
        Self {
            game_server: args
                .game_server
                .clone()
                .unwrap_or_else(|| "localhost".to_string()),
            player: args.player.map_or(Pos2::new(0, 0), Pos2::from),
            render_distance: args.render_distance.unwrap_or(12),
            duration: Duration::from_secs(args.duration.unwrap_or(30)),
            config_dir,
        }
    }
}

/// What the session left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub loaded_chunks: usize,
    pub ticks: u64,
}

/// Run a session until `options.duration` elapses.
///
/// `file_config` is the config as stored on disk; `args` overrides are
/// applied to it and reapplied after every reload.
pub async fn run(options: SessionOptions, file_config: Config, args: &CliArgs) -> SessionReport {
    let runtime = Handle::current();
    let mut file_config = file_config;
    let mut config = file_config.clone();
    config.apply_cli_overrides(args);

    let host = Arc::new(MemoryHost::new(options.player, options.render_distance));
    let cutoff: Arc<dyn CutoffPolicy> = Arc::new(KeepAllSections);
    let (link, events) = ProtocolConnection::new(runtime.clone(), cutoff);
    let controller = AdmissionController::new(
        Arc::clone(&host),
        link,
        config,
        env!("CARGO_PKG_VERSION"),
    );
    let pump = AdmissionController::spawn_event_pump(&controller, events, &runtime);
    let mut states = controller.link().subscribe_state();
    let state_log = runtime.spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            tracing::debug!(?state, "Chunk server link state");
        }
    });

    tracing::info!(
        game = %options.game_server,
        player = %options.player,
        render_distance = options.render_distance,
        "Joining game"
    );
    host.join_game(options.game_server.clone());
    controller.on_game_connected();

    let deadline = Instant::now() + options.duration;
    let mut ticker = tokio::time::interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ticks = 0u64;

    while Instant::now() < deadline {
        ticker.tick().await;
        controller.on_tick();

        if ticks % TICKS_PER_SECOND == 0 {
            let player = host.player_chunk_pos();
            host.deliver_game_chunk(Chunk::from_data(ChunkData::flat(player, &FLAT_LAYERS)));

            if let Some(ref dir) = options.config_dir {
                match file_config.reload(dir) {
                    Ok(Some(reloaded)) => {
                        file_config = reloaded.clone();
                        let mut config = reloaded;
                        config.apply_cli_overrides(args);
                        controller.on_config_changed(config);
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!("Config reload failed: {e}"),
                }
            }
        }

        host.run_pending_tasks();
        ticks += 1;
    }

    let report = SessionReport {
        loaded_chunks: host.loaded_count(),
        ticks,
    };
    if controller.link().state() == ConnectionState::Connected {
        tracing::info!(peer = ?controller.link().peer_addr(), "Leaving game");
    }

    controller.on_game_disconnected();
    host.leave_game();
    tokio::time::sleep(SHUTDOWN_GRACE).await;
    host.run_pending_tasks();

    drop(controller);
    pump.abort();
    let _ = pump.await;
    state_log.abort();
    report
}
