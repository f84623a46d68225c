//! Command-line argument parsing for the chunk streaming probe.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "chunkreach", about = "Extra chunk streaming client")]
pub struct CliArgs {
    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Game server address the session pretends to be connected to.
    #[arg(long)]
    pub game_server: Option<String>,

    /// Auxiliary chunk server for the game server, `host` or `host:port`.
    #[arg(long)]
    pub chunk_server: Option<String>,

    /// Render distance the game server provides itself, in chunks.
    #[arg(long)]
    pub server_render_distance: Option<i32>,

    /// Client render distance in chunks.
    #[arg(long)]
    pub render_distance: Option<i32>,

    /// Cap on loaded chunks.
    #[arg(long)]
    pub max_chunks: Option<usize>,

    /// Extra chunks per second to ask the chunk server for.
    #[arg(long)]
    pub chunks_per_second: Option<u32>,

    /// Player chunk position as `x,z`.
    #[arg(long, value_parser = parse_chunk_pos, allow_hyphen_values = true)]
    pub player: Option<(i32, i32)>,

    /// Seconds to stay in game before disconnecting.
    #[arg(long)]
    pub duration: Option<u64>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,
}

fn parse_chunk_pos(s: &str) -> Result<(i32, i32), String> {
    let (x, z) = s
        .split_once(',')
        .ok_or_else(|| format!("expected `x,z`, got {s:?}"))?;
    let x = x.trim().parse().map_err(|e| format!("invalid x in {s:?}: {e}"))?;
    let z = z.trim().parse().map_err(|e| format!("invalid z in {s:?}: {e}"))?;
    Ok((x, z))
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    ///
    /// `--chunk-server` and `--server-render-distance` edit the profile of
    /// `--game-server` and are ignored without it.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(n) = args.max_chunks {
            self.stream.max_chunks_loaded = n;
        }
        if let Some(n) = args.chunks_per_second {
            self.stream.chunk_loads_per_second = n;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }

        let Some(ref game) = args.game_server else {
            if args.chunk_server.is_some() || args.server_render_distance.is_some() {
                log::warn!("Server profile overrides ignored without --game-server");
            }
            return;
        };
        if let Some(ref addr) = args.chunk_server {
            self.servers
                .entry(game.clone())
                .or_default()
                .chunk_server_address = addr.clone();
        }
        if let Some(rd) = args.server_render_distance {
            match self.servers.get_mut(game) {
                Some(profile) => profile.server_render_distance = rd,
                None => log::warn!("No server profile for {game}; --server-render-distance ignored"),
            }
        }
    }
}
