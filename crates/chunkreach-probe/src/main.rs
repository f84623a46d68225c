//! Headless extra-chunk client: joins a pretend game, connects to the chunk
//! server configured for it, and reports how many chunks ended up loaded.

mod platform;
mod session;

use std::process::ExitCode;

use chunkreach_config::{CliArgs, Config};
use clap::Parser;

use crate::session::SessionOptions;

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let dirs = match platform::PlatformDirs::resolve_and_create(args.config.as_deref()) {
        Ok(dirs) => dirs,
        Err(e) => {
            eprintln!("Failed to initialize platform directories: {e}");
            return ExitCode::FAILURE;
        }
    };

    let file_config = match Config::load_or_create(&dirs.config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config, using defaults: {e}");
            Config::default()
        }
    };
    let mut effective = file_config.clone();
    effective.apply_cli_overrides(&args);
    chunkreach_log::init_logging(
        Some(&dirs.log_dir),
        cfg!(debug_assertions),
        Some(&effective),
    );
    tracing::info!(config_dir = %dirs.config_dir.display(), "Starting chunkreach");

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let options = SessionOptions::from_args(&args, Some(dirs.config_dir.clone()));
    let report = runtime.block_on(session::run(options, file_config, &args));

    println!("Loaded chunks: {}", report.loaded_chunks);
    tracing::info!(ticks = report.ticks, "Session finished");
    ExitCode::SUCCESS
}
