use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{error, info};
use std::path::PathBuf;
use std::time::Instant;

use vobplayer::utils::{format_duration, load_config};

/// VobPlayer - plays the sections of a DVD-style game video
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Media file to play (overrides the configured path)
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Configuration file layered over the system and user files
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Start in fullscreen mode
    #[arg(short, long)]
    fullscreen: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Print playback counters as JSON on exit
    #[arg(long)]
    stats: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    // Command line wins over every config layer
    if let Some(file) = args.file {
        config.media.path = Some(file);
    }
    if args.fullscreen {
        config.window.fullscreen = true;
    }

    let log_level = if args.debug { "debug" } else { config.general.log_level.as_str() };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    info!("Starting VobPlayer v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config.media.path {
        info!("Media file: {}", path.display());
    }

    let started = Instant::now();
    let stats = match vobplayer::window::run(config) {
        Ok(stats) => stats,
        Err(e) => {
            error!("Playback failed: {}", e);
            return Err(e.into());
        }
    };

    info!(
        "Played for {}: {} frames presented, {} sections completed",
        format_duration(started.elapsed()),
        stats.frames_presented,
        stats.sections_completed
    );

    if args.stats {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }

    Ok(())
}
