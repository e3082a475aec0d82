//! Marquee Router - Main entry point
//!
//! # Usage
//!
//! ```bash
//! # Follow emulator windows on this machine
//! marquee-router windows
//!
//! # Follow a MemCard Pro device, with a custom config
//! marquee-router --config /path/to/config.toml device
//!
//! # Write the default configuration
//! marquee-router init-config
//! ```

use clap::{Parser, Subcommand};
use marquee_router::device::Endpoint;
use marquee_router::{
    build_publisher, Config, DesktopWindows, DeviceWatcher, GameDb, HttpProbe, LabelResolver,
    MarqueeRouter, Pipeline, RouterInput, StateProbe,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "marquee-router", version, about = "Publish the running game to a tty2rpi marquee")]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured log level (RUST_LOG still wins)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow emulator window titles on this machine
    Windows {
        /// Poll interval in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Follow a MemCard Pro device over HTTP
    Device {
        /// Poll interval in seconds
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Write the default configuration file and exit
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(Config::default_config_path);

    if let Command::InitConfig { force } = cli.command {
        if config_path.exists() && !force {
            return Err(format!("{:?} already exists (use --force to overwrite)", config_path).into());
        }
        Config::default().save_to_path(&config_path)?;
        println!("Wrote default configuration to {:?}", config_path);
        return Ok(());
    }

    let mut config = Config::load_from_path(&config_path)?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| config.logging.filter_directive().into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    info!("Starting Marquee Router");
    info!("Configuration loaded from {:?}", config_path);

    config.validate_publish()?;
    let publisher = build_publisher(&config.publish)?;

    let (input, resolver, interval) = match cli.command {
        Command::Windows { interval_ms } => {
            config.validate_windows()?;
            let input = RouterInput::Windows {
                desktop: Box::new(DesktopWindows::new()),
                config: config.windows.clone(),
            };
            let interval = interval_ms
                .map(|ms| Duration::from_millis(ms.max(1)))
                .unwrap_or_else(|| config.windows.poll_interval());
            (input, LabelResolver::default(), interval)
        }
        Command::Device { interval_secs } => {
            config.validate_device()?;
            let probe: Box<dyn StateProbe> =
                Box::new(HttpProbe::new(config.device.http_timeout())?);
            let endpoints = Endpoint::from_config(&config.device);
            let game_db = GameDb::load(&config.device.game_db_path);
            if game_db.is_empty() {
                warn!("Game table is empty; only default cards will produce labels");
            }
            let resolver = LabelResolver::new(game_db, config.device.default_cards.clone());
            let interval = interval_secs
                .map(|secs| Duration::from_secs(secs.max(1)))
                .unwrap_or_else(|| config.device.poll_interval());
            (
                RouterInput::Device(DeviceWatcher::new(probe, endpoints)),
                resolver,
                interval,
            )
        }
        Command::InitConfig { .. } => return Ok(()),
    };

    let mut router = MarqueeRouter::new(input, Pipeline::new(resolver), publisher, interval);
    let status = router.status();
    info!(
        "Router running: {} input, {:?} interval, publishing to {}",
        status.input,
        router.interval(),
        status.destination
    );

    // Set up signal handler for graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    // Main loop
    let mut tick_interval = tokio::time::interval(router.interval());
    tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    while running.load(Ordering::SeqCst) {
        tick_interval.tick().await;
        if !running.load(Ordering::SeqCst) {
            break;
        }
        router.tick().await;
    }

    let status = router.status();
    info!(
        "Shutting down: {} published, {} failed, last label {:?}",
        status.published, status.failed, status.last_label
    );
    for source in &status.sources {
        if let Some(at) = source.last_published_at {
            info!(
                "{}: {} publications, last '{}' at {}",
                source.id,
                source.publish_count,
                source.last_label.as_deref().unwrap_or(""),
                at.to_rfc3339()
            );
        }
    }
    Ok(())
}
