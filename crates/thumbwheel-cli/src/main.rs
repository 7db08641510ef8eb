use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use thumbwheel_core::{click, device, AppConfig, Coordinator, Error};

const USAGE_NOTES: &str = "\
If no device is given, one is looked up automatically.

Examples: thumbwheel /dev/input/event10
          thumbwheel /dev/input/by-id/usb-MOSART_Semi._2.4G_INPUT_DEVICE-if01-event-mouse
          thumbwheel /dev/input/by-path/pci-0000:00:14.0-usb-0:2:1.1-event-mouse

Note: when reading from /dev/input/by-id or /dev/input/by-path, look for
      filenames that end with '-event-mouse'.
Set DEBUG=1 for verbose output.";

#[derive(Parser)]
#[command(name = "thumbwheel")]
#[command(author, version, about = "Turn thumb-button presses into an accelerating scroll wheel")]
struct Cli {
    /// Input event device to read
    device: Option<PathBuf>,

    /// Configuration file (defaults to ~/.config/thumbwheel/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log wheel clicks instead of performing them
    #[arg(long)]
    dry_run: bool,
}

/// RUST_LOG wins, then a non-empty DEBUG, then the configured level
fn log_filter(rust_log: Option<String>, debug: Option<OsString>, config: &AppConfig) -> String {
    if let Some(filter) = rust_log {
        return filter;
    }
    match debug {
        Some(value) if !value.is_empty() => "debug".to_string(),
        _ => config.general.log_level.clone(),
    }
}

fn usage() -> ! {
    let _ = Cli::command().print_help();
    println!("\n{}", USAGE_NOTES);
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    if cli.dry_run {
        config.click.dry_run = true;
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(log_filter(
            std::env::var("RUST_LOG").ok(),
            std::env::var_os("DEBUG"),
            &config,
        )))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let device_path = match device::resolve(cli.device.as_deref(), &config) {
        Ok(path) => path,
        Err(Error::NoDevice) => usage(),
        Err(e) => return Err(e.into()),
    };
    info!("Using input event device: {}", device_path.display());

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let (tx, rx) = mpsc::unbounded_channel();
    let clicker = click::from_config(&config.click);
    let coordinator = Coordinator::new(config.scroll.clone(), clicker, tx.clone());
    device::spawn_reader(device_path, tx);

    coordinator.run(rx, shutdown_rx).await?;
    Ok(())
}
