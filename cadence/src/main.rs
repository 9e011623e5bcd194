//! Cadence - CPU hotplug daemon for DaemonOS
//!
//! Provides:
//! - Load-driven hotplugging of little and big cores
//! - Suspend/resume of cores on display power changes
//! - Wake override for wake sources that fire with the display off
//! - Runtime tunables over a unix socket

use anyhow::{Context, Result};
use cadence::config::CadenceConfig;
use cadence::controller::Controller;
use cadence::display::{BacklightWatcher, DisplayEvent};
use cadence::ipc::IpcServer;
use cadence::platform::SysfsCpu;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Cadence - CPU hotplug daemon
#[derive(Parser, Debug)]
#[command(name = "cadenced", version, about)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "/grimoire/system/cadence.yaml")]
    config: PathBuf,

    /// Socket path (overrides the configuration)
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Start the controller regardless of the configured boot flag
    #[arg(long)]
    enable: bool,

    /// Debug mode
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = CadenceConfig::load(&args.config)?;

    let log_level = if args.debug {
        "debug".to_string()
    } else {
        config.daemon.log_level.clone()
    };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .init();

    info!("Cadence v{} starting", env!("CARGO_PKG_VERSION"));

    if args.enable {
        config.tunables.enabled = true;
    }

    let platform = Arc::new(SysfsCpu::new(&config.sysfs));
    let controller = Controller::new(platform, config.topology, config.tunables.clone(), &config.daemon)
        .context("Invalid hotplug configuration")?;

    if let Err(e) = controller.launch().await {
        warn!("Hotplug controller not started: {}", e);
    }

    // Display power events
    let (tx, rx) = mpsc::channel(16);
    let watcher = BacklightWatcher::new(&config.sysfs, config.daemon.display_poll_interval());
    tokio::spawn(watcher.run(tx));
    tokio::spawn(display_event_loop(controller.clone(), rx));

    // Start IPC server
    let socket_path = args
        .socket
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| config.daemon.socket_path.clone());
    let server = IpcServer::new(socket_path, controller.clone());

    info!("Cadence ready");
    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down, restoring all cores");
            controller.stop().await;
            Ok(())
        }
    }
}

async fn display_event_loop(controller: Controller, mut rx: mpsc::Receiver<DisplayEvent>) {
    while let Some(event) = rx.recv().await {
        controller.handle_display(event).await;
    }
}
