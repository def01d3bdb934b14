use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;

use clap::Parser;
use color_eyre::Result;
use sky_bridge::{
    build_bridge_app, load_bridge_config_from_env, spawn_bridge, BridgeConfig,
    BridgeConfigHandle, BridgeLink,
};
use tracing::info;

mod app;
mod ui;

use app::InspectorApp;

#[derive(Clone)]
struct ChannelWriter {
    sender: Sender<String>,
}

impl std::io::Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(text) = String::from_utf8(buf.to_vec()) {
            let _ = self.sender.send(text);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Sky bridge terminal inspector", long_about = None)]
struct Cli {
    /// Bridge configuration file; overrides SKY_BRIDGE_CONFIG_PATH.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Base URL of the remote simulator.
    #[arg(long)]
    remote: Option<String>,
    /// Snapshot file path or URL.
    #[arg(long)]
    snapshot: Option<String>,
    /// Try live mode immediately.
    #[arg(long)]
    live: bool,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let (log_tx, log_rx) = mpsc::channel::<String>();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .with_writer(move || ChannelWriter {
            sender: log_tx.clone(),
        })
        .init();

    let cli = Cli::parse();
    let config = Arc::new(resolve_config(&cli)?);
    info!("Bridging {} (snapshot {})", config.remote.base_url, config.snapshot.location);

    let bridge = spawn_bridge(Arc::clone(&config))?;
    let link = BridgeLink {
        requests: bridge.requests.clone(),
        events: bridge.events.clone(),
    };
    let frame_loop = build_bridge_app(BridgeConfigHandle::new(config), link);

    let result = InspectorApp::new(frame_loop, log_rx)?.run();
    bridge.shutdown();
    result
}

fn resolve_config(cli: &Cli) -> Result<BridgeConfig> {
    let mut config = match &cli.config {
        Some(path) => BridgeConfig::from_file(path)?,
        None => (*load_bridge_config_from_env()).clone(),
    };
    if let Some(remote) = &cli.remote {
        config.remote.base_url = remote.clone();
    }
    if let Some(snapshot) = &cli.snapshot {
        config.snapshot.location = snapshot.clone();
    }
    config.start_live |= cli.live;
    Ok(config)
}
