use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use tracing::{info, warn};

use sky_bridge::{
    build_bridge_app, load_bridge_config_from_env, run_frame, set_exposure, spawn_bridge,
    BridgeConfig,
    BridgeConfigHandle, BridgeLink, BridgeMetrics, BridgeRequest, LightCache, SceneSky,
};

/// Headless sky bridge: keeps the light in step with a remote simulator.
#[derive(Parser, Debug)]
#[command(name = "sky_bridge")]
struct Args {
    /// Configuration file; overrides SKY_BRIDGE_CONFIG_PATH.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Base URL of the remote simulator, e.g. http://localhost:8090.
    #[arg(long)]
    remote: Option<String>,
    /// Snapshot file path or URL.
    #[arg(long)]
    snapshot: Option<String>,
    /// Try live mode immediately.
    #[arg(long)]
    live: bool,
    /// Frame period in milliseconds.
    #[arg(long, default_value_t = 33)]
    frame_ms: u64,
    /// Seconds between metric log lines.
    #[arg(long, default_value_t = 10)]
    report_secs: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = Arc::new(resolve_config(&args));

    let bridge = match spawn_bridge(Arc::clone(&config)) {
        Ok(bridge) => bridge,
        Err(err) => {
            tracing::error!(target: "sky_bridge::server", error = %err, "bridge.start_failed");
            return;
        }
    };
    let link = BridgeLink {
        requests: bridge.requests.clone(),
        events: bridge.events.clone(),
    };
    let mut app = build_bridge_app(BridgeConfigHandle::new(Arc::clone(&config)), link);
    let commands = spawn_stdin_listener();

    info!(
        target: "sky_bridge::server",
        remote = %config.remote.base_url,
        snapshot = %config.snapshot.location,
        "sky bridge ready; commands: live | time <+-hours> | rate <r> | action <id> | toggle <prop> | set <prop> <value> | script [name] | fov <deg> | location <id> | exposure <0-8> | reload | quit"
    );

    let frame = Duration::from_millis(args.frame_ms.max(1));
    let report_every = Duration::from_secs(args.report_secs.max(1));
    let mut last_report = Instant::now();
    loop {
        let started = Instant::now();
        if !drain_commands(&commands, &bridge.requests, &mut app) {
            break;
        }
        run_frame(&mut app);

        if last_report.elapsed() >= report_every {
            report(&app);
            last_report = Instant::now();
        }
        if let Some(rest) = frame.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    }

    report(&app);
    bridge.shutdown();
}

fn resolve_config(args: &Args) -> BridgeConfig {
    let mut config = match &args.config {
        Some(path) => match BridgeConfig::from_file(path) {
            Ok(config) => config,
            Err(err) => {
                warn!(target: "sky_bridge::config", error = %err, "bridge_config.load_failed");
                (*BridgeConfig::builtin()).clone()
            }
        },
        None => (*load_bridge_config_from_env()).clone(),
    };
    if let Some(remote) = &args.remote {
        config.remote.base_url = remote.clone();
    }
    if let Some(snapshot) = &args.snapshot {
        config.snapshot.location = snapshot.clone();
    }
    config.start_live |= args.live;
    config
}

/// Forward pending console commands; false once the console asked to quit.
fn drain_commands(
    commands: &Receiver<Command>,
    requests: &tokio::sync::mpsc::UnboundedSender<BridgeRequest>,
    app: &mut bevy::prelude::App,
) -> bool {
    loop {
        match commands.try_recv() {
            Ok(Command::Quit) => return false,
            Ok(Command::Exposure(factor)) => {
                set_exposure(&mut app.world, factor);
            }
            Ok(Command::Request(request)) => {
                info!(target: "sky_bridge::server", request = request.label(), "command.accepted");
                if requests.send(request).is_err() {
                    return false;
                }
            }
            // A closed console leaves the bridge running until it is killed.
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => return true,
        }
    }
}

fn report(app: &bevy::prelude::App) {
    let metrics = app.world.resource::<BridgeMetrics>();
    let sky = app.world.resource::<SceneSky>();
    let light = app.world.resource::<LightCache>().light_or_fallback();
    info!(
        target: "sky_bridge::server",
        mode = %sky.mode,
        reachable = sky.reachable,
        source = %light.source,
        shadows = ?light.shadows,
        intensity = light.intensity,
        frames = metrics.frames,
        sky_updates = metrics.sky_updates,
        sky_unavailable = metrics.sky_unavailable,
        mode_transitions = metrics.mode_transitions,
        light_source_changes = metrics.light_source_changes,
        commands_completed = metrics.commands_completed,
        commands_dropped = metrics.commands_dropped,
        "metrics.report"
    );
}

#[derive(Debug)]
enum Command {
    Request(BridgeRequest),
    /// Light intensity multiplier; handled by the frame loop, not the worker.
    Exposure(f32),
    Quit,
}

fn spawn_stdin_listener() -> Receiver<Command> {
    let (sender, receiver) = unbounded::<Command>();
    thread::spawn(move || handle_console(io::stdin().lock(), sender));
    receiver
}

fn handle_console(reader: impl BufRead, sender: Sender<Command>) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!("Console read error: {}", err);
                break;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match parse_command(trimmed) {
            Some(command) => {
                if sender.send(command).is_err() {
                    break;
                }
            }
            None => warn!("Invalid command: {}", trimmed),
        }
    }
}

fn parse_command(input: &str) -> Option<Command> {
    let mut parts = input.split_whitespace();
    let request = match parts.next()? {
        "quit" | "exit" => return Some(Command::Quit),
        "exposure" => return Some(Command::Exposure(parts.next()?.parse().ok()?)),
        "live" | "mode" => BridgeRequest::ToggleMode,
        "time" => BridgeRequest::ShiftTime {
            hours: parts.next().unwrap_or("1").parse().ok()?,
        },
        "rate" => BridgeRequest::SetTimeRate {
            rate: parts.next()?.parse().ok()?,
        },
        "action" => BridgeRequest::DoAction {
            id: parts.next()?.to_string(),
        },
        "toggle" => BridgeRequest::ToggleProperty {
            id: parts.next()?.to_string(),
        },
        "set" => BridgeRequest::SetProperty {
            id: parts.next()?.to_string(),
            value: parts.next()?.to_string(),
        },
        "script" => match parts.next() {
            Some(id) => BridgeRequest::RunScript { id: id.to_string() },
            None => BridgeRequest::RunSkyboxScript,
        },
        "fov" => BridgeRequest::SetFov {
            fov: parts.next()?.parse().ok()?,
        },
        "location" => {
            let id = parts.collect::<Vec<_>>().join(" ");
            if id.is_empty() {
                return None;
            }
            BridgeRequest::SetLocation { id }
        }
        "reload" => BridgeRequest::ReloadSnapshot,
        _ => return None,
    };
    Some(Command::Request(request))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(input: &str) -> Option<BridgeRequest> {
        match parse_command(input)? {
            Command::Request(request) => Some(request),
            Command::Exposure(_) | Command::Quit => None,
        }
    }

    #[test]
    fn parses_console_commands() {
        assert_eq!(request("time -1"), Some(BridgeRequest::ShiftTime { hours: -1.0 }));
        assert_eq!(request("time"), Some(BridgeRequest::ShiftTime { hours: 1.0 }));
        assert_eq!(
            request("set StelSkyDrawer.bortleScaleIndex 4"),
            Some(BridgeRequest::SetProperty {
                id: "StelSkyDrawer.bortleScaleIndex".into(),
                value: "4".into()
            })
        );
        assert_eq!(request("script"), Some(BridgeRequest::RunSkyboxScript));
        assert_eq!(
            request("location Cape Town, South Africa"),
            Some(BridgeRequest::SetLocation {
                id: "Cape Town, South Africa".into()
            })
        );
        assert_eq!(request("location"), None);
        assert_eq!(request("rate fast"), None);
        assert!(matches!(parse_command("quit"), Some(Command::Quit)));
        assert!(matches!(parse_command("exposure 2.5"), Some(Command::Exposure(f)) if f == 2.5));
        assert!(parse_command("exposure bright").is_none());
    }
}
