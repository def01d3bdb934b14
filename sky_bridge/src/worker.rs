//! Async bridge worker.
//!
//! The frame loop talks to the worker through two channels: [`BridgeRequest`]s in,
//! [`BridgeEvent`]s out. The worker owns the session, the dispatcher and the mode
//! coordinator; the frame loop only ever sees complete states and transitions.

use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{interval, MissedTickBehavior};

use crate::config::BridgeConfig;
use crate::dispatcher::{CommandDispatcher, CommandOutcome, DropReason, Refresh};
use crate::error::{SnapshotError, SyncError};
use crate::mode::{BridgeMode, ModeCoordinator, ModeTransition};
use crate::provider::{NetworkProvider, SkyStateProvider, SnapshotProvider};
use crate::session::RemoteSession;
use crate::snapshot::{SnapshotLocation, SnapshotSource};
use crate::snapshot_watch::SnapshotWatcher;
use crate::state::SkyState;
use crate::transport::{HttpTransport, Transport};

/// Intent from the frame loop or a user.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeRequest {
    ToggleMode,
    ShiftTime { hours: f64 },
    SetTimeRate { rate: f64 },
    DoAction { id: String },
    ToggleProperty { id: String },
    SetProperty { id: String, value: String },
    RunScript { id: String },
    RunSkyboxScript,
    /// Radians, azimuth already north-corrected.
    SetViewDirection { az: f64, alt: f64 },
    SetFov { fov: f64 },
    /// Move the observer to a named location known to the remote.
    SetLocation { id: String },
    ReloadSnapshot,
    Shutdown,
}

impl BridgeRequest {
    pub fn label(&self) -> &'static str {
        match self {
            BridgeRequest::ToggleMode => "toggle_mode",
            BridgeRequest::ShiftTime { .. } => "shift_time",
            BridgeRequest::SetTimeRate { .. } => "set_time_rate",
            BridgeRequest::DoAction { .. } => "do_action",
            BridgeRequest::ToggleProperty { .. } => "toggle_property",
            BridgeRequest::SetProperty { .. } => "set_property",
            BridgeRequest::RunScript { .. } => "run_script",
            BridgeRequest::RunSkyboxScript => "run_skybox_script",
            BridgeRequest::SetViewDirection { .. } => "set_view_direction",
            BridgeRequest::SetFov { .. } => "set_fov",
            BridgeRequest::SetLocation { .. } => "set_location",
            BridgeRequest::ReloadSnapshot => "reload_snapshot",
            BridgeRequest::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    SkyUpdated { state: SkyState, mode: BridgeMode },
    SkyUnavailable { mode: BridgeMode, error: SyncError },
    ModeChanged(ModeTransition),
    Connection { reachable: bool },
    CommandCompleted { request: &'static str, outcome: CommandOutcome },
}

pub struct BridgeWorker<T: Transport> {
    config: Arc<BridgeConfig>,
    dispatcher: Arc<CommandDispatcher<T>>,
    network: NetworkProvider<T>,
    snapshot: SnapshotProvider,
    coordinator: ModeCoordinator,
    watcher: Option<SnapshotWatcher>,
    events: Sender<BridgeEvent>,
}

impl<T: Transport> BridgeWorker<T> {
    pub fn new(
        config: Arc<BridgeConfig>,
        transport: T,
        events: Sender<BridgeEvent>,
    ) -> Result<Self, SnapshotError> {
        let session = Arc::new(RemoteSession::new(transport));
        let dispatcher = Arc::new(CommandDispatcher::new(session, Arc::clone(&config)));
        let location = SnapshotLocation::parse(&config.snapshot.location);
        let watcher = if config.snapshot.watch {
            location.file_path().and_then(|path| match SnapshotWatcher::new(path) {
                Ok(watcher) => Some(watcher),
                Err(err) => {
                    tracing::warn!(
                        target: "sky_bridge::snapshot",
                        path = %path.display(),
                        error = %err,
                        "snapshot.watch_failed"
                    );
                    None
                }
            })
        } else {
            None
        };
        let snapshot = SnapshotProvider::new(SnapshotSource::new(
            location,
            config.remote.request_timeout(),
        )?);

        Ok(Self {
            network: NetworkProvider::new(Arc::clone(&dispatcher)),
            coordinator: ModeCoordinator::new(config.remote.delta_failure_threshold),
            config,
            dispatcher,
            snapshot,
            watcher,
            events,
        })
    }

    pub fn mode(&self) -> BridgeMode {
        self.coordinator.mode()
    }

    /// Serve requests and poll until `Shutdown` or the request channel closes.
    pub async fn run(mut self, mut requests: UnboundedReceiver<BridgeRequest>) {
        tracing::info!(
            target: "sky_bridge::worker",
            remote = %self.config.remote.base_url,
            snapshot = %self.snapshot.source().location(),
            "worker.started"
        );
        self.publish(BridgeMode::Snapshot).await;
        if self.config.start_live {
            self.coordinator.request_live();
            self.connect().await;
        }

        let mut ticker = interval(self.config.remote.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(BridgeRequest::Shutdown) | None => break,
                    Some(request) => self.handle(request).await,
                },
                _ = ticker.tick() => self.tick().await,
            }
        }
        tracing::info!(target: "sky_bridge::worker", "worker.stopped");
    }

    async fn tick(&mut self) {
        match self.coordinator.mode() {
            BridgeMode::Live => {
                let result = self.dispatcher.session().fetch_delta().await;
                if let Some(transition) = self.coordinator.on_sync_result(&result) {
                    self.leave_live(transition).await;
                    return;
                }
                self.publish(BridgeMode::Live).await;
            }
            BridgeMode::Snapshot => {
                if self
                    .watcher
                    .as_ref()
                    .is_some_and(SnapshotWatcher::drain_changed)
                {
                    tracing::info!(target: "sky_bridge::snapshot", "snapshot.changed");
                    self.publish(BridgeMode::Snapshot).await;
                }
            }
        }
    }

    async fn handle(&mut self, request: BridgeRequest) {
        tracing::debug!(target: "sky_bridge::worker", request = request.label(), "request.received");
        match request {
            BridgeRequest::ToggleMode => match self.coordinator.toggle() {
                Some(transition) => self.leave_live(transition).await,
                None if self.coordinator.live_requested() => self.connect().await,
                None => {}
            },
            BridgeRequest::ReloadSnapshot => {
                if self.coordinator.mode() == BridgeMode::Snapshot {
                    self.publish(BridgeMode::Snapshot).await;
                }
            }
            BridgeRequest::Shutdown => {}
            command => self.spawn_command(command),
        }
    }

    async fn connect(&mut self) {
        let session = self.dispatcher.session();
        match session.initialize_full().await {
            Ok(_) => {
                self.emit(BridgeEvent::Connection { reachable: true });
                if let Some(transition) = self.coordinator.on_connected() {
                    self.emit(BridgeEvent::ModeChanged(transition));
                }
                self.dispatcher.apply_site_settings().await;
                self.publish(BridgeMode::Live).await;
            }
            Err(err) => {
                self.emit(BridgeEvent::Connection { reachable: false });
                if let Some(transition) = self.coordinator.on_initialize_failed(&err) {
                    self.leave_live(transition).await;
                }
            }
        }
    }

    async fn leave_live(&mut self, transition: ModeTransition) {
        self.dispatcher.session().reset();
        self.emit(BridgeEvent::ModeChanged(transition));
        self.publish(BridgeMode::Snapshot).await;
    }

    async fn publish(&self, mode: BridgeMode) {
        let provider: &dyn SkyStateProvider = match mode {
            BridgeMode::Live => &self.network,
            BridgeMode::Snapshot => &self.snapshot,
        };
        let event = match provider.current().await {
            Ok(state) => BridgeEvent::SkyUpdated { state, mode },
            Err(error) => BridgeEvent::SkyUnavailable { mode, error },
        };
        self.emit(event);
    }

    /// Commands run as their own tasks so a slow remote never stalls polling.
    fn spawn_command(&self, request: BridgeRequest) {
        let label = request.label();
        if self.coordinator.mode() != BridgeMode::Live {
            tracing::trace!(target: "sky_bridge::worker", request = label, "command.dropped=snapshot_mode");
            self.emit(BridgeEvent::CommandCompleted {
                request: label,
                outcome: CommandOutcome::Dropped(DropReason::Offline),
            });
            return;
        }
        let dispatcher = Arc::clone(&self.dispatcher);
        let events = self.events.clone();
        tokio::spawn(async move {
            let outcome = match request {
                BridgeRequest::ShiftTime { hours } => dispatcher.shift_time(hours).await,
                BridgeRequest::SetTimeRate { rate } => dispatcher.set_time_rate(rate).await,
                BridgeRequest::DoAction { id } => dispatcher.do_action(id).await,
                BridgeRequest::ToggleProperty { id } => dispatcher.toggle_property(&id).await,
                BridgeRequest::SetProperty { id, value } => {
                    dispatcher.set_property(id, value, Refresh::After).await
                }
                BridgeRequest::RunScript { id } => dispatcher.run_script(id).await,
                BridgeRequest::RunSkyboxScript => dispatcher.run_skybox_script().await,
                BridgeRequest::SetViewDirection { az, alt } => {
                    dispatcher.set_view_direction(az, alt).await
                }
                BridgeRequest::SetFov { fov } => dispatcher.set_fov(fov).await,
                BridgeRequest::SetLocation { id } => dispatcher.set_location_by_id(id).await,
                BridgeRequest::ToggleMode
                | BridgeRequest::ReloadSnapshot
                | BridgeRequest::Shutdown => return,
            };
            let _ = events.send(BridgeEvent::CommandCompleted {
                request: label,
                outcome,
            });
        });
    }

    fn emit(&self, event: BridgeEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!(target: "sky_bridge::worker", "event.dropped=receiver_gone");
        }
    }
}

/// Frame-loop side of a running worker.
pub struct BridgeHandle {
    pub requests: UnboundedSender<BridgeRequest>,
    pub events: Receiver<BridgeEvent>,
    thread: Option<JoinHandle<()>>,
}

impl BridgeHandle {
    pub fn send(&self, request: BridgeRequest) {
        if self.requests.send(request).is_err() {
            tracing::warn!(target: "sky_bridge::worker", "request.dropped=worker_gone");
        }
    }

    /// Ask the worker to stop and wait for its thread.
    pub fn shutdown(mut self) {
        let _ = self.requests.send(BridgeRequest::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!(target: "sky_bridge::worker", "worker.panicked");
            }
        }
    }
}

/// Start the worker on its own thread with an HTTP transport.
pub fn spawn_bridge(config: Arc<BridgeConfig>) -> io::Result<BridgeHandle> {
    let transport = HttpTransport::new(Arc::clone(&config))
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    spawn_bridge_with(config, transport)
}

pub fn spawn_bridge_with<T: Transport>(
    config: Arc<BridgeConfig>,
    transport: T,
) -> io::Result<BridgeHandle> {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = unbounded();
    let worker = BridgeWorker::new(config, transport, event_tx)
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("sky-bridge-worker")
        .enable_all()
        .build()?;
    let thread = std::thread::Builder::new()
        .name("sky-bridge".into())
        .spawn(move || {
            runtime.block_on(worker.run(request_rx));
        })?;
    Ok(BridgeHandle {
        requests: request_tx,
        events: event_rx,
        thread: Some(thread),
    })
}
