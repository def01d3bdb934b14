//! Bridge between a remote sky simulator and a frame-driven 3D scene.
//!
//! The [`worker`] keeps a mirror of the simulator's state current and sends commands;
//! the [`scene`] frame loop turns each published [`SkyState`] into an [`ActiveLight`]
//! whenever [`run_frame`] is invoked.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod guard;
pub mod light;
pub mod metrics;
pub mod mirror;
pub mod mode;
pub mod provider;
pub mod scene;
pub mod session;
pub mod snapshot;
pub mod snapshot_watch;
pub mod state;
pub mod transport;
pub mod worker;

use bevy::prelude::App;

pub use config::{load_bridge_config_from_env, BridgeConfig, BridgeConfigHandle, ConfigError};
pub use dispatcher::{CommandDispatcher, CommandOutcome, DropReason, InfoOutcome, Refresh};
pub use error::{SnapshotError, SyncError};
pub use guard::{InFlightGuard, InFlightPermit};
pub use light::{
    ActiveLight, LightCache, LightDirection, LightResolver, LightSource, LinearColor, Occluder,
    OpenSky, ShadowHardness, SunImpostor, MAX_EXPOSURE,
};
pub use metrics::BridgeMetrics;
pub use mirror::RemoteMirror;
pub use mode::{BackgroundStrategy, BridgeMode, ModeCoordinator, ModeTransition, TransitionReason};
pub use provider::{NetworkProvider, SkyStateProvider, SnapshotProvider};
pub use scene::{
    build_bridge_app, set_exposure, BridgeLink, CameraView, FlareState, GazeForwarding,
    SceneOccluder, SceneSky,
};
pub use session::{DeltaOutcome, RemoteSession};
pub use snapshot::{parse_snapshot, SnapshotLocation, SnapshotSource};
pub use state::{CelestialBody, SkyState, SkyTime};
pub use transport::{HttpTransport, Transport, TransportError, TransportResponse};
pub use worker::{spawn_bridge, spawn_bridge_with, BridgeEvent, BridgeHandle, BridgeRequest};

/// Run one frame: drain worker events, resolve the light, update flare and gaze.
pub fn run_frame(app: &mut App) {
    app.update();
}
