//! Frame-driven side of the bridge: drains worker events once per frame and keeps the
//! resolved light, flare visibility and outbound gaze in step with them.

use std::f64::consts::{FRAC_PI_2, PI};

use bevy::prelude::*;
use crossbeam_channel::Receiver;
use tokio::sync::mpsc::UnboundedSender;

use crate::config::BridgeConfigHandle;
use crate::dispatcher::CommandOutcome;
use crate::light::{flare_visible, LightCache, LightResolver, Occluder, OpenSky};
use crate::metrics::{collect_metrics, BridgeMetrics};
use crate::mode::{BackgroundStrategy, BridgeMode};
use crate::state::SkyState;
use crate::worker::{BridgeEvent, BridgeRequest};

const ZENITH_NUDGE: f64 = 1e-5;
const GAZE_EPSILON: f32 = 1e-6;

/// Channels to the bridge worker.
#[derive(Resource)]
pub struct BridgeLink {
    pub requests: UnboundedSender<BridgeRequest>,
    pub events: Receiver<BridgeEvent>,
}

impl BridgeLink {
    pub fn send(&self, request: BridgeRequest) -> bool {
        self.requests.send(request).is_ok()
    }
}

/// What the frame loop currently knows about the sky and the connection.
#[derive(Resource, Debug, Clone)]
pub struct SceneSky {
    pub state: Option<SkyState>,
    pub mode: BridgeMode,
    pub background: BackgroundStrategy,
    pub reachable: bool,
    pub last_command: Option<(&'static str, CommandOutcome)>,
}

impl Default for SceneSky {
    fn default() -> Self {
        Self {
            state: None,
            mode: BridgeMode::Snapshot,
            background: BackgroundStrategy::Skybox,
            reachable: false,
            last_command: None,
        }
    }
}

/// Camera pose supplied by the embedding scene.
#[derive(Resource, Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    pub position: Vec3,
    /// Unit forward vector; `y` up.
    pub forward: Vec3,
    pub fov_deg: f64,
}

impl Default for CameraView {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: Vec3::Z,
            fov_deg: 60.0,
        }
    }
}

#[derive(Resource, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlareState {
    pub visible: bool,
}

#[derive(Resource)]
pub struct SceneOccluder(pub Box<dyn Occluder>);

impl Default for SceneOccluder {
    fn default() -> Self {
        Self(Box::new(OpenSky))
    }
}

/// Last gaze and field of view forwarded to the remote.
#[derive(Resource, Debug, Default, Clone, Copy)]
pub struct GazeForwarding {
    pub last_forward: Option<Vec3>,
    pub last_fov: Option<f64>,
}

/// Remote view direction (radians) for a camera forward vector.
pub fn gaze_to_view(forward: Vec3, north_angle_deg: f64) -> (f64, f64) {
    let forward = forward.as_dvec3();
    let az = PI + forward.z.atan2(forward.x) + north_angle_deg.to_radians();
    let mut alt = forward.y.clamp(-1.0, 1.0).asin();
    if alt >= FRAC_PI_2 {
        alt -= ZENITH_NUDGE;
    }
    (az, alt)
}

/// Construct the frame loop around a running worker.
pub fn build_bridge_app(config: BridgeConfigHandle, link: BridgeLink) -> App {
    let mut app = App::new();
    let resolver = LightResolver::from_config(&config.get());

    app.insert_resource(config)
        .insert_resource(link)
        .insert_resource(resolver)
        .insert_resource(SceneSky::default())
        .insert_resource(LightCache::default())
        .insert_resource(CameraView::default())
        .insert_resource(FlareState::default())
        .insert_resource(SceneOccluder::default())
        .insert_resource(GazeForwarding::default())
        .insert_resource(BridgeMetrics::default())
        .add_plugins(MinimalPlugins)
        .add_systems(
            Update,
            (
                drain_bridge_events,
                update_flare,
                forward_gaze,
                collect_metrics,
            )
                .chain(),
        );

    app
}

/// Change the light intensity multiplier now and for every later resolution.
pub fn set_exposure(world: &mut World, factor: f32) -> f32 {
    let exposure = world.resource_mut::<LightResolver>().overexpose(factor);
    world.resource_mut::<LightCache>().set_intensity(exposure);
    tracing::info!(target: "sky_bridge::scene", exposure, "light.exposure");
    exposure
}

pub fn drain_bridge_events(
    link: Res<BridgeLink>,
    resolver: Res<LightResolver>,
    mut sky: ResMut<SceneSky>,
    mut cache: ResMut<LightCache>,
    mut metrics: ResMut<BridgeMetrics>,
) {
    for event in link.events.try_iter() {
        match event {
            BridgeEvent::SkyUpdated { state, mode } => {
                let light = cache.apply(Ok(resolver.resolve(&state, mode)));
                tracing::debug!(
                    target: "sky_bridge::scene",
                    source = %light.source,
                    mode = %mode,
                    "light.resolved"
                );
                sky.state = Some(state);
                metrics.sky_updates += 1;
            }
            BridgeEvent::SkyUnavailable { mode, error } => {
                tracing::debug!(target: "sky_bridge::scene", mode = %mode, error = %error, "sky.unavailable");
                cache.apply(Err(error));
                metrics.sky_unavailable += 1;
            }
            BridgeEvent::ModeChanged(transition) => {
                sky.mode = transition.to;
                sky.background = transition.background;
                metrics.mode_transitions += 1;
                metrics.mode = transition.to;
            }
            BridgeEvent::Connection { reachable } => sky.reachable = reachable,
            BridgeEvent::CommandCompleted { request, outcome } => {
                if matches!(outcome, CommandOutcome::Dropped(_)) {
                    metrics.commands_dropped += 1;
                } else {
                    metrics.commands_completed += 1;
                }
                sky.last_command = Some((request, outcome));
            }
        }
    }
}

pub fn update_flare(
    config: Res<BridgeConfigHandle>,
    cache: Res<LightCache>,
    camera: Res<CameraView>,
    occluder: Res<SceneOccluder>,
    mut flare: ResMut<FlareState>,
) {
    let visible = cache.current().is_some_and(|light| {
        flare_visible(
            light,
            camera.fov_deg,
            config.0.light.flare_min_fov_deg,
            camera.position,
            occluder.0.as_ref(),
        )
    });
    if flare.visible != visible {
        flare.visible = visible;
    }
}

/// In live mode, send the camera gaze and field of view whenever they change.
pub fn forward_gaze(
    config: Res<BridgeConfigHandle>,
    sky: Res<SceneSky>,
    camera: Res<CameraView>,
    link: Res<BridgeLink>,
    mut gaze: ResMut<GazeForwarding>,
) {
    if sky.mode != BridgeMode::Live {
        *gaze = GazeForwarding::default();
        return;
    }

    let moved = gaze
        .last_forward
        .map_or(true, |last| last.distance_squared(camera.forward) > GAZE_EPSILON);
    if moved {
        gaze.last_forward = Some(camera.forward);
        let (az, alt) = gaze_to_view(camera.forward, config.0.site.north_angle_deg);
        link.send(BridgeRequest::SetViewDirection { az, alt });
    }

    if gaze.last_fov != Some(camera.fov_deg) {
        gaze.last_fov = Some(camera.fov_deg);
        link.send(BridgeRequest::SetFov {
            fov: camera.fov_deg,
        });
    }
}
