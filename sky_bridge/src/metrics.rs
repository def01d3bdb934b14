use bevy::prelude::*;

use crate::light::{LightCache, LightSource};
use crate::mode::BridgeMode;

/// Frame-loop counters, shown by the inspector and logged by the headless bridge.
#[derive(Resource, Default, Debug, Clone)]
pub struct BridgeMetrics {
    pub frames: u64,
    pub sky_updates: u64,
    pub sky_unavailable: u64,
    pub mode_transitions: u64,
    pub light_source_changes: u64,
    pub commands_completed: u64,
    pub commands_dropped: u64,
    pub light_source: Option<LightSource>,
    pub mode: BridgeMode,
}

pub fn collect_metrics(cache: Res<LightCache>, mut metrics: ResMut<BridgeMetrics>) {
    metrics.frames += 1;
    metrics.light_source_changes = cache.source_changes();
    metrics.light_source = cache.current().map(|light| light.source);
}
