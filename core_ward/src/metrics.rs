use bevy::prelude::*;

use crate::{resources::SimulationTick, ward::WardRegistry};

/// Per-tick telemetry about the ward engine.
#[derive(Resource, Default, Debug, Clone)]
pub struct WardMetrics {
    pub tick: u64,
    pub active_wards: u32,
    pub revives_total: u64,
    pub saves_total: u64,
    pub gave_up_total: u64,
    pub synced_wards_total: u64,
}

pub fn collect_metrics(
    tick: Res<SimulationTick>,
    registry: Res<WardRegistry>,
    mut metrics: ResMut<WardMetrics>,
) {
    metrics.tick = tick.0;
    metrics.active_wards = registry.len() as u32;
}
