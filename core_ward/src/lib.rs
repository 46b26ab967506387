//! Death-prevention engine for a tick-driven, tile-based multiplayer
//! simulation.
//!
//! Each protected creature gets one [`Ward`]: a state machine that suppresses
//! kills, neutralizes environmental harm, rescues the creature back to its
//! last safe tile when something tries to destroy it, and keeps all of that
//! consistent across session peers. [`build_headless_app`] wires the chained
//! per-tick systems; host death/destroy/damage call sites consult
//! [`interceptor`]; inbound session traffic goes through
//! [`sync::apply_message`] between ticks.

mod components;
pub mod effects;
mod immunity;
pub mod interceptor;
pub mod metrics;
pub mod network;
mod resources;
pub mod safe_pos;
pub mod sync;
mod systems;
mod ward;
pub mod ward_config;

use bevy::prelude::*;

pub use components::{
    BodyParts, Creature, CreatureBundle, Denned, EnvExposure, GrabbedBy, Grip, Immunities,
    InTransit, PathIntent, RoomAssignment, TilePos, Velocity, Vitals, WorldPos,
};
pub use effects::{WardEffect, WardEffectLog};
pub use immunity::ImmunitySnapshot;
pub use metrics::WardMetrics;
pub use resources::{
    HazardBoard, NetIdMap, Room, RoomId, RoomRegistry, SimulationTick, TileGrid, TileKind,
};
pub use sync::{Outbox, PeerId, PendingSyncRequests, SessionRole};
pub use systems::{
    advance_tick, create_ward, destroy_ward, request_ward, stop_ward, update_wards, CreatureQuery,
    WardCtx, WardParams,
};
pub use ward::{
    ward_power, ReleaseCondition, Ward, WardError, WardModes, WardRegistry, WardRequest,
    INDEFINITE,
};
pub use ward_config::{GrabReleasePolicy, WardTuning, WardTuningHandle};

/// Construct a Bevy [`App`] configured with the ward engine's tick pipeline.
pub fn build_headless_app() -> App {
    let mut app = App::new();

    app.insert_resource(WardTuningHandle::default())
        .insert_resource(resources::SimulationTick::default())
        .insert_resource(resources::TileGrid::default())
        .insert_resource(resources::RoomRegistry::default())
        .insert_resource(resources::HazardBoard::default())
        .insert_resource(resources::NetIdMap::default())
        .insert_resource(ward::WardRegistry::default())
        .insert_resource(sync::SessionRole::default())
        .insert_resource(sync::Outbox::default())
        .insert_resource(sync::PendingSyncRequests::default())
        .insert_resource(effects::WardEffectLog::default())
        .insert_resource(metrics::WardMetrics::default())
        .add_event::<effects::WardEffect>()
        .add_plugins(MinimalPlugins)
        .add_systems(
            Update,
            (
                systems::update_wards,
                sync::expire_sync_requests,
                effects::record_effects,
                metrics::collect_metrics,
                systems::advance_tick,
            )
                .chain(),
        );

    app
}

/// Execute a single simulation tick.
///
/// Inbound session messages must be applied between calls, never mid-tick;
/// see [`sync::apply_message`].
pub fn run_tick(app: &mut App) {
    app.update();
}

/// Install an env-filtered fmt subscriber for interactive runs. Safe to call
/// more than once; later calls are ignored.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}
