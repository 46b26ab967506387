use bevy::{
    ecs::system::SystemParam,
    math::{IVec2, Vec2},
    prelude::*,
};
use tracing::{debug, info, warn};
use ward_proto::{WardMessage, WardSnapshot};

use crate::{
    components::{
        BodyParts, Creature, Denned, EnvExposure, GrabbedBy, Grip, Immunities, InTransit,
        PathIntent, RoomAssignment, TilePos, Velocity, Vitals, WorldPos,
    },
    effects::WardEffect,
    immunity::ImmunitySnapshot,
    metrics::WardMetrics,
    resources::{HazardBoard, NetIdMap, RoomRegistry, SimulationTick, TileGrid},
    safe_pos,
    sync::{Outbox, PendingSyncRequests, SessionRole},
    ward::{ward_power, Ward, WardError, WardModes, WardRegistry, WardRequest},
    ward_config::{GrabReleasePolicy, WardTuning, WardTuningHandle},
};

/// Resource half of the ward engine's working set.
#[derive(SystemParam)]
pub struct WardCtx<'w> {
    pub tuning: Res<'w, WardTuningHandle>,
    pub tick: Res<'w, SimulationTick>,
    pub grid: Res<'w, TileGrid>,
    pub rooms: Res<'w, RoomRegistry>,
    pub hazards: ResMut<'w, HazardBoard>,
    pub registry: ResMut<'w, WardRegistry>,
    pub session: Res<'w, SessionRole>,
    pub outbox: ResMut<'w, Outbox>,
    pub pending: ResMut<'w, PendingSyncRequests>,
    pub net_ids: Res<'w, NetIdMap>,
    pub metrics: ResMut<'w, WardMetrics>,
    pub effects: ResMut<'w, Events<WardEffect>>,
}

/// Creature-side queries of the ward engine's working set.
#[derive(SystemParam)]
pub struct CreatureQuery<'w, 's> {
    pub creatures: Query<'w, 's, &'static Creature>,
    pub vitals: Query<'w, 's, &'static mut Vitals>,
    pub positions: Query<'w, 's, (&'static mut TilePos, &'static mut WorldPos)>,
    pub velocities: Query<'w, 's, &'static mut Velocity>,
    pub bodies: Query<'w, 's, &'static BodyParts>,
    pub grabs: Query<'w, 's, &'static mut GrabbedBy>,
    pub grips: Query<'w, 's, &'static mut Grip>,
    pub exposure: Query<'w, 's, &'static mut EnvExposure>,
    pub immunities: Query<'w, 's, &'static mut Immunities>,
    pub assignments: Query<'w, 's, &'static mut RoomAssignment>,
    pub paths: Query<'w, 's, &'static mut PathIntent>,
    pub shelter: Query<'w, 's, (Option<&'static Denned>, Option<&'static InTransit>)>,
}

/// Everything a ward mutation needs. Host hook sites reach it through a
/// `SystemState` (see `interceptor`); the tick driver gets it as a system
/// parameter.
#[derive(SystemParam)]
pub struct WardParams<'w, 's> {
    pub ctx: WardCtx<'w>,
    pub q: CreatureQuery<'w, 's>,
}

enum WardFate {
    Keep,
    /// Target entity is gone; no immunity restore is possible.
    Lost,
    Destroy(&'static str),
}

/// Validates and installs a new ward over `target`, broadcasting the
/// creation to session peers.
pub fn create_ward(
    p: &mut WardParams,
    target: Entity,
    request: WardRequest,
) -> Result<(), WardError> {
    create_ward_inner(p, target, request, false)
}

pub(crate) fn create_ward_inner(
    p: &mut WardParams,
    target: Entity,
    request: WardRequest,
    from_network: bool,
) -> Result<(), WardError> {
    if !p.q.shelter.contains(target) {
        return Err(WardError::MissingTarget);
    }
    if !p.q.positions.contains(target) || !p.q.vitals.contains(target) {
        return Err(WardError::NotPlaced);
    }
    if p.ctx.registry.contains(target) {
        return Err(WardError::AlreadyWarded);
    }

    let tuning = p.ctx.tuning.get();
    let mass = p.q.creatures.get(target).map(|c| c.mass).unwrap_or(1.0);

    let mut original_immunities = ImmunitySnapshot::default();
    if let Ok(mut immunities) = p.q.immunities.get_mut(target) {
        original_immunities = ImmunitySnapshot::capture(&immunities);
        ImmunitySnapshot::grant_all(&mut immunities);
    }

    let room = p
        .q
        .positions
        .get(target)
        .ok()
        .and_then(|(tile, _)| p.ctx.rooms.room_at(tile.0));

    let ward = Ward {
        target,
        modes: request.modes,
        safe_pos: None,
        power: ward_power(mass),
        save_cooldown: 0,
        saving_throws: 0,
        revivals_left: request.revivals.unwrap_or(tuning.default_revivals),
        lifespan: request.lifespan,
        release: request.release,
        force_revive: request.force_revive,
        original_immunities,
        immunities_restored: false,
        room,
    };

    info!(
        target: "deathward::wards",
        event = "ward_created",
        entity = ?target,
        modes = ?ward.modes,
        lifespan = ward.lifespan,
        revivals = ward.revivals_left,
        from_network,
    );

    if !from_network && p.ctx.session.online() {
        push_request_message(&mut p.ctx.outbox, &p.ctx.net_ids, &ward);
    }

    p.ctx.registry.register(target, ward)
}

/// Tears down a ward: immunities restored first, then the registry entry is
/// dropped and peers are told.
pub fn destroy_ward(
    p: &mut WardParams,
    target: Entity,
    reason: &str,
    from_network: bool,
) -> bool {
    if let Some(ward) = p.ctx.registry.get_mut(target) {
        if !ward.immunities_restored {
            if let Ok(mut immunities) = p.q.immunities.get_mut(ward.target) {
                ward.original_immunities.restore(&mut immunities);
            }
            ward.immunities_restored = true;
        }
    } else {
        return false;
    }

    let Some(ward) = p.ctx.registry.remove(target) else {
        return false;
    };
    info!(
        target: "deathward::wards",
        event = "ward_destroyed",
        entity = ?target,
        reason,
        from_network,
    );
    if !from_network && p.ctx.session.online() {
        push_stop_message(&mut p.ctx.outbox, &p.ctx.net_ids, &ward);
    }
    true
}

/// Same teardown for a ward already taken out of the registry.
fn conclude_ward(p: &mut WardParams, ward: &mut Ward, reason: &str, from_network: bool) {
    restore_immunities(&mut p.q.immunities, ward);
    info!(
        target: "deathward::wards",
        event = "ward_destroyed",
        entity = ?ward.target,
        reason,
        from_network,
    );
    if !from_network && p.ctx.session.online() {
        push_stop_message(&mut p.ctx.outbox, &p.ctx.net_ids, ward);
    }
}

fn restore_immunities(immunities: &mut Query<&mut Immunities>, ward: &mut Ward) {
    if ward.immunities_restored {
        return;
    }
    if let Ok(mut target_immunities) = immunities.get_mut(ward.target) {
        ward.original_immunities.restore(&mut target_immunities);
    }
    ward.immunities_restored = true;
}

fn push_request_message(outbox: &mut Outbox, net_ids: &NetIdMap, ward: &Ward) {
    match net_ids.id_of(ward.target) {
        Some(net_id) => outbox.push(WardMessage::RequestProtection(ward.snapshot(net_id))),
        None => debug!(
            target: "deathward::sync",
            entity = ?ward.target,
            "ward creation not broadcast, target has no net id"
        ),
    }
}

fn push_stop_message(outbox: &mut Outbox, net_ids: &NetIdMap, ward: &Ward) {
    match net_ids.id_of(ward.target) {
        Some(net_id) => outbox.push(WardMessage::StopProtection(ward.snapshot(net_id))),
        None => debug!(
            target: "deathward::sync",
            entity = ?ward.target,
            "ward teardown not broadcast, target has no net id"
        ),
    }
}

/// Per-tick pass over every live ward, in deterministic registry order.
pub fn update_wards(mut p: WardParams) {
    let tuning = p.ctx.tuning.get();
    for target in p.ctx.registry.targets() {
        let Some(mut ward) = p.ctx.registry.take(target) else {
            continue;
        };
        match tick_ward(&mut p, &mut ward, &tuning) {
            WardFate::Keep => p.ctx.registry.put_back(target, ward),
            WardFate::Lost => {
                warn!(
                    target: "deathward::wards",
                    event = "ward_target_lost",
                    entity = ?target,
                );
            }
            WardFate::Destroy(reason) => conclude_ward(&mut p, &mut ward, reason, false),
        }
    }
}

fn tick_ward(p: &mut WardParams, ward: &mut Ward, tuning: &WardTuning) -> WardFate {
    let target = ward.target;

    // unreachable target: the sweep half of the registry contract
    if !p.q.shelter.contains(target) {
        return WardFate::Lost;
    }
    let Ok((tile, _)) = p.q.positions.get(target) else {
        return WardFate::Destroy("target_unplaced");
    };
    let pos = tile.0;

    // continuous protective effects gated by the mode flags
    if ward.modes.has(WardModes::ENVIRONMENT) {
        if let Ok(mut exposure) = p.q.exposure.get_mut(target) {
            exposure.clear();
        }
        p.ctx.hazards.detach(target);
    }
    if ward.modes.has(WardModes::VIOLENCE) {
        if let Ok(mut vitals) = p.q.vitals.get_mut(target) {
            vitals.pending_damage = 0.0;
        }
        let found_holders = release_grabs(p, target, tuning.holder_stun_ticks, false);
        if found_holders && tuning.grab_release_policy == GrabReleasePolicy::EarlyReturn {
            return WardFate::Keep;
        }
    }

    // the ward's own placement follows its target
    let current_room = p.ctx.rooms.room_at(pos);
    if current_room.is_some() {
        ward.room = current_room;
    }
    if let Ok(mut assignment) = p.q.assignments.get_mut(target) {
        assignment.current = current_room;
        if current_room.is_some() {
            assignment.last_known = current_room;
        }
    }

    // safe position refresh
    if ward.modes.has(WardModes::DESTRUCTION) {
        let tolerates = p
            .q
            .creatures
            .get(target)
            .map(|c| c.tolerates_deep_water)
            .unwrap_or(false);
        let advance = if ward.safe_pos.is_none() {
            // first fill: only the tile itself has to qualify
            safe_pos::tile_qualifies(&p.ctx.grid, pos, tolerates)
        } else {
            match p.q.vitals.get(target) {
                Ok(vitals) => safe_pos::should_update_safe_pos(
                    ward,
                    vitals,
                    p.q.grabs.get(target).ok(),
                    tolerates,
                    pos,
                    &p.ctx.grid,
                ),
                Err(_) => false,
            }
        };
        if advance {
            ward.safe_pos = Some(pos);
            ward.saving_throws = ward.saving_throws.saturating_sub(1);
        }
    }

    // outside every room with a known safe spot: rescue now rather than
    // waiting for a destroy hook that may never fire
    if current_room.is_none() && ward.safe_pos.is_some() {
        let saved = save_from_destruction(p, ward, tuning);
        if !saved {
            debug!(
                target: "deathward::saves",
                event = "defensive_save_failed",
                entity = ?target,
            );
        }
    }

    ward.save_cooldown = ward.save_cooldown.saturating_sub(1);

    let dead = p.q.vitals.get(target).map(|v| v.is_dead()).unwrap_or(false);
    if dead {
        let can_revive = ward.force_revive && ward.revivals_left > 0 && ward.save_cooldown == 0;
        if can_revive {
            revive(p, ward, tuning);
        } else {
            return WardFate::Destroy("target_died");
        }
    }

    // lifespan countdown, then the release condition
    if ward.is_indefinite() {
        return WardFate::Keep;
    }
    if ward.lifespan > 0 {
        ward.lifespan -= 1;
    }
    if ward.lifespan == 0 {
        let satisfied = p
            .q
            .vitals
            .get(target)
            .map(|vitals| safe_pos::release_satisfied(ward.release, vitals, &p.ctx.grid, pos))
            .unwrap_or(false);
        if satisfied {
            return WardFate::Destroy("ward_expired");
        }
    }
    WardFate::Keep
}

fn revive(p: &mut WardParams, ward: &mut Ward, tuning: &WardTuning) {
    if let Ok(mut vitals) = p.q.vitals.get_mut(ward.target) {
        vitals.revive();
    }
    if let Ok(mut path) = p.q.paths.get_mut(ward.target) {
        path.goal = None;
    }
    ward.save_cooldown = tuning.revive_cooldown_ticks;
    ward.revivals_left = ward.revivals_left.saturating_sub(1);
    p.ctx.metrics.revives_total += 1;
    if let Ok((_, world_pos)) = p.q.positions.get(ward.target) {
        let at = world_pos.0;
        p.ctx.effects.send(WardEffect::RevivalBurst { at });
    }
    info!(
        target: "deathward::wards",
        event = "ward_revive",
        entity = ?ward.target,
        revivals_left = ward.revivals_left,
    );
}

/// Releases hostile grabs on `target`, back-to-front. Holder entries that no
/// longer resolve are dropped; warded holders are skipped unless `force`.
/// Returns whether the pass found any holder at all.
fn release_grabs(p: &mut WardParams, target: Entity, stun_ticks: u32, force: bool) -> bool {
    let holders: Vec<Entity> = match p.q.grabs.get(target) {
        Ok(grabbed) => grabbed.0.clone(),
        Err(_) => return false,
    };
    if holders.is_empty() {
        return false;
    }
    for &holder in holders.iter().rev() {
        if !p.q.shelter.contains(holder) {
            warn!(
                target: "deathward::wards",
                event = "grab_holder_invalid",
                entity = ?target,
                holder = ?holder,
            );
            remove_holder_entry(&mut p.q.grabs, target, holder);
            continue;
        }
        if !force && p.ctx.registry.contains(holder) {
            continue;
        }
        if let Ok(mut grip) = p.q.grips.get_mut(holder) {
            if grip.held == Some(target) {
                grip.held = None;
            }
        }
        if let Ok(mut vitals) = p.q.vitals.get_mut(holder) {
            vitals.stun_ticks = vitals.stun_ticks.max(stun_ticks);
        }
        remove_holder_entry(&mut p.q.grabs, target, holder);
    }
    true
}

fn remove_holder_entry(grabs: &mut Query<&mut GrabbedBy>, target: Entity, holder: Entity) {
    if let Ok(mut grabbed) = grabs.get_mut(target) {
        if let Some(index) = grabbed.0.iter().rposition(|&entry| entry == holder) {
            grabbed.0.remove(index);
        }
    }
}

/// Rescue a creature from forced destruction by relocating it to its
/// recorded safe tile. Returns true when destruction should be suppressed.
pub(crate) fn save_from_destruction(
    p: &mut WardParams,
    ward: &mut Ward,
    tuning: &WardTuning,
) -> bool {
    let target = ward.target;

    let Ok((denned, in_transit)) = p.q.shelter.get(target) else {
        return false;
    };
    if denned.is_some() || in_transit.is_some() {
        return false;
    }
    if !ward.modes.has(WardModes::DESTRUCTION) {
        return false;
    }
    let Some(safe) = ward.safe_pos else {
        return false;
    };
    if ward.saving_throws >= tuning.saving_throw_cap {
        // the ward has given up; destruction proceeds for real
        return false;
    }
    if ward.save_cooldown > 0 {
        return true;
    }

    // region fallback chain: the creature's current room, the room owning
    // the safe tile, the ward's own placement, the last room on record
    let current_room = p
        .q
        .positions
        .get(target)
        .ok()
        .and_then(|(tile, _)| p.ctx.rooms.room_at(tile.0));
    let room = current_room
        .or_else(|| p.ctx.rooms.room_at(safe))
        .or(ward.room)
        .or_else(|| {
            p.q.assignments
                .get(target)
                .ok()
                .and_then(|assignment| assignment.last_known)
        });
    let Some(room) = room else {
        warn!(
            target: "deathward::saves",
            event = "save_room_unresolved",
            entity = ?target,
        );
        return false;
    };
    ward.room = Some(room);

    let midpoint = TileGrid::midpoint(safe);
    let mut bodies: Vec<Entity> = vec![target];
    if let Ok(parts) = p.q.bodies.get(target) {
        bodies.extend(parts.0.iter().copied());
    }
    for &entity in &bodies {
        if let Ok((mut tile, mut world_pos)) = p.q.positions.get_mut(entity) {
            tile.0 = safe;
            world_pos.0 = midpoint;
        }
        if let Ok(mut velocity) = p.q.velocities.get_mut(entity) {
            velocity.0 = Vec2::new(0.0, tuning.launch_impulse);
        }
    }
    release_grabs(p, target, tuning.holder_stun_ticks, true);

    ward.saving_throws += 1;
    ward.save_cooldown = tuning.revive_cooldown_ticks;
    p.ctx.metrics.saves_total += 1;
    if ward.saving_throws >= tuning.saving_throw_cap {
        p.ctx.metrics.gave_up_total += 1;
        warn!(
            target: "deathward::saves",
            event = "ward_gave_up",
            entity = ?target,
            saving_throws = ward.saving_throws,
        );
    }
    p.ctx.effects.send(WardEffect::Shockwave {
        at: midpoint,
        power: ward.power,
    });
    info!(
        target: "deathward::saves",
        event = "destruction_save",
        entity = ?target,
        x = safe.x,
        y = safe.y,
        saving_throws = ward.saving_throws,
        room = %room,
    );
    true
}

/// Idempotent apply of an inbound snapshot; bypasses the already-warded
/// check by overwriting the live ward instead.
pub(crate) fn apply_ward_snapshot(
    p: &mut WardParams,
    target: Entity,
    snapshot: &WardSnapshot,
) -> Result<(), WardError> {
    if p.ctx.registry.contains(target) {
        if let Some(ward) = p.ctx.registry.get_mut(target) {
            ward.apply_snapshot(snapshot);
        }
        return Ok(());
    }
    let request = WardRequest {
        modes: WardModes::from_bits_truncate(snapshot.modes),
        lifespan: i32::from(snapshot.lifespan),
        force_revive: snapshot.force_revive,
        revivals: Some(snapshot.revivals_left),
        ..Default::default()
    };
    create_ward_inner(p, target, request, true)?;
    if let Some(ward) = p.ctx.registry.get_mut(target) {
        ward.safe_pos = snapshot.safe_pos.map(|(x, y)| IVec2::new(x, y));
        ward.save_cooldown = snapshot.save_cooldown;
    }
    Ok(())
}

/// Convenience entry for hosts holding a `&mut World`.
pub fn request_ward(
    world: &mut World,
    target: Entity,
    request: WardRequest,
) -> Result<(), WardError> {
    let mut state: bevy::ecs::system::SystemState<WardParams> =
        bevy::ecs::system::SystemState::new(world);
    let mut p = state.get_mut(world);
    let result = create_ward(&mut p, target, request);
    state.apply(world);
    result
}

/// Convenience teardown for hosts holding a `&mut World`.
pub fn stop_ward(world: &mut World, target: Entity) -> bool {
    let mut state: bevy::ecs::system::SystemState<WardParams> =
        bevy::ecs::system::SystemState::new(world);
    let mut p = state.get_mut(world);
    let result = destroy_ward(&mut p, target, "host_request", false);
    state.apply(world);
    result
}

pub fn advance_tick(mut tick: ResMut<SimulationTick>) {
    tick.0 = tick.0.wrapping_add(1);
}
