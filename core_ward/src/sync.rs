//! Session synchronization for ward state.
//!
//! Everything here runs on the tick thread: inbound messages are applied by
//! the host through [`apply_message`] between ticks, never mid-update, and
//! outbound traffic is queued on the [`Outbox`] for whatever transport the
//! session uses.

use bevy::{ecs::system::SystemState, prelude::*};
use tracing::{debug, info, warn};
use ward_proto::{WardMessage, WardSnapshot};

use crate::{
    resources::NetIdMap,
    systems::{self, WardParams},
    ward::WardRegistry,
};

/// Role this process plays in the session.
#[derive(Resource, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionRole {
    /// Source of truth for full-state sync. A solo session is its own
    /// authority.
    #[default]
    Authority,
    Client,
    /// No session; outbound traffic is suppressed.
    Offline,
}

impl SessionRole {
    pub fn is_authority(self) -> bool {
        matches!(self, SessionRole::Authority)
    }

    pub fn online(self) -> bool {
        !matches!(self, SessionRole::Offline)
    }
}

/// Outbound message queue.
#[derive(Resource, Debug, Default)]
pub struct Outbox {
    messages: Vec<WardMessage>,
}

impl Outbox {
    pub fn push(&mut self, message: WardMessage) {
        self.messages.push(message);
    }

    pub fn drain(&mut self) -> Vec<WardMessage> {
        std::mem::take(&mut self.messages)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Session participant identifier, assigned by the host transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerId(pub u64);

#[derive(Debug, Clone)]
pub struct PendingSync {
    pub peer: PeerId,
    pub ticks_left: u32,
}

/// Outstanding full-sync requests awaiting an authoritative reply. An entry
/// that runs out of ticks is abandoned: nothing is rolled back and nothing
/// retries.
#[derive(Resource, Debug, Clone, Default)]
pub struct PendingSyncRequests {
    pub entries: Vec<PendingSync>,
}

impl PendingSyncRequests {
    /// Starts (or restarts) the countdown for a peer's expected sync.
    pub fn track(&mut self, peer: PeerId, ttl_ticks: u32) {
        self.entries.retain(|entry| entry.peer != peer);
        self.entries.push(PendingSync {
            peer,
            ticks_left: ttl_ticks,
        });
    }

    pub fn contains(&self, peer: PeerId) -> bool {
        self.entries.iter().any(|entry| entry.peer == peer)
    }

    /// Clears every outstanding entry; returns whether any existed.
    pub fn settle(&mut self) -> bool {
        let had_any = !self.entries.is_empty();
        self.entries.clear();
        had_any
    }
}

/// Arms the countdown for a full sync the host has just asked `peer` for.
pub fn expect_full_sync(
    pending: &mut PendingSyncRequests,
    tuning: &crate::ward_config::WardTuning,
    peer: PeerId,
) {
    pending.track(peer, tuning.sync_request_ttl_ticks);
    debug!(
        target: "deathward::sync",
        event = "sync_request_tracked",
        peer = peer.0,
        ttl = tuning.sync_request_ttl_ticks,
    );
}

/// Per-tick countdown over outstanding sync requests.
pub fn expire_sync_requests(mut pending: ResMut<PendingSyncRequests>) {
    pending.entries.retain_mut(|entry| {
        entry.ticks_left = entry.ticks_left.saturating_sub(1);
        if entry.ticks_left == 0 {
            warn!(
                target: "deathward::sync",
                event = "sync_request_abandoned",
                peer = entry.peer.0,
            );
            false
        } else {
            true
        }
    });
}

/// Builds the authoritative full-sync frame for a joining peer. Wards whose
/// targets have no net id cannot travel and are skipped.
pub fn build_full_sync(
    registry: &WardRegistry,
    net_ids: &NetIdMap,
    role: SessionRole,
) -> Option<WardMessage> {
    if !role.is_authority() {
        return None;
    }
    let mut wards: Vec<WardSnapshot> = Vec::with_capacity(registry.len());
    for (target, ward) in registry.iter() {
        match net_ids.id_of(target) {
            Some(net_id) => wards.push(ward.snapshot(net_id)),
            None => debug!(
                target: "deathward::sync",
                entity = ?target,
                "ward omitted from full sync, target has no net id"
            ),
        }
    }
    wards.sort_unstable_by_key(|snapshot| snapshot.target);
    Some(WardMessage::SyncWards {
        from_authority: true,
        wards,
    })
}

/// Applies one inbound session message. Call between ticks only.
pub fn apply_message(world: &mut World, message: WardMessage) {
    match message {
        WardMessage::RequestProtection(snapshot) => apply_request(world, &snapshot),
        WardMessage::StopProtection(snapshot) => apply_stop(world, &snapshot),
        WardMessage::SyncWards {
            from_authority,
            wards,
        } => apply_full_sync(world, from_authority, &wards),
    }
}

fn apply_request(world: &mut World, snapshot: &WardSnapshot) {
    let mut state: SystemState<WardParams> = SystemState::new(world);
    let mut p = state.get_mut(world);
    let Some(target) = p.ctx.net_ids.resolve(snapshot.target) else {
        warn!(
            target: "deathward::sync",
            event = "snapshot_dropped",
            net_id = snapshot.target,
            "no local creature for inbound ward"
        );
        return;
    };
    if let Err(err) = systems::apply_ward_snapshot(&mut p, target, snapshot) {
        warn!(
            target: "deathward::sync",
            event = "snapshot_rejected",
            net_id = snapshot.target,
            error = %err,
        );
    }
    state.apply(world);
}

fn apply_stop(world: &mut World, snapshot: &WardSnapshot) {
    let mut state: SystemState<WardParams> = SystemState::new(world);
    let mut p = state.get_mut(world);
    let Some(target) = p.ctx.net_ids.resolve(snapshot.target) else {
        warn!(
            target: "deathward::sync",
            event = "snapshot_dropped",
            net_id = snapshot.target,
            "no local creature for inbound ward stop"
        );
        return;
    };
    if !systems::destroy_ward(&mut p, target, "peer_request", true) {
        debug!(
            target: "deathward::sync",
            entity = ?target,
            "peer stopped a ward that was not live here"
        );
    }
    state.apply(world);
}

fn apply_full_sync(world: &mut World, from_authority: bool, wards: &[WardSnapshot]) {
    let role = *world.resource::<SessionRole>();
    if role.is_authority() {
        warn!(
            target: "deathward::sync",
            event = "sync_rejected",
            "authority ignoring a foreign full sync"
        );
        return;
    }
    if !from_authority {
        warn!(
            target: "deathward::sync",
            event = "sync_rejected",
            "full sync did not come from the authority"
        );
        return;
    }

    let mut state: SystemState<WardParams> = SystemState::new(world);
    let mut p = state.get_mut(world);
    if p.ctx.pending.settle() {
        debug!(target: "deathward::sync", "pending sync request settled");
    }

    // wholesale replace: every local ward is torn down cleanly first
    for target in p.ctx.registry.targets() {
        systems::destroy_ward(&mut p, target, "session_sync_replace", true);
    }

    let mut applied = 0usize;
    for snapshot in wards {
        let Some(target) = p.ctx.net_ids.resolve(snapshot.target) else {
            warn!(
                target: "deathward::sync",
                event = "snapshot_dropped",
                net_id = snapshot.target,
                "no local creature for synced ward"
            );
            continue;
        };
        match systems::apply_ward_snapshot(&mut p, target, snapshot) {
            Ok(()) => applied += 1,
            Err(err) => warn!(
                target: "deathward::sync",
                event = "snapshot_rejected",
                net_id = snapshot.target,
                error = %err,
            ),
        }
    }
    p.ctx.metrics.synced_wards_total += applied as u64;
    info!(
        target: "deathward::sync",
        event = "ward_sync_applied",
        applied,
        dropped = wards.len() - applied,
    );
    state.apply(world);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        components::{CreatureBundle, Immunities},
        effects::{WardEffect, WardEffectLog},
        metrics::WardMetrics,
        resources::{HazardBoard, RoomRegistry, SimulationTick, TileGrid, TileKind},
        systems::request_ward,
        ward::{WardModes, WardRequest},
        ward_config::WardTuningHandle,
    };
    use bevy::math::IVec2;
    use bevy_ecs::system::RunSystemOnce;

    fn sync_world(role: SessionRole) -> World {
        let mut world = World::default();
        let mut grid = TileGrid::filled(16, 16, TileKind::Open);
        for x in 0..16 {
            grid.set(IVec2::new(x, 0), TileKind::Solid);
        }
        world.insert_resource(WardTuningHandle::default());
        world.insert_resource(SimulationTick::default());
        world.insert_resource(grid);
        world.insert_resource(RoomRegistry::default());
        world.insert_resource(HazardBoard::default());
        world.insert_resource(NetIdMap::default());
        world.insert_resource(WardRegistry::default());
        world.insert_resource(role);
        world.insert_resource(Outbox::default());
        world.insert_resource(PendingSyncRequests::default());
        world.insert_resource(WardMetrics::default());
        world.insert_resource(WardEffectLog::default());
        world.init_resource::<Events<WardEffect>>();
        world
    }

    fn spawn_bound_creature(world: &mut World, net_id: u64) -> Entity {
        let entity = world.spawn(CreatureBundle::at(IVec2::new(3, 1))).id();
        world.resource_mut::<NetIdMap>().bind(net_id, entity);
        entity
    }

    fn sample_snapshot(net_id: u64) -> WardSnapshot {
        WardSnapshot {
            target: net_id,
            modes: WardModes::ALL.bits(),
            safe_pos: Some((3, 1)),
            save_cooldown: 4,
            revivals_left: 2,
            lifespan: 600,
            force_revive: true,
        }
    }

    #[test]
    fn inbound_request_reconstructs_a_ward_without_echo() {
        let mut world = sync_world(SessionRole::Client);
        let target = spawn_bound_creature(&mut world, 5);

        apply_message(&mut world, WardMessage::RequestProtection(sample_snapshot(5)));

        let ward = world
            .resource::<WardRegistry>()
            .get(target)
            .expect("ward reconstructed")
            .clone();
        assert_eq!(ward.safe_pos, Some(IVec2::new(3, 1)));
        assert_eq!(ward.save_cooldown, 4);
        assert_eq!(ward.revivals_left, 2);
        assert_eq!(ward.lifespan, 600);
        assert!(ward.force_revive);
        assert!(world.resource::<Outbox>().is_empty());
    }

    #[test]
    fn inbound_request_is_idempotent() {
        let mut world = sync_world(SessionRole::Client);
        let target = spawn_bound_creature(&mut world, 5);

        apply_message(&mut world, WardMessage::RequestProtection(sample_snapshot(5)));
        let mut second = sample_snapshot(5);
        second.revivals_left = 1;
        apply_message(&mut world, WardMessage::RequestProtection(second));

        assert_eq!(world.resource::<WardRegistry>().len(), 1);
        let ward = world.resource::<WardRegistry>().get(target).unwrap();
        assert_eq!(ward.revivals_left, 1);
    }

    #[test]
    fn inbound_stop_restores_immunities_and_stays_quiet() {
        let mut world = sync_world(SessionRole::Client);
        let target = spawn_bound_creature(&mut world, 5);
        world.get_mut::<Immunities>(target).unwrap().hazard = true;

        apply_message(&mut world, WardMessage::RequestProtection(sample_snapshot(5)));
        assert!(world.get::<Immunities>(target).unwrap().drowning);

        apply_message(&mut world, WardMessage::StopProtection(sample_snapshot(5)));
        assert!(world.resource::<WardRegistry>().is_empty());
        let immunities = world.get::<Immunities>(target).unwrap();
        assert!(!immunities.drowning && immunities.hazard);
        assert!(world.resource::<Outbox>().is_empty());
    }

    #[test]
    fn unresolved_net_id_is_dropped_not_fatal() {
        let mut world = sync_world(SessionRole::Client);
        apply_message(&mut world, WardMessage::RequestProtection(sample_snapshot(99)));
        assert!(world.resource::<WardRegistry>().is_empty());
    }

    #[test]
    fn authority_rejects_foreign_full_sync() {
        let mut world = sync_world(SessionRole::Authority);
        let target = spawn_bound_creature(&mut world, 5);
        request_ward(&mut world, target, WardRequest::default()).expect("local ward");

        apply_message(
            &mut world,
            WardMessage::SyncWards {
                from_authority: true,
                wards: Vec::new(),
            },
        );

        // local state untouched
        assert_eq!(world.resource::<WardRegistry>().len(), 1);
    }

    #[test]
    fn client_rejects_sync_not_claiming_authority() {
        let mut world = sync_world(SessionRole::Client);
        spawn_bound_creature(&mut world, 5);
        apply_message(
            &mut world,
            WardMessage::SyncWards {
                from_authority: false,
                wards: vec![sample_snapshot(5)],
            },
        );
        assert!(world.resource::<WardRegistry>().is_empty());
    }

    #[test]
    fn full_sync_replaces_local_state_and_skips_unresolved_entries() {
        let mut world = sync_world(SessionRole::Client);
        let stale = spawn_bound_creature(&mut world, 5);
        let fresh = spawn_bound_creature(&mut world, 6);
        apply_message(&mut world, WardMessage::RequestProtection(sample_snapshot(5)));
        world.resource_mut::<PendingSyncRequests>().track(PeerId(1), 30);

        apply_message(
            &mut world,
            WardMessage::SyncWards {
                from_authority: true,
                wards: vec![sample_snapshot(6), sample_snapshot(42)],
            },
        );

        let registry = world.resource::<WardRegistry>();
        assert!(registry.get(stale).is_none());
        assert!(registry.get(fresh).is_some());
        assert_eq!(registry.len(), 1);
        assert!(!world
            .resource::<PendingSyncRequests>()
            .contains(PeerId(1)));
        assert_eq!(world.resource::<WardMetrics>().synced_wards_total, 1);
    }

    #[test]
    fn authority_builds_a_deterministic_full_sync() {
        let mut world = sync_world(SessionRole::Authority);
        let b = spawn_bound_creature(&mut world, 8);
        let a = spawn_bound_creature(&mut world, 2);
        request_ward(&mut world, a, WardRequest::default()).expect("ward a");
        request_ward(&mut world, b, WardRequest::default()).expect("ward b");

        let message = build_full_sync(
            world.resource::<WardRegistry>(),
            world.resource::<NetIdMap>(),
            SessionRole::Authority,
        )
        .expect("authority frame");
        match message {
            WardMessage::SyncWards {
                from_authority,
                wards,
            } => {
                assert!(from_authority);
                let ids: Vec<u64> = wards.iter().map(|snapshot| snapshot.target).collect();
                assert_eq!(ids, vec![2, 8]);
            }
            other => panic!("unexpected frame: {other:?}"),
        }

        assert!(build_full_sync(
            world.resource::<WardRegistry>(),
            world.resource::<NetIdMap>(),
            SessionRole::Client,
        )
        .is_none());
    }

    #[test]
    fn unanswered_sync_requests_expire() {
        let mut world = sync_world(SessionRole::Client);
        world.resource_mut::<PendingSyncRequests>().track(PeerId(4), 2);

        world.run_system_once(expire_sync_requests);
        assert!(world.resource::<PendingSyncRequests>().contains(PeerId(4)));
        world.run_system_once(expire_sync_requests);
        assert!(!world.resource::<PendingSyncRequests>().contains(PeerId(4)));
    }

    #[test]
    fn expected_syncs_run_on_the_configured_countdown() {
        let mut pending = PendingSyncRequests::default();
        let tuning = crate::ward_config::WardTuning::default();
        expect_full_sync(&mut pending, &tuning, PeerId(2));
        assert_eq!(pending.entries.len(), 1);
        assert_eq!(pending.entries[0].ticks_left, tuning.sync_request_ttl_ticks);

        // re-arming replaces the old countdown instead of stacking
        expect_full_sync(&mut pending, &tuning, PeerId(2));
        assert_eq!(pending.entries.len(), 1);
    }
}
