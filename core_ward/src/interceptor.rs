//! Decision surface for the host's death, destroy, and damage call sites.
//!
//! The suppression queries are pure reads against the registry; only
//! [`try_save_from_destruction`] mutates the world, and hosts hand it a
//! `&mut World` at the destroy hook.

use bevy::{ecs::system::SystemState, prelude::*};

use crate::{
    systems::{self, WardParams},
    ward::{WardModes, WardRegistry},
    ward_config::{WardTuning, WardTuningHandle},
};

/// Harm categories host call sites ask about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DamageSource {
    Attack,
    Grab,
    Drowning,
    Weather,
    HazardFlora,
    Collapse,
    Void,
}

impl DamageSource {
    /// The ward mode that must be set for this source to be suppressed.
    pub fn required_mode(self) -> WardModes {
        match self {
            DamageSource::Attack | DamageSource::Grab => WardModes::VIOLENCE,
            DamageSource::Drowning | DamageSource::Weather | DamageSource::HazardFlora => {
                WardModes::ENVIRONMENT
            }
            DamageSource::Collapse | DamageSource::Void => WardModes::DESTRUCTION,
        }
    }
}

/// Kill attempts are suppressed for violence wards, and for revival wards
/// that still have budget: letting the kill through would skip their revive
/// step entirely.
pub fn should_suppress_death(registry: &WardRegistry, entity: Entity) -> bool {
    registry.get(entity).map_or(false, |ward| {
        ward.modes.has(WardModes::VIOLENCE) || (ward.force_revive && ward.revivals_left > 0)
    })
}

pub fn should_suppress_destroy(
    registry: &WardRegistry,
    tuning: &WardTuning,
    entity: Entity,
) -> bool {
    registry.get(entity).map_or(false, |ward| {
        ward.modes.has(WardModes::DESTRUCTION)
            && ward.safe_pos.is_some()
            && ward.saving_throws < tuning.saving_throw_cap
    })
}

pub fn should_suppress_damage_from(
    registry: &WardRegistry,
    source: DamageSource,
    entity: Entity,
) -> bool {
    registry
        .get(entity)
        .map_or(false, |ward| ward.modes.has(source.required_mode()))
}

/// World-level convenience for hook sites that only hold a `&World`.
pub fn death_suppressed(world: &World, entity: Entity) -> bool {
    should_suppress_death(world.resource::<WardRegistry>(), entity)
}

pub fn destroy_suppressed(world: &World, entity: Entity) -> bool {
    let tuning = world.resource::<WardTuningHandle>().get();
    should_suppress_destroy(world.resource::<WardRegistry>(), &tuning, entity)
}

pub fn damage_suppressed(world: &World, source: DamageSource, entity: Entity) -> bool {
    should_suppress_damage_from(world.resource::<WardRegistry>(), source, entity)
}

/// Entry point for the host's destroy call site. Returns true when the
/// destruction was suppressed and the creature relocated to its safe tile.
pub fn try_save_from_destruction(world: &mut World, target: Entity) -> bool {
    let mut state: SystemState<WardParams> = SystemState::new(world);
    let mut p = state.get_mut(world);
    let tuning = p.ctx.tuning.get();
    let Some(mut ward) = p.ctx.registry.take(target) else {
        return false;
    };
    let saved = systems::save_from_destruction(&mut p, &mut ward, &tuning);
    p.ctx.registry.put_back(target, ward);
    state.apply(world);
    saved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        components::{CreatureBundle, Denned, TilePos, Vitals},
        effects::{WardEffect, WardEffectLog},
        metrics::WardMetrics,
        resources::{
            HazardBoard, NetIdMap, RoomRegistry, SimulationTick, TileGrid, TileKind,
        },
        sync::{Outbox, PendingSyncRequests, SessionRole},
        systems::request_ward,
        ward::WardRequest,
    };
    use bevy::math::IVec2;

    fn hook_world() -> World {
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
        world.insert_resource(SessionRole::default());
        world.insert_resource(Outbox::default());
        world.insert_resource(PendingSyncRequests::default());
        world.insert_resource(WardMetrics::default());
        world.insert_resource(WardEffectLog::default());
        world.init_resource::<Events<WardEffect>>();
        world
    }

    fn warded_creature(world: &mut World) -> Entity {
        let target = world.spawn(CreatureBundle::at(IVec2::new(3, 1))).id();
        request_ward(world, target, WardRequest::default()).expect("ward");
        world
            .resource_mut::<WardRegistry>()
            .get_mut(target)
            .unwrap()
            .safe_pos = Some(IVec2::new(3, 1));
        target
    }

    #[test]
    fn saving_throw_cap_fails_open_to_real_destruction() {
        let mut world = hook_world();
        let target = warded_creature(&mut world);
        world
            .resource_mut::<WardRegistry>()
            .get_mut(target)
            .unwrap()
            .saving_throws = 128;

        assert!(!try_save_from_destruction(&mut world, target));
        assert!(!destroy_suppressed(&world, target));
        // the position was left alone
        assert_eq!(world.get::<TilePos>(target).unwrap().0, IVec2::new(3, 1));
    }

    #[test]
    fn fresh_cooldown_reports_saved_without_relocating() {
        let mut world = hook_world();
        let target = warded_creature(&mut world);
        {
            let mut registry = world.resource_mut::<WardRegistry>();
            let ward = registry.get_mut(target).unwrap();
            ward.save_cooldown = 5;
            ward.safe_pos = Some(IVec2::new(6, 1));
        }
        world.get_mut::<TilePos>(target).unwrap().0 = IVec2::new(9, 9);

        assert!(try_save_from_destruction(&mut world, target));
        assert_eq!(world.get::<TilePos>(target).unwrap().0, IVec2::new(9, 9));
    }

    #[test]
    fn save_relocates_and_counts_a_saving_throw() {
        let mut world = hook_world();
        world
            .resource_mut::<RoomRegistry>()
            .insert(IVec2::new(0, 0), IVec2::new(15, 15));
        let target = warded_creature(&mut world);
        world.get_mut::<TilePos>(target).unwrap().0 = IVec2::new(9, 9);

        assert!(try_save_from_destruction(&mut world, target));
        assert_eq!(world.get::<TilePos>(target).unwrap().0, IVec2::new(3, 1));
        let ward = world.resource::<WardRegistry>().get(target).unwrap();
        assert_eq!(ward.saving_throws, 1);
        assert!(ward.save_cooldown > 0);
    }

    #[test]
    fn denned_creatures_are_left_alone() {
        let mut world = hook_world();
        let target = warded_creature(&mut world);
        world.entity_mut(target).insert(Denned);
        assert!(!try_save_from_destruction(&mut world, target));
    }

    #[test]
    fn no_safe_pos_means_no_save() {
        let mut world = hook_world();
        let target = warded_creature(&mut world);
        world
            .resource_mut::<WardRegistry>()
            .get_mut(target)
            .unwrap()
            .safe_pos = None;
        assert!(!try_save_from_destruction(&mut world, target));
        assert!(!destroy_suppressed(&world, target));
    }

    #[test]
    fn suppression_queries_follow_the_mode_mapping() {
        let mut world = hook_world();
        let target = world.spawn(CreatureBundle::at(IVec2::new(3, 1))).id();
        request_ward(
            &mut world,
            target,
            WardRequest {
                modes: WardModes::ENVIRONMENT,
                ..Default::default()
            },
        )
        .expect("ward");

        assert!(damage_suppressed(&world, DamageSource::Drowning, target));
        assert!(damage_suppressed(&world, DamageSource::Weather, target));
        assert!(!damage_suppressed(&world, DamageSource::Attack, target));
        assert!(!damage_suppressed(&world, DamageSource::Collapse, target));
        assert!(!death_suppressed(&world, target));

        let stranger = world.spawn(CreatureBundle::at(IVec2::new(4, 1))).id();
        assert!(!damage_suppressed(&world, DamageSource::Drowning, stranger));
    }

    #[test]
    fn revival_budget_alone_suppresses_death() {
        let mut world = hook_world();
        let target = world.spawn(CreatureBundle::at(IVec2::new(3, 1))).id();
        request_ward(
            &mut world,
            target,
            WardRequest {
                modes: WardModes::DESTRUCTION,
                force_revive: true,
                revivals: Some(1),
                ..Default::default()
            },
        )
        .expect("ward");
        assert!(death_suppressed(&world, target));

        world
            .resource_mut::<WardRegistry>()
            .get_mut(target)
            .unwrap()
            .revivals_left = 0;
        assert!(!death_suppressed(&world, target));
    }

    #[test]
    fn dead_targets_still_count_their_vitals() {
        // suppression is registry state only; a dead creature with a live
        // violence ward still reports suppressed until the update folds it
        let mut world = hook_world();
        let target = warded_creature(&mut world);
        world.get_mut::<Vitals>(target).unwrap().alive = false;
        assert!(death_suppressed(&world, target));
    }
}
