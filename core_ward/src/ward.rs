use std::collections::HashMap;

use bevy::{math::IVec2, prelude::*};
use bitflags::bitflags;
use thiserror::Error;
use ward_proto::{WardSnapshot, INDEFINITE_LIFESPAN};

use crate::{immunity::ImmunitySnapshot, resources::RoomId};

bitflags! {
    /// Harm categories a ward suppresses. Composites are meaningful: a full
    /// ward carries all three.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WardModes: u8 {
        const VIOLENCE = 1 << 0;
        const ENVIRONMENT = 1 << 1;
        const DESTRUCTION = 1 << 2;
        const ALL = Self::VIOLENCE.bits() | Self::ENVIRONMENT.bits() | Self::DESTRUCTION.bits();
    }
}

impl WardModes {
    /// Explicit query method; flags are the single source of truth, nothing
    /// caches derived booleans.
    pub fn has(self, mode: WardModes) -> bool {
        self.contains(mode)
    }
}

/// Lifespan value meaning "never expires".
pub const INDEFINITE: i32 = -1;

/// Condition evaluated once the lifespan countdown is spent. The ward is
/// only released when the condition holds, never earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReleaseCondition {
    /// Conscious and standing on solid ground, or partially submerged.
    #[default]
    Standard,
    /// Never satisfied; the ward outlives its countdown indefinitely.
    Never,
}

/// Cosmetic effect magnitude derived from body mass. Not behavior-critical.
pub fn ward_power(mass: f32) -> f32 {
    (mass.max(1.0) / 8.0).sqrt().clamp(1.0, 40.0)
}

/// Per-creature protection state machine. One per protected entity, owned by
/// the [`WardRegistry`].
#[derive(Debug, Clone)]
pub struct Ward {
    pub target: Entity,
    pub modes: WardModes,
    /// Last confirmed safe tile; required before any destruction save.
    pub safe_pos: Option<IVec2>,
    pub power: f32,
    /// While > 0 the creature counts as freshly saved and destructive
    /// re-evaluation is skipped.
    pub save_cooldown: u8,
    /// Consecutive forced-destruction rescues. At the configured cap the
    /// ward gives up and destruction proceeds for real.
    pub saving_throws: u32,
    pub revivals_left: u8,
    /// Tick countdown; negative means indefinite.
    pub lifespan: i32,
    pub release: ReleaseCondition,
    /// Death converts into revival while the budget lasts.
    pub force_revive: bool,
    pub original_immunities: ImmunitySnapshot,
    pub immunities_restored: bool,
    /// The ward's own placement, kept co-located with its target.
    pub room: Option<RoomId>,
}

impl Ward {
    pub fn is_indefinite(&self) -> bool {
        self.lifespan < 0
    }

    pub fn snapshot(&self, net_id: u64) -> WardSnapshot {
        let lifespan = if self.lifespan < 0 {
            INDEFINITE_LIFESPAN
        } else {
            self.lifespan.min(i16::MAX as i32) as i16
        };
        WardSnapshot {
            target: net_id,
            modes: self.modes.bits(),
            safe_pos: self.safe_pos.map(|pos| (pos.x, pos.y)),
            save_cooldown: self.save_cooldown,
            revivals_left: self.revivals_left,
            lifespan,
            force_revive: self.force_revive,
        }
    }

    /// Overwrites the replicated fields from an inbound snapshot. Local-only
    /// state (immunity snapshot, saving throws, room) is left alone.
    pub fn apply_snapshot(&mut self, snapshot: &WardSnapshot) {
        self.modes = WardModes::from_bits_truncate(snapshot.modes);
        self.safe_pos = snapshot.safe_pos.map(|(x, y)| IVec2::new(x, y));
        self.save_cooldown = snapshot.save_cooldown;
        self.revivals_left = snapshot.revivals_left;
        self.lifespan = i32::from(snapshot.lifespan);
        self.force_revive = snapshot.force_revive;
    }
}

/// Parameters for creating a new ward.
#[derive(Debug, Clone)]
pub struct WardRequest {
    pub modes: WardModes,
    pub lifespan: i32,
    pub release: ReleaseCondition,
    pub force_revive: bool,
    /// `None` picks the configured default budget.
    pub revivals: Option<u8>,
}

impl Default for WardRequest {
    fn default() -> Self {
        Self {
            modes: WardModes::ALL,
            lifespan: INDEFINITE,
            release: ReleaseCondition::Standard,
            force_revive: false,
            revivals: None,
        }
    }
}

/// Error raised when a ward cannot be created.
#[derive(Debug, Error)]
pub enum WardError {
    #[error("ward target is missing or no longer exists")]
    MissingTarget,
    #[error("ward target is not placed in the world")]
    NotPlaced,
    #[error("entity already has a live ward")]
    AlreadyWarded,
}

/// Arena of live wards keyed by target entity.
///
/// Bevy's `Entity` is already a stable id + generation pair, so a reclaimed
/// creature can never be confused with its successor. Entries whose target
/// no longer exists are pruned by an explicit sweep in the update pass
/// rather than by finalizers, which keeps cleanup deterministic.
#[derive(Resource, Debug, Default)]
pub struct WardRegistry {
    wards: HashMap<Entity, Ward>,
}

impl WardRegistry {
    pub fn register(&mut self, target: Entity, ward: Ward) -> Result<(), WardError> {
        if self.wards.contains_key(&target) {
            return Err(WardError::AlreadyWarded);
        }
        self.wards.insert(target, ward);
        Ok(())
    }

    pub fn contains(&self, target: Entity) -> bool {
        self.wards.contains_key(&target)
    }

    pub fn get(&self, target: Entity) -> Option<&Ward> {
        self.wards.get(&target)
    }

    pub fn get_mut(&mut self, target: Entity) -> Option<&mut Ward> {
        self.wards.get_mut(&target)
    }

    pub fn remove(&mut self, target: Entity) -> Option<Ward> {
        self.wards.remove(&target)
    }

    /// Takes a ward out for mutation; pair with [`WardRegistry::put_back`].
    pub fn take(&mut self, target: Entity) -> Option<Ward> {
        self.wards.remove(&target)
    }

    pub fn put_back(&mut self, target: Entity, ward: Ward) {
        self.wards.insert(target, ward);
    }

    pub fn len(&self) -> usize {
        self.wards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wards.is_empty()
    }

    /// Targets in deterministic order, for stable iteration and snapshots.
    pub fn targets(&self) -> Vec<Entity> {
        let mut targets: Vec<Entity> = self.wards.keys().copied().collect();
        targets.sort_unstable_by_key(|entity| entity.to_bits());
        targets
    }

    pub fn iter(&self) -> impl Iterator<Item = (Entity, &Ward)> {
        self.wards.iter().map(|(entity, ward)| (*entity, ward))
    }
}
