use bevy::{
    math::{IVec2, Vec2},
    prelude::*,
};

use crate::resources::RoomId;

/// A living creature the ward engine may protect.
#[derive(Component, Debug, Clone)]
pub struct Creature {
    /// Body mass in kilograms; feeds the derived cosmetic effect magnitude.
    pub mass: f32,
    pub tolerates_deep_water: bool,
}

impl Default for Creature {
    fn default() -> Self {
        Self {
            mass: 60.0,
            tolerates_deep_water: false,
        }
    }
}

/// Health and consciousness state. Death is `!alive`.
#[derive(Component, Debug, Clone)]
pub struct Vitals {
    pub health: f32,
    pub max_health: f32,
    pub alive: bool,
    pub conscious: bool,
    /// Damage the host has queued but not yet applied.
    pub pending_damage: f32,
    /// Remaining ticks of forced stun.
    pub stun_ticks: u32,
}

impl Default for Vitals {
    fn default() -> Self {
        Self {
            health: 100.0,
            max_health: 100.0,
            alive: true,
            conscious: true,
            pending_damage: 0.0,
            stun_ticks: 0,
        }
    }
}

impl Vitals {
    pub fn is_dead(&self) -> bool {
        !self.alive
    }

    /// Resets the creature back to a healthy, conscious state.
    pub fn revive(&mut self) {
        self.health = self.max_health;
        self.alive = true;
        self.conscious = true;
        self.pending_damage = 0.0;
    }
}

/// Tile coordinate of the creature's reference body point, `+y` up.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TilePos(pub IVec2);

/// Continuous position within the tile grid.
#[derive(Component, Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldPos(pub Vec2);

#[derive(Component, Debug, Clone, Copy, PartialEq, Default)]
pub struct Velocity(pub Vec2);

/// Sub-part entities of a compound body. Each part carries its own
/// `TilePos`/`WorldPos`/`Velocity` and is relocated together with the root.
#[derive(Component, Debug, Clone, Default)]
pub struct BodyParts(pub Vec<Entity>);

/// Entities currently holding this creature in a hostile grab.
#[derive(Component, Debug, Clone, Default)]
pub struct GrabbedBy(pub Vec<Entity>);

impl GrabbedBy {
    pub fn is_grabbed(&self) -> bool {
        !self.0.is_empty()
    }
}

/// Holder-side half of a grab.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Grip {
    pub held: Option<Entity>,
}

/// Ambient hazard accumulators Environment protection neutralizes.
#[derive(Component, Debug, Clone, Default)]
pub struct EnvExposure {
    pub drowning_ticks: u32,
    pub wetness: f32,
    pub wind_stress: f32,
}

impl EnvExposure {
    pub fn clear(&mut self) {
        self.drowning_ticks = 0;
        self.wetness = 0.0;
        self.wind_stress = 0.0;
    }
}

/// The creature's pre-existing environmental immunities. Wards snapshot
/// these at creation and restore them on teardown.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Immunities {
    pub drowning: bool,
    pub weather: bool,
    pub hazard: bool,
}

/// Containing-region bookkeeping kept current by the ward update pass.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct RoomAssignment {
    pub current: Option<RoomId>,
    pub last_known: Option<RoomId>,
}

/// Resting in a safe zone; destruction saves leave denned creatures alone.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Denned;

/// Mid-transit through a special traversal channel.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct InTransit;

/// AI pathing target, cleared when a creature is revived.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct PathIntent {
    pub goal: Option<IVec2>,
}

/// Everything a protectable creature carries.
#[derive(Bundle, Default)]
pub struct CreatureBundle {
    pub creature: Creature,
    pub vitals: Vitals,
    pub tile_pos: TilePos,
    pub world_pos: WorldPos,
    pub velocity: Velocity,
    pub body: BodyParts,
    pub grabbed_by: GrabbedBy,
    pub grip: Grip,
    pub exposure: EnvExposure,
    pub immunities: Immunities,
    pub room: RoomAssignment,
    pub path: PathIntent,
}

impl CreatureBundle {
    pub fn at(pos: IVec2) -> Self {
        Self {
            tile_pos: TilePos(pos),
            world_pos: WorldPos(Vec2::new(pos.x as f32 + 0.5, pos.y as f32 + 0.5)),
            ..Default::default()
        }
    }
}
