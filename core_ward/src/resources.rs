use std::{collections::HashMap, fmt};

use bevy::{
    math::{IVec2, Vec2},
    prelude::*,
};
use serde::{Deserialize, Serialize};

/// Tracks total simulation ticks elapsed.
#[derive(Resource, Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationTick(pub u64);

/// What occupies one cell of the simulated world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileKind {
    Open,
    Solid,
    ShallowWater,
    DeepWater,
    HazardFlora,
}

impl TileKind {
    pub fn is_passable(self) -> bool {
        !matches!(self, TileKind::Solid)
    }

    pub fn is_deep_water(self) -> bool {
        matches!(self, TileKind::DeepWater)
    }

    pub fn is_hazard_flora(self) -> bool {
        matches!(self, TileKind::HazardFlora)
    }

    pub fn is_water(self) -> bool {
        matches!(self, TileKind::ShallowWater | TileKind::DeepWater)
    }
}

/// Row-major grid of tile kinds. Out-of-bounds reads as solid rock so the
/// world edge never qualifies as footing or headroom.
#[derive(Resource, Debug, Clone)]
pub struct TileGrid {
    pub width: u32,
    pub height: u32,
    tiles: Vec<TileKind>,
}

impl Default for TileGrid {
    fn default() -> Self {
        Self::filled(64, 64, TileKind::Open)
    }
}

impl TileGrid {
    pub fn filled(width: u32, height: u32, kind: TileKind) -> Self {
        let total = (width as usize).saturating_mul(height as usize);
        Self {
            width,
            height,
            tiles: vec![kind; total],
        }
    }

    pub fn in_bounds(&self, pos: IVec2) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as u32) < self.width && (pos.y as u32) < self.height
    }

    pub fn kind(&self, pos: IVec2) -> TileKind {
        if !self.in_bounds(pos) {
            return TileKind::Solid;
        }
        let idx = (pos.y as usize) * self.width as usize + pos.x as usize;
        self.tiles.get(idx).copied().unwrap_or(TileKind::Solid)
    }

    pub fn set(&mut self, pos: IVec2, kind: TileKind) {
        if !self.in_bounds(pos) {
            return;
        }
        let idx = (pos.y as usize) * self.width as usize + pos.x as usize;
        if let Some(slot) = self.tiles.get_mut(idx) {
            *slot = kind;
        }
    }

    /// Center point of a tile, where rescued creatures are dropped.
    pub fn midpoint(pos: IVec2) -> Vec2 {
        Vec2::new(pos.x as f32 + 0.5, pos.y as f32 + 0.5)
    }
}

/// Identifier for a contiguous region of the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(pub u32);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Axis-aligned region of tiles.
#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub min: IVec2,
    pub max: IVec2,
}

impl Room {
    pub fn contains(&self, pos: IVec2) -> bool {
        pos.x >= self.min.x && pos.x <= self.max.x && pos.y >= self.min.y && pos.y <= self.max.y
    }
}

/// Registry of valid regions. Positions outside every room are "nowhere" as
/// far as the ward engine is concerned.
#[derive(Resource, Debug, Clone, Default)]
pub struct RoomRegistry {
    pub rooms: Vec<Room>,
}

impl RoomRegistry {
    pub fn insert(&mut self, min: IVec2, max: IVec2) -> RoomId {
        let id = RoomId(self.rooms.len() as u32);
        self.rooms.push(Room { id, min, max });
        id
    }

    pub fn room_at(&self, pos: IVec2) -> Option<RoomId> {
        self.rooms
            .iter()
            .find(|room| room.contains(pos))
            .map(|room| room.id)
    }

    pub fn get(&self, id: RoomId) -> Option<&Room> {
        self.rooms.iter().find(|room| room.id == id)
    }
}

/// Ambient hazard tracker. Environment-warded creatures get detached so the
/// host's weather/hazard systems stop accumulating exposure against them.
#[derive(Resource, Debug, Clone, Default)]
pub struct HazardBoard {
    pub tracked: Vec<Entity>,
}

impl HazardBoard {
    pub fn attach(&mut self, entity: Entity) {
        if !self.tracked.contains(&entity) {
            self.tracked.push(entity);
        }
    }

    pub fn detach(&mut self, entity: Entity) {
        self.tracked.retain(|tracked| *tracked != entity);
    }

    pub fn is_tracked(&self, entity: Entity) -> bool {
        self.tracked.contains(&entity)
    }
}

/// Stable wire ids for creatures. Peers do not share entity indices, so every
/// snapshot references its target through this map.
#[derive(Resource, Debug, Clone, Default)]
pub struct NetIdMap {
    to_entity: HashMap<u64, Entity>,
    to_id: HashMap<Entity, u64>,
}

impl NetIdMap {
    pub fn bind(&mut self, id: u64, entity: Entity) {
        if let Some(stale) = self.to_entity.insert(id, entity) {
            self.to_id.remove(&stale);
        }
        if let Some(stale) = self.to_id.insert(entity, id) {
            if stale != id {
                self.to_entity.remove(&stale);
            }
        }
    }

    pub fn release(&mut self, entity: Entity) {
        if let Some(id) = self.to_id.remove(&entity) {
            self.to_entity.remove(&id);
        }
    }

    pub fn resolve(&self, id: u64) -> Option<Entity> {
        self.to_entity.get(&id).copied()
    }

    pub fn id_of(&self, entity: Entity) -> Option<u64> {
        self.to_id.get(&entity).copied()
    }
}
