use bevy::math::IVec2;

use crate::{
    components::{GrabbedBy, Vitals},
    resources::{TileGrid, TileKind},
    ward::{ReleaseCondition, Ward},
};

/// Whether `pos` is a spot a creature can be dropped back into: solid
/// footing immediately below, headroom at the reference point and one level
/// above, no deep water (unless tolerated) and no hazard flora.
pub fn tile_qualifies(grid: &TileGrid, pos: IVec2, tolerates_deep_water: bool) -> bool {
    if grid.kind(pos - IVec2::Y) != TileKind::Solid {
        return false;
    }
    let at = grid.kind(pos);
    if !at.is_passable() || !grid.kind(pos + IVec2::Y).is_passable() {
        return false;
    }
    if at.is_deep_water() && !tolerates_deep_water {
        return false;
    }
    !at.is_hazard_flora()
}

/// Sole gate for advancing a ward's recorded safe position.
pub fn should_update_safe_pos(
    ward: &Ward,
    vitals: &Vitals,
    grabbed: Option<&GrabbedBy>,
    tolerates_deep_water: bool,
    pos: IVec2,
    grid: &TileGrid,
) -> bool {
    if ward.save_cooldown > 0 {
        return false;
    }
    if vitals.is_dead() {
        return false;
    }
    if grabbed.map_or(false, |grabbed| grabbed.is_grabbed()) {
        return false;
    }
    tile_qualifies(grid, pos, tolerates_deep_water)
}

/// Evaluates a ward's release condition at the target's position.
pub fn release_satisfied(
    condition: ReleaseCondition,
    vitals: &Vitals,
    grid: &TileGrid,
    pos: IVec2,
) -> bool {
    match condition {
        ReleaseCondition::Never => false,
        ReleaseCondition::Standard => {
            if vitals.is_dead() || !vitals.conscious {
                return false;
            }
            let footing = grid.kind(pos - IVec2::Y) == TileKind::Solid;
            let submerged = grid.kind(pos) == TileKind::ShallowWater;
            footing || submerged
        }
    }
}
