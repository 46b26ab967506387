use bevy::{app::App, math::IVec2, prelude::Entity};
use core_ward::{build_headless_app, CreatureBundle, NetIdMap, RoomRegistry, TileGrid, TileKind};

/// Headless app over a 16x16 world with a solid floor at y = 0 and one room
/// covering the left half of the grid.
pub fn floored_app() -> App {
    let mut app = build_headless_app();
    let mut grid = TileGrid::filled(16, 16, TileKind::Open);
    for x in 0..16 {
        grid.set(IVec2::new(x, 0), TileKind::Solid);
    }
    app.world.insert_resource(grid);
    app.world
        .resource_mut::<RoomRegistry>()
        .insert(IVec2::new(0, 0), IVec2::new(7, 15));
    app
}

/// Spawns a creature at `pos`, bound to a stable net id.
pub fn spawn_creature(app: &mut App, pos: IVec2, net_id: u64) -> Entity {
    let entity = app.world.spawn(CreatureBundle::at(pos)).id();
    app.world.resource_mut::<NetIdMap>().bind(net_id, entity);
    entity
}

#[allow(dead_code)]
pub fn run_ticks(app: &mut App, ticks: usize) {
    for _ in 0..ticks {
        app.update();
    }
}
