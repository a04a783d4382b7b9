#![allow(dead_code)]

use std::sync::Once;

use columnar_ecs::{register_component, Bundle, World, WorldConfig};

pub const AGENTS_SMALL: usize = 100_000;
pub const AGENTS_MED: usize = 1_000_000;

#[derive(Clone, Copy, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Copy)]
pub struct Wealth {
    pub value: f32,
}

#[derive(Clone, Copy)]
pub struct Productivity {
    pub rate: f32,
}

#[derive(Clone, Copy, Default)]
pub struct Employed;

static INIT: Once = Once::new();

pub fn init_components() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
        register_component::<Position>();
        register_component::<Wealth>();
        register_component::<Productivity>();
        register_component::<Employed>();
    });
}

pub fn make_world(agent_count: usize) -> World {
    World::with_config(WorldConfig::default().with_entity_capacity(agent_count))
}

/// Spawns `agent_count` agents; every other one is also `Employed`.
pub fn populate(world: &mut World, agent_count: usize) {
    for i in 0..agent_count {
        let mut bundle = Bundle::new()
            .with(Position::default())
            .with(Wealth { value: 100.0 })
            .with(Productivity { rate: 1.0 });
        if i % 2 == 0 {
            bundle.insert(Employed);
        }
        world.spawn_bundle(bundle);
    }
}

pub fn setup_world(agent_count: usize) -> World {
    init_components();
    let mut world = make_world(agent_count);
    populate(&mut world, agent_count);
    world
}
