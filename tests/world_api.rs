use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Once};

use columnar_ecs::engine::error::ECSError;
use columnar_ecs::engine::graph::ROOT;
use columnar_ecs::{component_id_of, Bundle, Entity, EntityIndex, World, WorldConfig};

#[derive(Clone, Copy, Debug, PartialEq, Default)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
struct Velocity {
    dx: f32,
    dy: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
struct Mass(f32);

#[derive(Clone, Debug, PartialEq, Default)]
struct Name(String);

#[derive(Clone, Copy, Debug, PartialEq, Default)]
struct Frozen;

#[derive(Clone, Copy, Debug, PartialEq)]
struct Likes(u8);

#[derive(Clone, Copy, Debug, PartialEq, Default)]
struct Eats(u32);

#[derive(Clone, Copy, Debug, PartialEq, Default)]
struct Apples;

#[derive(Clone, Copy, Debug, PartialEq, Default)]
struct Pears;

static INIT: Once = Once::new();

fn init() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

#[test]
fn position_velocity_scenario() {
    init();
    let mut world = World::new();

    let e1 = world.spawn();
    let e2 = world.spawn();
    world.set(e1, Position { x: 0.0, y: 0.0 });
    world.set(e2, Position { x: 0.0, y: 0.0 });
    world.set(e1, Velocity { dx: 1.0, dy: 1.0 });

    let mut moving = world.query_builder().with::<Position>().with::<Velocity>().build();
    assert_eq!(moving.entities(&world), vec![e1]);

    let mut placed = world.query_builder().with::<Position>().build();
    let mut all = placed.entities(&world);
    all.sort();
    let mut expected = vec![e1, e2];
    expected.sort();
    assert_eq!(all, expected);

    let mut resting = world.query_builder().with::<Position>().without::<Velocity>().build();
    assert_eq!(resting.entities(&world), vec![e2]);
}

#[test]
fn round_trip_returns_entity_to_root() {
    init();
    let mut world = World::new();
    let e = world.spawn();
    let root_count = world.graph().archetype(ROOT).len();

    world.add::<Position>(e);
    world.add::<Velocity>(e);
    world.add::<Mass>(e);
    assert_eq!(world.graph().archetype(ROOT).len(), root_count - 1);

    world.unset::<Velocity>(e);
    world.unset::<Mass>(e);
    world.unset::<Position>(e);

    assert_eq!(world.record(e).unwrap().archetype, ROOT);
    assert_eq!(world.graph().archetype(ROOT).len(), root_count);
}

#[test]
fn despawn_patches_the_record_of_the_swapped_entity() {
    init();
    let mut world = World::new();
    let entities: Vec<Entity> = (0..4)
        .map(|i| {
            let e = world.spawn();
            world.set(e, Mass(i as f32));
            e
        })
        .collect();

    let removed_row = world.record(entities[1]).unwrap().row;
    world.despawn(entities[1]);

    let last = entities[3];
    assert_eq!(world.record(last).unwrap().row, removed_row);
    assert_eq!(world.get::<Mass>(last), &Mass(3.0));
    assert_eq!(world.get::<Mass>(entities[0]), &Mass(0.0));
    assert_eq!(world.get::<Mass>(entities[2]), &Mass(2.0));
    assert!(!world.is_alive(entities[1]));
}

#[test]
fn adding_a_component_preserves_existing_values() {
    init();
    let mut world = World::new();
    let e = world.spawn();
    world.set(e, Position { x: 1.5, y: -2.0 });
    world.set(e, Velocity { dx: 3.0, dy: 4.0 });

    world.add::<Mass>(e);

    assert_eq!(world.get::<Position>(e), &Position { x: 1.5, y: -2.0 });
    assert_eq!(world.get::<Velocity>(e), &Velocity { dx: 3.0, dy: 4.0 });
    assert_eq!(world.get::<Mass>(e), &Mass::default());
}

#[test]
fn add_keeps_an_existing_value_and_set_overwrites_it() {
    init();
    let mut world = World::new();
    let e = world.spawn();
    world.set(e, Mass(5.0));

    world.add::<Mass>(e);
    assert_eq!(world.get::<Mass>(e), &Mass(5.0));

    world.set(e, Mass(6.0));
    assert_eq!(world.get::<Mass>(e), &Mass(6.0));
}

#[test]
fn unset_of_an_absent_component_is_a_no_op() {
    init();
    let mut world = World::new();
    let e = world.spawn();
    world.set(e, Mass(1.0));
    let before = world.record(e);

    world.unset::<Velocity>(e);

    assert_eq!(world.record(e), before);
    assert!(!world.has::<Velocity>(e));
}

#[test]
fn owned_values_survive_moves_and_are_dropped_on_despawn() {
    init();
    let mut world = World::new();
    let e = world.spawn();
    world.set(e, Name("alpha".to_string()));
    world.add::<Position>(e);
    world.add::<Frozen>(e);
    world.unset::<Position>(e);

    assert_eq!(world.get::<Name>(e), &Name("alpha".to_string()));
    assert!(world.has::<Frozen>(e));

    world.despawn(e);
    assert_eq!(world.entity_count(), 0);
}

#[test]
fn get_mut_writes_in_place() {
    init();
    let mut world = World::new();
    let e = world.spawn();
    world.set(e, Position { x: 0.0, y: 0.0 });

    world.get_mut::<Position>(e).x = 9.0;

    assert_eq!(world.get::<Position>(e).x, 9.0);
}

#[test]
fn try_accessors_report_errors() {
    init();
    let mut world = World::new();
    let e = world.spawn();
    world.add::<Frozen>(e);

    assert!(matches!(world.try_get::<Mass>(e), Err(ECSError::MissingComponent(_))));
    assert!(matches!(world.try_get::<Frozen>(e), Err(ECSError::TagAccess(_))));
    assert!(matches!(world.try_get_mut::<Mass>(e), Err(ECSError::MissingComponent(_))));

    world.despawn(e);
    assert!(matches!(world.try_get::<Mass>(e), Err(ECSError::StaleEntity(_))));
}

#[test]
#[should_panic]
fn get_of_a_missing_component_panics() {
    init();
    let mut world = World::new();
    let e = world.spawn();
    let _ = world.get::<Mass>(e);
}

#[test]
#[should_panic]
fn has_on_a_dead_entity_panics() {
    init();
    let mut world = World::new();
    let e = world.spawn();
    world.despawn(e);
    let _ = world.has::<Mass>(e);
}

#[test]
#[should_panic]
fn despawn_twice_panics() {
    init();
    let mut world = World::new();
    let e = world.spawn();
    world.despawn(e);
    world.despawn(e);
}

#[test]
#[should_panic]
fn set_on_a_stale_handle_panics() {
    init();
    let mut world = World::new();
    let e = world.spawn();
    world.despawn(e);
    world.set(e, Mass(1.0));
}

#[test]
fn preallocated_index_hands_out_ascending_slots_then_grows() {
    init();
    let mut index = EntityIndex::with_capacity(4);
    let reserved: Vec<Entity> = (0..6).map(|_| index.reserve().unwrap()).collect();
    let slots: Vec<u32> = reserved.iter().map(|e| e.index()).collect();
    assert_eq!(slots, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(index.len(), 6);
    assert!(reserved.iter().all(|&e| index.is_alive(e)));

    let empty = EntityIndex::with_capacity(0);
    assert_eq!(empty.len(), 0);
}

#[test]
fn recycled_index_gets_a_new_generation() {
    init();
    let mut world = World::new();
    let old = world.spawn();
    world.despawn(old);

    let new = world.spawn();
    assert_eq!(new.index(), old.index());
    assert_ne!(new.generation(), old.generation());
    assert!(world.is_alive(new));
    assert!(!world.is_alive(old));
}

#[test]
fn spawn_bundle_places_entity_directly() {
    init();
    let mut world = World::new();
    let e = world.spawn_bundle(
        Bundle::new()
            .with(Position { x: 1.0, y: 2.0 })
            .with(Mass(3.0))
            .with(Frozen),
    );

    let record = world.record(e).unwrap();
    assert_eq!(world.graph().archetype(record.archetype).components().len(), 3);
    assert_eq!(world.get::<Position>(e), &Position { x: 1.0, y: 2.0 });
    assert_eq!(world.get::<Mass>(e), &Mass(3.0));
    assert!(world.has::<Frozen>(e));

    // adding the same set one by one lands in the same archetype
    let other = world.spawn();
    world.add::<Frozen>(other);
    world.add::<Mass>(other);
    world.add::<Position>(other);
    assert_eq!(world.record(other).unwrap().archetype, record.archetype);
}

#[test]
fn destroy_hook_sees_the_entity_before_reclamation() {
    init();
    let mut world = World::new();
    let seen = Arc::new(AtomicU32::new(0));

    let hook_seen = Arc::clone(&seen);
    world.on_destroy(move |world, entity| {
        assert!(world.is_alive(entity));
        let mass = world.get::<Mass>(entity);
        hook_seen.fetch_add(mass.0 as u32, Ordering::Relaxed);
    });

    let e = world.spawn();
    world.set(e, Mass(7.0));
    world.despawn(e);

    assert_eq!(seen.load(Ordering::Relaxed), 7);
    assert!(!world.is_alive(e));
}

#[test]
fn set_and_unset_hooks_fire() {
    init();
    let mut world = World::new();
    let sets = Arc::new(AtomicU32::new(0));
    let unsets = Arc::new(AtomicU32::new(0));
    let mass = component_id_of::<Mass>();

    let counter = Arc::clone(&sets);
    world.on_set(move |_, _, component| {
        if component.id == mass {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    });
    let counter = Arc::clone(&unsets);
    world.on_unset(move |world, entity, component| {
        assert!(world.has::<Mass>(entity), "unset hook runs before the value is dropped");
        if component.id == mass {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    });

    let e = world.spawn();
    world.set(e, Mass(1.0));
    world.set(e, Mass(2.0));
    world.add::<Mass>(e);
    world.unset::<Mass>(e);
    world.unset::<Mass>(e);

    assert_eq!(sets.load(Ordering::Relaxed), 2);
    assert_eq!(unsets.load(Ordering::Relaxed), 1);
}

#[test]
fn relations_target_entities() {
    init();
    let mut world = World::new();
    let alice = world.spawn();
    let bob = world.spawn();
    let carol = world.spawn();

    world.relate(alice, bob, Likes(3));
    world.relate(alice, carol, Likes(9));

    assert!(world.has_relation::<Likes>(alice, bob));
    assert!(!world.has_relation::<Likes>(bob, alice));
    assert_eq!(world.get_relation::<Likes>(alice, carol), &Likes(9));

    let mut targets = world.targets::<Likes>(alice);
    targets.sort();
    let mut expected = vec![bob, carol];
    expected.sort();
    assert_eq!(targets, expected);

    let mut fans = world.query_builder().with_relation::<Likes>(bob).build();
    assert_eq!(fans.entities(&world), vec![alice]);

    world.unrelate::<Likes>(alice, bob);
    assert_eq!(world.targets::<Likes>(alice), vec![carol]);

    world.despawn(carol);
    assert!(world.targets::<Likes>(alice).is_empty());
}

#[test]
fn type_pairs_store_the_first_data_bearing_type() {
    init();
    let mut world = World::new();
    let e = world.spawn();

    world.set_pair::<Eats, Apples, Eats>(e, Eats(3));
    assert!(world.has_pair::<Eats, Apples>(e));
    assert!(!world.has_pair::<Eats, Pears>(e));
    assert!(!world.has::<Eats>(e));
    assert_eq!(world.get_pair::<Eats, Apples, Eats>(e), &Eats(3));

    world.add_pair::<Eats, Apples>(e);
    assert_eq!(world.get_pair::<Eats, Apples, Eats>(e), &Eats(3));
    world.set_pair::<Eats, Apples, Eats>(e, Eats(4));
    assert_eq!(world.get_pair::<Eats, Apples, Eats>(e), &Eats(4));

    world.add_pair::<Frozen, Mass>(e);
    assert_eq!(world.get_pair::<Frozen, Mass, Mass>(e), &Mass(0.0));

    world.add_pair::<Frozen, Pears>(e);
    assert!(world.has_pair::<Frozen, Pears>(e));
    assert!(matches!(world.try_get_pair::<Frozen, Pears, Frozen>(e), Err(ECSError::TagAccess(_))));
    assert!(matches!(world.try_get_pair::<Eats, Apples, Mass>(e), Err(ECSError::Column(_))));
    assert!(matches!(world.try_get_pair::<Eats, Pears, Eats>(e), Err(ECSError::MissingComponent(_))));

    let mut eaters = world.query_builder().with_pair::<Eats, Apples>().build();
    assert_eq!(eaters.entities(&world), vec![e]);

    world.unset_pair::<Eats, Apples>(e);
    assert!(!world.has_pair::<Eats, Apples>(e));
    assert!(world.has_pair::<Frozen, Mass>(e));
    assert_eq!(eaters.count(&world), 0);
}

#[test]
#[should_panic]
fn set_pair_with_the_wrong_value_type_panics() {
    init();
    let mut world = World::new();
    let e = world.spawn();
    world.set_pair::<Eats, Pears, Mass>(e, Mass(1.0));
}

#[test]
fn targets_skip_type_level_pairs() {
    init();
    let mut world = World::new();
    let alice = world.spawn();
    let bob = world.spawn();

    world.relate(alice, bob, Likes(1));
    world.set_pair::<Likes, Apples, Likes>(alice, Likes(2));

    assert_eq!(world.targets::<Likes>(alice), vec![bob]);
    assert_eq!(world.get_pair::<Likes, Apples, Likes>(alice), &Likes(2));
    assert_eq!(world.get_relation::<Likes>(alice, bob), &Likes(1));
}

#[test]
fn pair_edits_are_recorded_inside_a_deferred_scope() {
    init();
    let mut world = World::new();
    let e = world.spawn();
    world.set_pair::<Eats, Pears, Eats>(e, Eats(1));

    world.begin_deferred();
    world.set_pair::<Eats, Apples, Eats>(e, Eats(7));
    world.commands().add_pair::<Frozen, Mass>(e);
    world.commands().unset_pair::<Eats, Pears>(e);
    assert_eq!(world.pending_commands(), 3);
    assert!(!world.has_pair::<Eats, Apples>(e));
    world.end_deferred();

    assert_eq!(world.get_pair::<Eats, Apples, Eats>(e), &Eats(7));
    assert_eq!(world.get_pair::<Frozen, Mass, Mass>(e), &Mass(0.0));
    assert!(!world.has_pair::<Eats, Pears>(e));
}

#[test]
fn update_advances_the_world_tick() {
    init();
    let mut world = World::with_config(WorldConfig::default().with_entity_capacity(16).with_archetype_capacity(4));
    assert_eq!(world.config().entity_capacity, 16);
    assert_eq!(world.tick(), 0);
    assert_eq!(world.update(), 1);
    assert_eq!(world.update(), 2);
    assert_eq!(world.tick(), 2);
}

#[test]
fn counts_track_entities_and_archetypes() {
    init();
    let mut world = World::new();
    assert_eq!(world.entity_count(), 0);
    assert_eq!(world.archetype_count(), 1);

    let a = world.spawn();
    let b = world.spawn();
    world.set(a, Mass(1.0));
    world.set(b, Position::default());

    assert_eq!(world.entity_count(), 2);
    assert_eq!(world.archetype_count(), 3);

    world.despawn(a);
    assert_eq!(world.entity_count(), 1);
}

#[test]
fn many_entities_span_several_chunks() {
    init();
    let mut world = World::new();
    let entities: Vec<Entity> = (0..10_000)
        .map(|i| {
            let e = world.spawn();
            world.set(e, Mass(i as f32));
            e
        })
        .collect();

    for (i, &e) in entities.iter().enumerate().step_by(3) {
        assert_eq!(world.get::<Mass>(e), &Mass(i as f32));
    }

    for &e in entities.iter().step_by(2) {
        world.despawn(e);
    }
    for (i, &e) in entities.iter().enumerate().skip(1).step_by(2) {
        assert_eq!(world.get::<Mass>(e), &Mass(i as f32));
    }
    assert_eq!(world.entity_count(), 5_000);
}
