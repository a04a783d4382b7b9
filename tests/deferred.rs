use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Once};

use columnar_ecs::{Entity, World};

#[derive(Clone, Copy, Debug, PartialEq, Default)]
struct Health(i32);

#[derive(Clone, Copy, Debug, PartialEq, Default)]
struct Poisoned;

#[derive(Clone, Copy, Debug, PartialEq)]
struct Owner(Entity);

static INIT: Once = Once::new();

fn init() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

#[test]
fn edits_inside_a_scope_wait_for_its_end() {
    init();
    let mut world = World::new();
    let e = world.spawn();

    world.begin_deferred();
    world.set(e, Health(10));
    assert!(world.is_deferred());
    assert!(!world.has::<Health>(e));
    assert_eq!(world.pending_commands(), 1);
    world.end_deferred();

    assert!(!world.is_deferred());
    assert_eq!(world.pending_commands(), 0);
    assert_eq!(world.get::<Health>(e), &Health(10));
}

#[test]
fn deferred_spawn_reserves_a_live_unplaced_id() {
    init();
    let mut world = World::new();

    world.begin_deferred();
    let e = world.spawn();
    assert!(world.is_alive(e));
    assert_eq!(world.record(e), None);
    assert!(!world.has::<Health>(e));
    world.set(e, Health(1));
    world.end_deferred();

    assert!(world.record(e).is_some());
    assert_eq!(world.get::<Health>(e), &Health(1));
}

#[test]
fn replay_is_fifo() {
    init();
    let mut world = World::new();
    let e = world.spawn();

    world.begin_deferred();
    world.set(e, Health(1));
    world.set(e, Health(2));
    world.unset::<Health>(e);
    world.set(e, Health(3));
    world.add::<Health>(e);
    world.end_deferred();

    assert_eq!(world.get::<Health>(e), &Health(3));
}

#[test]
fn destroying_an_entity_created_in_the_same_scope_succeeds() {
    init();
    let mut world = World::new();
    let before = world.entity_count();

    world.begin_deferred();
    let e = world.spawn();
    world.set(e, Health(5));
    world.despawn(e);
    world.end_deferred();

    assert!(!world.is_alive(e));
    assert_eq!(world.entity_count(), before);
    assert_eq!(world.graph().iter().map(|archetype| archetype.len()).sum::<usize>(), before);
}

#[test]
fn commands_after_a_destroy_are_skipped() {
    init();
    let mut world = World::new();
    let e = world.spawn();

    world.begin_deferred();
    world.despawn(e);
    world.set(e, Health(1));
    world.add::<Poisoned>(e);
    world.end_deferred();

    assert!(!world.is_alive(e));
    assert_eq!(world.entity_count(), 0);
}

#[test]
fn nested_scopes_flush_at_the_outermost_end() {
    init();
    let mut world = World::new();
    let e = world.spawn();

    world.begin_deferred();
    world.begin_deferred();
    world.set(e, Health(1));
    world.end_deferred();
    assert!(world.is_deferred());
    assert!(!world.has::<Health>(e));

    world.flush();
    assert!(!world.has::<Health>(e), "flush is a no-op inside a scope");

    world.end_deferred();
    assert!(world.has::<Health>(e));
}

#[test]
#[should_panic]
fn unbalanced_end_panics() {
    init();
    let mut world = World::new();
    world.end_deferred();
}

#[test]
fn recorded_commands_apply_before_the_next_immediate_edit() {
    init();
    let mut world = World::new();
    let e = world.spawn();

    let spawned = {
        let commands = world.commands();
        commands.set(e, Health(4));
        let spawned = commands.spawn();
        commands.add::<Poisoned>(spawned);
        spawned
    };
    assert_eq!(world.pending_commands(), 3);
    assert!(world.is_alive(spawned));
    assert!(!world.has::<Health>(e));

    // an immediate edit replays the log first
    world.set(e, Health(5));
    assert_eq!(world.pending_commands(), 0);
    assert_eq!(world.get::<Health>(e), &Health(5));
    assert!(world.has::<Poisoned>(spawned));
}

#[test]
fn explicit_flush_drains_recorded_commands() {
    init();
    let mut world = World::new();
    let e = world.spawn();
    world.commands().despawn(e);
    assert!(world.is_alive(e));

    world.flush();

    assert!(!world.is_alive(e));
}

#[test]
fn each_defers_structural_edits_until_iteration_ends() {
    init();
    let mut world = World::new();
    let mut entities = Vec::new();
    for i in 0..100 {
        let e = world.spawn();
        world.set(e, Health(i % 5));
        entities.push(e);
    }

    let mut query = world.query_builder().data::<Health>().build();
    let mut visited = 0;
    query.each(&mut world, |chunk, commands| {
        for row in chunk.rows() {
            visited += 1;
            let entity = chunk.entities()[row];
            match chunk.get::<Health>(row) {
                Some(Health(0)) => commands.despawn(entity),
                Some(Health(1)) => commands.add::<Poisoned>(entity),
                _ => {}
            }
        }
    });

    assert_eq!(visited, 100);
    assert_eq!(world.entity_count(), 80);
    assert!(!world.is_deferred());

    let mut poisoned = world.query_builder().with::<Poisoned>().build();
    assert_eq!(poisoned.count(&world), 20);
    for &e in &entities {
        if world.is_alive(e) {
            assert_ne!(world.get::<Health>(e), &Health(0));
        }
    }
}

#[test]
fn each_can_spawn_new_entities() {
    init();
    let mut world = World::new();
    for _ in 0..3 {
        let e = world.spawn();
        world.set(e, Health(1));
    }

    let mut query = world.query_builder().data::<Health>().build();
    query.each(&mut world, |chunk, commands| {
        for entity in chunk.selected_entities() {
            let child = commands.spawn();
            commands.set(child, Owner(entity));
        }
    });

    let mut owned = world.query_builder().data::<Owner>().build();
    let owners: Vec<Entity> = owned
        .iter(&world)
        .flat_map(|chunk| chunk.column::<Owner>().map(|o| o.to_vec()).unwrap_or_default())
        .map(|owner| owner.0)
        .collect();
    assert_eq!(owners.len(), 3);
    assert!(owners.iter().all(|&owner| world.has::<Health>(owner)));
}

#[test]
fn hooks_recording_during_replay_are_drained_in_the_same_pass() {
    init();
    let mut world = World::new();
    let destroyed = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&destroyed);
    world.on_destroy(move |world, entity| {
        counter.fetch_add(1, Ordering::Relaxed);
        if let Ok(owner) = world.try_get::<Owner>(entity) {
            world.commands().despawn(owner.0);
        }
    });

    let parent = world.spawn();
    let child = world.spawn();
    world.set(child, Owner(parent));

    world.begin_deferred();
    world.despawn(child);
    world.end_deferred();

    assert_eq!(destroyed.load(Ordering::Relaxed), 2);
    assert!(!world.is_alive(child));
    assert!(!world.is_alive(parent));
    assert_eq!(world.pending_commands(), 0);
}

#[test]
fn records_made_by_set_hooks_join_the_running_replay() {
    init();
    let mut world = World::new();
    let e = world.spawn();

    world.on_set(|world, entity, _| {
        // recording from a hook while the log drains
        if !world.has::<Poisoned>(entity) {
            world.commands().add::<Poisoned>(entity);
        }
    });

    world.begin_deferred();
    world.set(e, Health(2));
    world.end_deferred();

    assert!(world.has::<Poisoned>(e));
    assert!(!world.is_deferred());
    assert_eq!(world.pending_commands(), 0);
}

#[test]
fn a_panicking_visitor_still_closes_the_scope() {
    init();
    let mut world = World::new();
    let e = world.spawn();
    world.set(e, Health(3));

    let mut query = world.query_builder().data::<Health>().build();
    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
        query.each(&mut world, |chunk, commands| {
            for entity in chunk.selected_entities() {
                commands.add::<Poisoned>(entity);
            }
            panic!("visitor failed");
        });
    }));
    assert!(outcome.is_err());

    assert!(!world.is_deferred());
    assert_eq!(world.pending_commands(), 1);
    assert!(!world.has::<Poisoned>(e));

    world.flush();
    assert_eq!(world.pending_commands(), 0);
    assert!(world.has::<Poisoned>(e));

    // the world accepts new scopes afterwards
    query.each(&mut world, |_, commands| commands.set(e, Health(4)));
    assert_eq!(world.get::<Health>(e), &Health(4));
}
