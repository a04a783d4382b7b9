use std::hint::black_box;

use criterion::*;
use columnar_ecs::{Bundle, World};

mod common;
use common::*;

fn spawn_benchmark(c: &mut Criterion) {
    init_components();

    let mut group = c.benchmark_group("spawn");
    group.sample_size(10);

    group.bench_function("spawn_bundle_100k_agents", |b| {
        b.iter(|| {
            let mut world = make_world(AGENTS_SMALL);
            for _ in 0..AGENTS_SMALL {
                world.spawn_bundle(Bundle::new().with(Position { x: 0.0, y: 0.0 }));
            }
            black_box(world);
        });
    });

    group.bench_function("spawn_then_set_100k_agents", |b| {
        b.iter(|| {
            let mut world = make_world(AGENTS_SMALL);
            for _ in 0..AGENTS_SMALL {
                let e = world.spawn();
                world.set(e, Position { x: 0.0, y: 0.0 });
                world.set(e, Wealth { value: 1.0 });
            }
            black_box(world);
        });
    });

    group.bench_function("deferred_spawn_100k_agents", |b| {
        b.iter(|| {
            let mut world = World::new();
            world.begin_deferred();
            for _ in 0..AGENTS_SMALL {
                let e = world.spawn();
                world.set(e, Position { x: 0.0, y: 0.0 });
            }
            world.end_deferred();
            black_box(world);
        });
    });

    group.bench_function("despawn_100k_agents", |b| {
        b.iter_batched(
            || {
                let mut world = setup_world(AGENTS_SMALL);
                let mut query = world.query_builder().with::<Position>().build();
                let entities = query.entities(&world);
                (world, entities)
            },
            |(mut world, entities)| {
                for e in entities {
                    world.despawn(e);
                }
                black_box(world);
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, spawn_benchmark);
criterion_main!(benches);
