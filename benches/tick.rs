use std::hint::black_box;

use criterion::*;
use columnar_ecs::{Query, World};

mod common;
use common::*;

struct Step {
    production: Query,
    decay: Query,
    hiring: Query,
}

impl Step {
    fn new(world: &World) -> Self {
        Self {
            production: world.query_builder().data::<Productivity>().data::<Wealth>().with::<Employed>().build(),
            decay: world.query_builder().data::<Wealth>().build(),
            hiring: world.query_builder().data::<Wealth>().without::<Employed>().build(),
        }
    }

    fn run(&mut self, world: &mut World) {
        world.update();

        self.production.par_for_each_chunk_mut(world, |mut chunk| {
            if let Some((productivity, wealth)) = chunk.columns_mut::<Productivity, Wealth>() {
                for (p, w) in productivity.iter().zip(wealth.iter_mut()) {
                    w.value += p.rate;
                }
            }
        });

        self.decay.par_for_each_chunk_mut(world, |mut chunk| {
            if let Some(wealth) = chunk.column_mut::<Wealth>() {
                for w in wealth {
                    w.value *= 0.99;
                }
            }
        });

        // the poorest unemployed agents find work; the move happens after iteration
        self.hiring.each(world, |chunk, commands| {
            for row in chunk.rows() {
                if chunk.get::<Wealth>(row).map_or(false, |w| w.value < 50.0) {
                    commands.add::<Employed>(chunk.entities()[row]);
                }
            }
        });
    }
}

fn tick_benchmark(c: &mut Criterion) {
    init_components();

    let mut group = c.benchmark_group("tick");
    group.sample_size(20);

    group.bench_function("tick_3_systems_1M", |b| {
        b.iter_batched(
            || {
                let world = setup_world(AGENTS_MED);
                let step = Step::new(&world);
                (world, step)
            },
            |(mut world, mut step)| {
                step.run(&mut world);
                black_box(world);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("tick_10_steps_100k", |b| {
        b.iter_batched(
            || {
                let world = setup_world(AGENTS_SMALL);
                let step = Step::new(&world);
                (world, step)
            },
            |(mut world, mut step)| {
                for _ in 0..10 {
                    step.run(&mut world);
                }
                black_box(world);
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, tick_benchmark);
criterion_main!(benches);
