use std::sync::Once;

use columnar_ecs::{Bundle, Query, World};

#[derive(Clone, Copy, Default)]
struct AgentTag;

#[derive(Clone, Copy, Default)]
struct FirmTag;

#[derive(Clone, Copy)]
struct Cash(pub f32);

#[derive(Clone, Copy)]
struct Hunger(pub f32);

#[derive(Clone, Copy)]
struct Inventory(pub f32);

#[derive(Clone, Copy)]
struct Production(pub f32);

#[derive(Clone, Copy)]
struct Wage(pub f32);

#[derive(Clone, Copy)]
struct TargetInventory(pub f32);

#[derive(Clone, Copy)]
struct Price(pub f32);

#[derive(Clone, Copy, Default)]
struct Starving;

static INIT: Once = Once::new();

fn init() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

struct Systems {
    production: Query,
    wages: Query,
    pricing: Query,
    spending: Query,
    hunger: Query,
    starvation: Query,
}

impl Systems {
    fn new(world: &World) -> Self {
        Self {
            production: world
                .query_builder()
                .data::<Production>()
                .data::<TargetInventory>()
                .data::<Inventory>()
                .build(),
            wages: world.query_builder().data::<Production>().data::<Wage>().data::<Cash>().build(),
            pricing: world
                .query_builder()
                .data::<Inventory>()
                .data::<TargetInventory>()
                .data::<Price>()
                .build(),
            spending: world.query_builder().with::<AgentTag>().data::<Cash>().build(),
            hunger: world.query_builder().data::<Cash>().data::<Hunger>().without::<FirmTag>().build(),
            starvation: world.query_builder().data::<Hunger>().without::<Starving>().build(),
        }
    }

    fn run(&mut self, world: &mut World) {
        for mut chunk in self.production.iter_mut(world) {
            let production: Vec<f32> = chunk.column::<Production>().unwrap_or(&[]).iter().map(|p| p.0).collect();
            let target: Vec<f32> = chunk.column::<TargetInventory>().unwrap_or(&[]).iter().map(|t| t.0).collect();
            if let Some(inventory) = chunk.column_mut::<Inventory>() {
                for ((inv, prod), target) in inventory.iter_mut().zip(production).zip(target) {
                    if inv.0 < target {
                        inv.0 += prod;
                    }
                }
            }
        }

        for mut chunk in self.wages.iter_mut(world) {
            let bill: Vec<f32> = {
                let production = chunk.column::<Production>().unwrap_or(&[]);
                let wage = chunk.column::<Wage>().unwrap_or(&[]);
                production.iter().zip(wage).map(|(p, w)| p.0 * w.0).collect()
            };
            if let Some(cash) = chunk.column_mut::<Cash>() {
                for (cash, bill) in cash.iter_mut().zip(bill) {
                    cash.0 -= bill;
                }
            }
        }

        for mut chunk in self.pricing.iter_mut(world) {
            let below: Vec<bool> = {
                let inventory = chunk.column::<Inventory>().unwrap_or(&[]);
                let target = chunk.column::<TargetInventory>().unwrap_or(&[]);
                inventory.iter().zip(target).map(|(i, t)| i.0 < t.0).collect()
            };
            if let Some(price) = chunk.column_mut::<Price>() {
                for (price, below) in price.iter_mut().zip(below) {
                    price.0 *= if below { 1.01 } else { 0.99 };
                }
            }
        }

        for mut chunk in self.spending.iter_mut(world) {
            if let Some(cash) = chunk.column_mut::<Cash>() {
                for cash in cash {
                    if cash.0 >= 1.0 {
                        cash.0 -= 1.0;
                    }
                }
            }
        }

        for mut chunk in self.hunger.iter_mut(world) {
            if let Some((cash, hunger)) = chunk.columns_mut::<Cash, Hunger>() {
                for (cash, hunger) in cash.iter().zip(hunger.iter_mut()) {
                    if cash.0 >= 1.0 {
                        hunger.0 = (hunger.0 - 1.0).max(0.0);
                    } else {
                        hunger.0 += 1.0;
                    }
                }
            }
        }

        self.starvation.each(world, |chunk, commands| {
            for row in chunk.rows() {
                if chunk.get::<Hunger>(row).map_or(false, |h| h.0 >= 3.0) {
                    commands.add::<Starving>(chunk.entities()[row]);
                }
            }
        });
    }
}

fn average_price(world: &World, query: &mut Query) -> f32 {
    let (sum, count) = query
        .iter(world)
        .filter_map(|chunk| chunk.column::<Price>())
        .flatten()
        .fold((0.0f32, 0usize), |(sum, count), price| (sum + price.0, count + 1));
    sum / count as f32
}

#[test]
fn toy_economy_runs_and_stays_consistent() {
    init();
    let mut world = World::new();

    for _ in 0..10 {
        world.spawn_bundle(
            Bundle::new()
                .with(FirmTag)
                .with(Cash(10_000.0))
                .with(Inventory(100.0))
                .with(Production(5.0))
                .with(Wage(1.0))
                .with(TargetInventory(200.0))
                .with(Price(1.0)),
        );
    }

    world.begin_deferred();
    for i in 0..1_000 {
        let agent = world.spawn();
        world.add::<AgentTag>(agent);
        world.set(agent, Cash(if i % 4 == 0 { 2.0 } else { 100.0 }));
        world.set(agent, Hunger(0.0));
    }
    world.end_deferred();
    assert_eq!(world.entity_count(), 1_010);

    let mut systems = Systems::new(&world);
    let mut prices = world.query_builder().data::<Price>().with::<FirmTag>().build();
    let mut repriced = world.query_builder().changed::<Price>().build();

    for step in 0..20 {
        let this_run = world.update();
        repriced.advance(this_run);
        systems.run(&mut world);

        let average = average_price(&world, &mut prices);
        assert!(average > 0.0, "step {step}: average price {average}");
    }

    // inventories started below target, so prices only went up
    let average = average_price(&world, &mut prices);
    assert!(average > 1.0);

    // every firm was repriced during the last step's window
    repriced.advance(world.update());
    assert_eq!(repriced.entities(&world).len(), 10);

    // agents that started with 2.0 ran out of cash after two steps
    let mut starving = world.query_builder().with::<Starving>().build();
    assert_eq!(starving.count(&world), 250);

    let mut firms = world.query_builder().with::<FirmTag>().data::<Cash>().build();
    for chunk in firms.iter(&world) {
        for cash in chunk.column::<Cash>().unwrap_or(&[]) {
            assert!((cash.0 - (10_000.0 - 20.0 * 5.0)).abs() < 1e-3);
        }
    }
}
