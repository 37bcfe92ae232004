use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use epi_core::{generate_world, ShardGrid, SimulationConfig};
use epi_runtime::{Area, Position};

fn populated_grid(side: i32) -> ShardGrid {
    let config = SimulationConfig {
        world_size: Position::new(side, side),
        population: (side * side / 4) as u32,
        households: (side * side / 12) as u32,
        workplaces: (side / 4) as u32,
        restaurants: (side / 8) as u32,
        ..SimulationConfig::default()
    };
    let world = generate_world(&config, &mut ChaCha8Rng::seed_from_u64(42));
    let mut grid = ShardGrid::new();
    grid.set_up(Area::from_size(config.world_size));
    grid.set_parameters(config.contagion.clone());
    for def in &world.locations {
        grid.add_location(def);
    }
    for person in world.people {
        let home = person.home;
        grid.add_person(person, home);
    }
    grid
}

fn bench_round(c: &mut Criterion) {
    let mut group = c.benchmark_group("shard_round");

    for side in [32, 64, 128] {
        group.bench_with_input(BenchmarkId::new("move_people", side), &side, |b, &side| {
            b.iter_batched(
                || (populated_grid(side), ChaCha8Rng::seed_from_u64(7)),
                |(mut grid, mut rng)| {
                    for migrant in grid.move_people(&mut rng) {
                        grid.confirm(migrant.person.id, false);
                    }
                    grid
                },
                BatchSize::LargeInput,
            )
        });
        group.bench_with_input(
            BenchmarkId::new("calculate_health", side),
            &side,
            |b, &side| {
                b.iter_batched(
                    || (populated_grid(side), ChaCha8Rng::seed_from_u64(7)),
                    |(mut grid, mut rng)| {
                        grid.calculate_health(&mut rng);
                        grid
                    },
                    BatchSize::LargeInput,
                )
            },
        );
    }

    group.finish();
}

criterion_group!(shard_benches, bench_round);
criterion_main!(shard_benches);
