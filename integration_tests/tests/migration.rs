mod common;

use std::collections::BTreeSet;

use anyhow::Result;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use epi_core::{generate_world, SimulationConfig};
use epi_runtime::{
    Area, ContagionParameters, HealthState, LocationDef, LocationKind, PersonId, PersonRecord,
    Position, Timetable, HOURS_PER_DAY,
};

fn heading_to(id: PersonId, home: Position, target: Position) -> PersonRecord {
    let mut timetable = Timetable::new();
    for hour in 0..HOURS_PER_DAY {
        timetable.set_occupation(hour, target);
    }
    PersonRecord::new(id, HealthState::Healthy, home, timetable)
}

#[test]
fn border_crossing_moves_the_person_to_the_neighbour() -> Result<()> {
    let (mut coordinator, workers) =
        common::cluster(Position::new(10, 10), 2, common::frozen_parameters())?;
    let areas: Vec<Area> = coordinator.shards().iter().map(|s| s.bounds()).collect();
    assert_eq!(
        areas,
        vec![
            Area::new(Position::new(0, 0), Position::new(5, 10)),
            Area::new(Position::new(5, 0), Position::new(5, 10)),
        ]
    );

    let start = Position::new(4, 5);
    let report = coordinator.distribute_people(vec![
        heading_to(1, start, Position::new(6, 5)),
        heading_to(2, start, start),
    ])?;
    assert_eq!(report.accepted, 2);

    coordinator.make_round()?;
    let left = coordinator.shards()[0].fetch_stats()?;
    let right = coordinator.shards()[1].fetch_stats()?;
    assert_eq!(left.healthy, 1);
    assert_eq!(right.healthy, 1);

    coordinator.exit_shards();
    let grids = workers.join()?;
    assert!(grids[0].grid().resident(1).is_none());
    assert_eq!(
        grids[1].grid().resident(1).and_then(|p| p.cell()),
        Some(Position::new(6, 5))
    );
    assert_eq!(grids[0].grid().resident(2).and_then(|p| p.cell()), Some(start));
    Ok(())
}

#[test]
fn target_outside_the_world_is_refused_and_kept_home() -> Result<()> {
    let (mut coordinator, workers) =
        common::cluster(Position::new(10, 10), 2, common::frozen_parameters())?;
    let start = Position::new(0, 3);
    coordinator.distribute_people(vec![heading_to(5, start, Position::new(-1, 3))])?;

    for _ in 0..3 {
        let report = coordinator.make_round()?;
        assert_eq!(report.stats.total(), 1);
    }

    coordinator.exit_shards();
    let grids = workers.join()?;
    assert_eq!(grids[0].grid().resident(5).and_then(|p| p.cell()), Some(start));
    assert_eq!(grids[0].grid().awaiting_count(), 0);
    Ok(())
}

#[test]
fn neighbour_refusal_keeps_the_person_at_its_origin() -> Result<()> {
    let (mut coordinator, workers) =
        common::cluster(Position::new(10, 10), 2, common::frozen_parameters())?;
    let start = Position::new(4, 5);
    let locked_home = Position::new(6, 5);
    coordinator.distribute_locations(&[LocationDef::whitelisted(
        LocationKind::Home,
        locked_home,
        vec![99],
    )])?;
    coordinator.distribute_people(vec![heading_to(1, start, locked_home)])?;

    for _ in 0..3 {
        let report = coordinator.make_round()?;
        assert_eq!(report.stats.total(), 1);
        assert_eq!(coordinator.shards()[0].fetch_stats()?.total(), 1);
        assert_eq!(coordinator.shards()[1].fetch_stats()?.total(), 0);
        for shard in coordinator.shards() {
            assert_eq!(shard.waiting_people_len(), 0);
            assert_eq!(shard.waiting_confirmations_len(), 0);
        }
    }

    coordinator.exit_shards();
    let grids = workers.join()?;
    assert_eq!(grids[0].grid().resident(1).and_then(|p| p.cell()), Some(start));
    assert!(grids[1].grid().resident(1).is_none());
    assert_eq!(grids[0].grid().awaiting_count(), 0);
    assert_eq!(
        grids[1]
            .grid()
            .location(locked_home)
            .map(|cell| cell.visitor_count()),
        Some(0)
    );
    Ok(())
}

#[test]
fn population_is_conserved_across_rounds() -> Result<()> {
    let config = SimulationConfig {
        world_size: Position::new(40, 30),
        population: 400,
        households: 120,
        workplaces: 12,
        restaurants: 6,
        initial_infected_rate: 0.05,
        ..SimulationConfig::default()
    };
    let params = ContagionParameters {
        death_chance: 0.0,
        ..ContagionParameters::default()
    };
    let (mut coordinator, workers) = common::cluster(config.world_size, 4, params)?;
    let world = generate_world(&config, &mut ChaCha8Rng::seed_from_u64(31));
    coordinator.distribute_locations(&world.locations)?;
    let placed = coordinator.distribute_people(world.people)?;
    assert_eq!(placed.accepted, 400);
    assert_eq!(coordinator.refresh_stats()?.total(), 400);

    for round in 1..=30 {
        let report = coordinator.make_round()?;
        assert_eq!(report.round, round);
        assert_eq!(report.stats.total(), 400, "round {round}");
        for shard in coordinator.shards() {
            assert_eq!(shard.waiting_people_len(), 0);
            assert_eq!(shard.waiting_confirmations_len(), 0);
        }
    }
    assert_eq!(coordinator.stats_history().len(), 31);

    coordinator.exit_shards();
    let grids = workers.join()?;
    let mut seen = BTreeSet::new();
    for worker in &grids {
        for person in worker.grid().residents() {
            assert!(seen.insert(person.id()), "person {} on two shards", person.id());
            assert!(worker.grid().area().contains(person.cell().unwrap()));
        }
        assert_eq!(worker.grid().awaiting_count(), 0);
    }
    assert_eq!(seen.len(), 400);
    Ok(())
}
