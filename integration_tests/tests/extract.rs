mod common;

use anyhow::Result;

use epi_core::SimulationController;

use epi_runtime::{
    encode_message, Area, HealthState, LocationDef, LocationKind, Message, PersonRecord, Position,
    Timetable,
};

#[test]
fn same_window_twice_is_identical() -> Result<()> {
    let (mut coordinator, workers) =
        common::cluster(Position::new(12, 8), 4, common::frozen_parameters())?;
    let restaurant = Position::new(5, 3);
    coordinator.distribute_locations(&[LocationDef::open(LocationKind::Restaurant, restaurant)])?;
    coordinator.distribute_people(vec![
        PersonRecord::new(1, HealthState::Infected, restaurant, Timetable::new()),
        PersonRecord::new(2, HealthState::Cured, Position::new(9, 7), Timetable::new()),
    ])?;

    let window = Area::new(Position::new(4, 2), Position::new(6, 6));
    coordinator.set_extract_window(window);
    let first = coordinator.refresh_extract()?;
    let second = coordinator.refresh_extract()?;
    assert_eq!(first, second);
    assert_eq!(
        encode_message(&Message::Extract(first.entries())),
        encode_message(&Message::Extract(second.entries()))
    );

    assert!(first.is_complete());
    assert_eq!(first.filled(), 36);
    let cell = first.get(restaurant).expect("restaurant cell");
    assert_eq!(cell.kind, LocationKind::Restaurant);
    assert_eq!(cell.stats.infected, 1);
    assert_eq!(first.total().total(), 2);

    coordinator.exit_shards();
    workers.join()?;
    Ok(())
}

#[test]
fn window_outside_the_world_is_empty() -> Result<()> {
    let (mut coordinator, workers) =
        common::cluster(Position::new(10, 10), 2, common::frozen_parameters())?;
    coordinator.set_extract_window(Area::new(Position::new(20, 20), Position::new(5, 5)));
    let extract = coordinator.refresh_extract()?;
    assert_eq!(extract.filled(), 0);
    assert_eq!(coordinator.last_extract(), Some(extract));

    coordinator.exit_shards();
    workers.join()?;
    Ok(())
}

#[test]
fn oversized_window_is_clipped_to_the_world() -> Result<()> {
    let (mut coordinator, workers) =
        common::cluster(Position::new(12, 8), 2, common::frozen_parameters())?;
    let world = Area::new(Position::new(0, 0), Position::new(12, 8));
    let huge = Area::new(
        Position::new(-1_000_000_000, -1_000_000_000),
        Position::new(i32::MAX, i32::MAX),
    );
    coordinator.set_extract_window(huge);
    assert_eq!(coordinator.extract_window(), world);
    let extract = coordinator.refresh_extract()?;
    assert_eq!(extract.window(), world);
    assert!(extract.is_complete());
    assert_eq!(extract.filled(), 96);

    let controller = SimulationController::spawn(coordinator);
    let latest = controller.extract(huge).expect("extract from setup");
    assert_eq!(latest.window(), world);
    controller.wait_idle();
    let refreshed = controller.extract(huge).expect("refreshed extract");
    assert_eq!(refreshed.filled(), 96);

    controller.shutdown();
    workers.join()?;
    Ok(())
}
