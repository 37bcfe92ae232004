mod common;

use std::time::Duration;

use anyhow::Result;

use epi_core::{RoundEvent, SimulationController};
use epi_runtime::{Area, ContagionParameters, HealthState, PersonRecord, Position, Timetable};

#[test]
fn stepped_rounds_report_once_each() -> Result<()> {
    let (mut coordinator, workers) =
        common::cluster(Position::new(10, 10), 2, common::frozen_parameters())?;
    coordinator.distribute_people(vec![
        PersonRecord::new(1, HealthState::Infected, Position::new(2, 2), Timetable::new()),
        PersonRecord::new(2, HealthState::Healthy, Position::new(7, 7), Timetable::new()),
    ])?;

    let controller = SimulationController::spawn(coordinator);
    let first_outcome = controller.step();
    let second_outcome = controller.step();
    let first = first_outcome.recv()??;
    let second = second_outcome.recv()??;
    assert_eq!((first.round, second.round), (1, 2));
    assert!(!second.finished);
    assert_eq!(second.stats.infected, 1);
    assert!(first_outcome.recv().is_err());

    controller.wait_idle();
    assert!(!controller.is_round_in_progress());

    let window = Area::new(Position::new(0, 0), Position::new(4, 4));
    let stale = controller.extract(window).expect("extract after a round");
    assert_eq!(stale.window(), window);
    controller.wait_idle();
    let fresh = controller.extract(window).expect("refreshed extract");
    assert!(fresh.is_complete());
    assert_eq!(fresh.filled(), 16);

    controller.shutdown();
    workers.join()?;
    Ok(())
}

#[test]
fn autoplay_runs_until_nobody_is_infectious() -> Result<()> {
    let params = ContagionParameters {
        default_spread_chance: 0.0,
        recovery_chance: 0.5,
        death_chance: 0.0,
        quarantine_chance: 0.0,
        ..ContagionParameters::default()
    };
    let (mut coordinator, workers) = common::cluster(Position::new(10, 10), 2, params)?;
    coordinator.distribute_people(
        (0..6)
            .map(|id| {
                PersonRecord::new(
                    id,
                    HealthState::Infected,
                    Position::new(id as i32, id as i32),
                    Timetable::new(),
                )
            })
            .collect(),
    )?;

    let controller = SimulationController::spawn(coordinator);
    let subscription = controller.subscribe();
    controller.set_autoplay(Some(Duration::from_millis(5)));

    let mut last_round = 0;
    let completed = loop {
        match subscription.next_timeout(Duration::from_secs(30))? {
            RoundEvent::RoundCompleted { round, .. } => {
                assert_eq!(round, last_round + 1);
                last_round = round;
            }
            RoundEvent::Completed { round, stats } => break (round, stats),
            RoundEvent::Failed { reason } => panic!("simulation failed: {reason}"),
        }
    };
    assert_eq!(completed.0, last_round);
    assert_eq!(completed.1.cured, 6);
    assert_eq!(completed.1.active_cases(), 0);

    controller.wait_idle();
    assert!(subscription.try_next().is_none());

    controller.shutdown();
    workers.join()?;
    Ok(())
}

#[test]
fn parameter_changes_apply_before_the_next_round() -> Result<()> {
    let (mut coordinator, workers) =
        common::cluster(Position::new(10, 10), 2, common::frozen_parameters())?;
    coordinator.distribute_people(vec![PersonRecord::new(
        1,
        HealthState::Infected,
        Position::new(3, 3),
        Timetable::new(),
    )])?;

    let controller = SimulationController::spawn(coordinator);
    controller.set_parameters(ContagionParameters {
        recovery_chance: 1.0,
        ..common::frozen_parameters()
    });
    let report = controller.step().recv()??;
    assert!(report.finished);
    assert_eq!(report.stats.cured, 1);

    controller.shutdown();
    workers.join()?;
    Ok(())
}
