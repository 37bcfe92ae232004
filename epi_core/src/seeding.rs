use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;

use epi_runtime::{
    HealthState, LocationDef, LocationKind, PersonId, PersonRecord, Position, Timetable,
};

use crate::config::SimulationConfig;

const HOME_HOURS: std::ops::Range<usize> = 0..6;
const WORK_HOURS: std::ops::Range<usize> = 7..15;
const EVENING_HOURS: std::ops::Range<usize> = 19..22;
const EMPLOYMENT_RATE: f64 = 0.8;
const EVENING_OUT_RATE: f64 = 0.5;

/// Initial world handed to the shards during setup.
#[derive(Debug, Clone, Default)]
pub struct SeededWorld {
    pub locations: Vec<LocationDef>,
    pub people: Vec<PersonRecord>,
}

/// Demo population: whitelisted homes, whitelisted workplaces and open
/// restaurants on distinct random cells, with people scheduled between them.
pub fn generate_world<R: Rng + ?Sized>(config: &SimulationConfig, rng: &mut R) -> SeededWorld {
    let mut free = FreeCells::new(config.world_size);
    let homes = free.take(config.households.max(1) as usize, rng);
    if homes.is_empty() {
        tracing::warn!(target: "epigrid::coordinator", "seeding.world_full");
        return SeededWorld::default();
    }
    let workplaces = free.take(config.workplaces as usize, rng);
    let restaurants = free.take(config.restaurants as usize, rng);

    let mut residents: BTreeMap<Position, Vec<PersonId>> = BTreeMap::new();
    let mut staff: BTreeMap<Position, Vec<PersonId>> = BTreeMap::new();
    let mut people = Vec::with_capacity(config.population as usize);

    for id in 0..config.population {
        let home = homes[rng.gen_range(0..homes.len())];
        let mut timetable = Timetable::new();
        for hour in HOME_HOURS {
            timetable.set_occupation(hour, home);
        }
        residents.entry(home).or_default().push(id);

        if !workplaces.is_empty() && rng.gen_bool(EMPLOYMENT_RATE) {
            let work = workplaces[rng.gen_range(0..workplaces.len())];
            for hour in WORK_HOURS {
                timetable.set_occupation(hour, work);
            }
            staff.entry(work).or_default().push(id);
        }
        if !restaurants.is_empty() && rng.gen_bool(EVENING_OUT_RATE) {
            let restaurant = restaurants[rng.gen_range(0..restaurants.len())];
            for hour in EVENING_HOURS {
                timetable.set_occupation(hour, restaurant);
            }
        }

        people.push(PersonRecord::new(id, initial_health(config, rng), home, timetable));
    }

    let mut locations = Vec::with_capacity(homes.len() + workplaces.len() + restaurants.len());
    for home in homes {
        let whitelist = residents.remove(&home).unwrap_or_default();
        locations.push(LocationDef::whitelisted(LocationKind::Home, home, whitelist));
    }
    for work in workplaces {
        let whitelist = staff.remove(&work).unwrap_or_default();
        locations.push(LocationDef::whitelisted(LocationKind::Workplace, work, whitelist));
    }
    for restaurant in restaurants {
        locations.push(LocationDef::open(LocationKind::Restaurant, restaurant));
    }

    tracing::info!(
        target: "epigrid::coordinator",
        locations = locations.len(),
        people = people.len(),
        "seeding.generated"
    );
    SeededWorld { locations, people }
}

fn initial_health<R: Rng + ?Sized>(config: &SimulationConfig, rng: &mut R) -> HealthState {
    let r = rng.gen::<f64>();
    if r < config.initial_vaccinated_rate {
        HealthState::Vaccinated
    } else if r < config.initial_vaccinated_rate + config.initial_infected_rate {
        HealthState::Infected
    } else {
        HealthState::Healthy
    }
}

struct FreeCells {
    world: Position,
    taken: BTreeSet<Position>,
}

impl FreeCells {
    fn new(world: Position) -> Self {
        Self {
            world,
            taken: BTreeSet::new(),
        }
    }

    fn capacity(&self) -> usize {
        (self.world.x.max(0) as usize * self.world.y.max(0) as usize)
            .saturating_sub(self.taken.len())
    }

    /// Up to `count` distinct, previously untaken cells.
    fn take<R: Rng + ?Sized>(&mut self, count: usize, rng: &mut R) -> Vec<Position> {
        let count = count.min(self.capacity());
        let mut cells = Vec::with_capacity(count);
        while cells.len() < count {
            let cell = Position::random_within(self.world, rng);
            if self.taken.insert(cell) {
                cells.push(cell);
            }
        }
        cells
    }
}
