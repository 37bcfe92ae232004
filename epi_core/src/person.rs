use rand::Rng;

use epi_runtime::{ContagionParameters, HealthState, PersonId, PersonRecord, Position, Timetable};

/// Half-width of the random walk box (an 11x11 box centred on the person).
pub const RANDOM_WALK_RADIUS: i32 = 5;

/// A resident of a shard. Reconstructed from a [`PersonRecord`] whenever it
/// arrives over the wire; `cell` is shard-local and never transmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    id: PersonId,
    health: HealthState,
    home: Position,
    timetable: Timetable,
    cell: Option<Position>,
}

impl Person {
    pub fn from_record(record: PersonRecord) -> Self {
        Self {
            id: record.id,
            health: record.health,
            home: record.home,
            timetable: record.timetable,
            cell: None,
        }
    }

    pub fn to_record(&self) -> PersonRecord {
        PersonRecord::new(self.id, self.health, self.home, self.timetable)
    }

    pub fn id(&self) -> PersonId {
        self.id
    }

    pub fn health(&self) -> HealthState {
        self.health
    }

    pub fn home(&self) -> Position {
        self.home
    }

    pub fn timetable(&self) -> &Timetable {
        &self.timetable
    }

    /// Cell the person currently occupies, `None` until placed.
    pub fn cell(&self) -> Option<Position> {
        self.cell
    }

    pub(crate) fn set_cell(&mut self, cell: Option<Position>) {
        self.cell = cell;
    }

    pub fn set_health(&mut self, health: HealthState) {
        self.health = health;
    }

    /// Where the person wants to be for `hour`, first match wins: the dead
    /// stay put, the quarantined go home, then the timetable, then home when
    /// free time is banned, otherwise a uniform step inside the 11x11 box
    /// around the current cell.
    pub fn next_position<R: Rng + ?Sized>(
        &self,
        hour: u64,
        params: &ContagionParameters,
        rng: &mut R,
    ) -> Position {
        let current = self.cell.unwrap_or(self.home);
        if self.health == HealthState::Deceased {
            return current;
        }
        if self.health == HealthState::Quarantined {
            return self.home;
        }
        if let Some(target) = self.timetable.occupation(hour) {
            return target;
        }
        if params.free_time_ban {
            return self.home;
        }
        let span = Position::new(2 * RANDOM_WALK_RADIUS + 1, 2 * RANDOM_WALK_RADIUS + 1);
        let step = Position::random_within(span, rng)
            - Position::new(RANDOM_WALK_RADIUS, RANDOM_WALK_RADIUS);
        current + step
    }

    /// Flips the infection coin for a healthy person. Returns whether the
    /// person became infected.
    pub fn try_infect<R: Rng + ?Sized>(&mut self, chance: f64, rng: &mut R) -> bool {
        if self.health != HealthState::Healthy {
            return false;
        }
        if rng.gen::<f64>() < chance {
            self.health = HealthState::Infected;
            return true;
        }
        false
    }

    /// One cascading-threshold draw for an infectious person.
    pub fn progress_disease<R: Rng + ?Sized>(&mut self, params: &ContagionParameters, rng: &mut R) {
        if !self.health.is_infectious() {
            return;
        }
        let r = rng.gen::<f64>();
        self.health = params.resolve_outcome(self.health, r);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn person(health: HealthState) -> Person {
        let mut timetable = Timetable::new();
        timetable.set_occupation(8, Position::new(40, 40));
        let mut p = Person::from_record(PersonRecord::new(
            1,
            health,
            Position::new(3, 3),
            timetable,
        ));
        p.set_cell(Some(Position::new(20, 20)));
        p
    }

    #[test]
    fn movement_priority() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let params = ContagionParameters::default();

        let dead = person(HealthState::Deceased);
        assert_eq!(dead.next_position(8, &params, &mut rng), Position::new(20, 20));

        let quarantined = person(HealthState::Quarantined);
        assert_eq!(
            quarantined.next_position(8, &params, &mut rng),
            Position::new(3, 3)
        );

        let healthy = person(HealthState::Healthy);
        assert_eq!(
            healthy.next_position(8, &params, &mut rng),
            Position::new(40, 40)
        );
        assert_eq!(
            healthy.next_position(32, &params, &mut rng),
            Position::new(40, 40)
        );

        let banned = ContagionParameters {
            free_time_ban: true,
            ..params.clone()
        };
        assert_eq!(healthy.next_position(9, &banned, &mut rng), Position::new(3, 3));
    }

    #[test]
    fn random_walk_stays_in_box() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let params = ContagionParameters::default();
        let walker = person(HealthState::Healthy);
        let corner = Position::new(20 - RANDOM_WALK_RADIUS, 20 - RANDOM_WALK_RADIUS);
        let size = Position::new(11, 11);
        let mut seen_moves = 0;
        for _ in 0..1000 {
            let next = walker.next_position(10, &params, &mut rng);
            assert!(next.is_in_area(corner, size), "{next} left the walk box");
            if next != Position::new(20, 20) {
                seen_moves += 1;
            }
        }
        assert!(seen_moves > 900);
    }

    #[test]
    fn only_healthy_people_get_infected() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut cured = person(HealthState::Cured);
        assert!(!cured.try_infect(1.0, &mut rng));
        let mut healthy = person(HealthState::Healthy);
        assert!(!healthy.try_infect(0.0, &mut rng));
        assert!(healthy.try_infect(1.0, &mut rng));
        assert_eq!(healthy.health(), HealthState::Infected);
    }

    #[test]
    fn record_round_trip_drops_placement() {
        let p = person(HealthState::Infected);
        let rebuilt = Person::from_record(p.to_record());
        assert_eq!(rebuilt.cell(), None);
        assert_eq!(rebuilt.to_record(), p.to_record());
    }
}
