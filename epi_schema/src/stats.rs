use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{parse_u64, FieldParseError, HealthState};

/// Head count per health state. Closed under addition, so per-cell,
/// per-shard and whole-world tallies aggregate the same way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stats {
    pub healthy: u64,
    pub infected: u64,
    pub cured: u64,
    pub quarantined: u64,
    pub deceased: u64,
    pub vaccinated: u64,
}

impl Stats {
    pub fn update(&mut self, other: &Stats) {
        self.healthy += other.healthy;
        self.infected += other.infected;
        self.cured += other.cured;
        self.quarantined += other.quarantined;
        self.deceased += other.deceased;
        self.vaccinated += other.vaccinated;
    }

    pub fn count(&mut self, health: HealthState) {
        *self.slot_mut(health) += 1;
    }

    pub fn get(&self, health: HealthState) -> u64 {
        match health {
            HealthState::Healthy => self.healthy,
            HealthState::Infected => self.infected,
            HealthState::Cured => self.cured,
            HealthState::Quarantined => self.quarantined,
            HealthState::Deceased => self.deceased,
            HealthState::Vaccinated => self.vaccinated,
        }
    }

    fn slot_mut(&mut self, health: HealthState) -> &mut u64 {
        match health {
            HealthState::Healthy => &mut self.healthy,
            HealthState::Infected => &mut self.infected,
            HealthState::Cured => &mut self.cured,
            HealthState::Quarantined => &mut self.quarantined,
            HealthState::Deceased => &mut self.deceased,
            HealthState::Vaccinated => &mut self.vaccinated,
        }
    }

    pub fn total(&self) -> u64 {
        self.healthy + self.infected + self.cured + self.quarantined + self.deceased + self.vaccinated
    }

    /// People that can still spread the disease.
    pub fn active_cases(&self) -> u64 {
        self.infected + self.quarantined
    }
}

impl FromIterator<HealthState> for Stats {
    fn from_iter<I: IntoIterator<Item = HealthState>>(iter: I) -> Self {
        let mut stats = Stats::default();
        for health in iter {
            stats.count(health);
        }
        stats
    }
}

impl Add for Stats {
    type Output = Stats;

    fn add(mut self, other: Stats) -> Stats {
        self.update(&other);
        self
    }
}

impl AddAssign for Stats {
    fn add_assign(&mut self, other: Stats) {
        self.update(&other);
    }
}

impl Sum for Stats {
    fn sum<I: Iterator<Item = Stats>>(iter: I) -> Stats {
        iter.fold(Stats::default(), Add::add)
    }
}

/// Wire order: healthy, infected, cured, quarantined, deceased, vaccinated.
impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{}",
            self.healthy, self.infected, self.cured, self.quarantined, self.deceased, self.vaccinated
        )
    }
}

impl FromStr for Stats {
    type Err = FieldParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split(',').collect();
        if fields.len() != 6 {
            return Err(FieldParseError::Arity {
                value: s.to_string(),
                context: "stats",
                expected: 6,
            });
        }
        Ok(Stats {
            healthy: parse_u64(fields[0], "stats healthy")?,
            infected: parse_u64(fields[1], "stats infected")?,
            cured: parse_u64(fields[2], "stats cured")?,
            quarantined: parse_u64(fields[3], "stats quarantined")?,
            deceased: parse_u64(fields[4], "stats deceased")?,
            vaccinated: parse_u64(fields[5], "stats vaccinated")?,
        })
    }
}
