use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{FieldParseError, HealthState, Position};

/// Process-wide unique personal number, assigned once at generation.
pub type PersonId = u32;

pub const HOURS_PER_DAY: usize = 24;

/// Hourly schedule: for each hour of the day an optional target cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timetable {
    slots: [Option<Position>; HOURS_PER_DAY],
}

impl Timetable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target for the given hour of day; hours wrap around the day.
    pub fn occupation(&self, hour: u64) -> Option<Position> {
        self.slots[(hour % HOURS_PER_DAY as u64) as usize]
    }

    /// Ignores hours outside `0..24`.
    pub fn set_occupation(&mut self, hour: usize, position: Position) {
        if let Some(slot) = self.slots.get_mut(hour) {
            *slot = Some(position);
        }
    }

    pub fn clear_occupation(&mut self, hour: usize) {
        if let Some(slot) = self.slots.get_mut(hour) {
            *slot = None;
        }
    }

    pub fn is_free(&self, hour: usize) -> bool {
        self.slots.get(hour).map_or(false, Option::is_none)
    }
}

/// 24 `;`-separated slots, each empty or `x,y`.
impl fmt::Display for Timetable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (hour, slot) in self.slots.iter().enumerate() {
            if hour > 0 {
                f.write_str(";")?;
            }
            if let Some(position) = slot {
                write!(f, "{position}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for Timetable {
    type Err = FieldParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split(';').collect();
        if fields.len() != HOURS_PER_DAY {
            return Err(FieldParseError::Arity {
                value: s.to_string(),
                context: "timetable",
                expected: HOURS_PER_DAY,
            });
        }
        let mut timetable = Timetable::new();
        for (hour, field) in fields.into_iter().enumerate() {
            if !field.is_empty() {
                timetable.set_occupation(hour, field.parse()?);
            }
        }
        Ok(timetable)
    }
}

/// Serializable state of a person, used whenever a person crosses the wire.
/// The receiver reconstructs a fresh entity from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub id: PersonId,
    pub health: HealthState,
    pub home: Position,
    pub timetable: Timetable,
}

impl PersonRecord {
    pub fn new(id: PersonId, health: HealthState, home: Position, timetable: Timetable) -> Self {
        Self {
            id,
            health,
            home,
            timetable,
        }
    }
}
