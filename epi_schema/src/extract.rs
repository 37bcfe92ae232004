use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{FieldParseError, LocationKind, Position, Stats};

/// Aggregated view of one cell: its type and a tally of its occupants.
/// Never carries identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractEntry {
    pub position: Position,
    pub kind: LocationKind,
    pub stats: Stats,
}

/// `<x>,<y>;<type>;<stats>`.
impl fmt::Display for ExtractEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{};{}", self.position, self.kind, self.stats)
    }
}

impl FromStr for ExtractEntry {
    type Err = FieldParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split(';').collect();
        if fields.len() != 3 {
            return Err(FieldParseError::Arity {
                value: s.to_string(),
                context: "extract entry",
                expected: 3,
            });
        }
        Ok(ExtractEntry {
            position: fields[0].parse()?,
            kind: fields[1].parse()?,
            stats: fields[2].parse()?,
        })
    }
}
