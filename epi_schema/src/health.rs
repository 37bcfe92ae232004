use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::FieldParseError;

/// Health of one simulated person.
///
/// `Healthy` may become `Infected`; `Infected` may become `Quarantined`,
/// `Deceased` or `Cured`; `Quarantined` may become `Deceased` or `Cured`.
/// `Cured`, `Deceased` and `Vaccinated` never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Infected,
    Cured,
    Deceased,
    Quarantined,
    Vaccinated,
}

impl HealthState {
    pub const ALL: [HealthState; 6] = [
        HealthState::Healthy,
        HealthState::Infected,
        HealthState::Cured,
        HealthState::Deceased,
        HealthState::Quarantined,
        HealthState::Vaccinated,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HealthState::Healthy => "healthy",
            HealthState::Infected => "infected",
            HealthState::Cured => "cured",
            HealthState::Deceased => "deceased",
            HealthState::Quarantined => "quarantined",
            HealthState::Vaccinated => "vaccinated",
        }
    }

    /// Infected and quarantined people both spread the disease.
    pub fn is_infectious(self) -> bool {
        matches!(self, HealthState::Infected | HealthState::Quarantined)
    }

    pub fn is_alive(self) -> bool {
        self != HealthState::Deceased
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthState {
    type Err = FieldParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HealthState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| FieldParseError::UnknownHealth(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for state in HealthState::ALL {
            assert_eq!(state.to_string().parse::<HealthState>(), Ok(state));
        }
        assert!("zombie".parse::<HealthState>().is_err());
    }

    #[test]
    fn infectious_states() {
        let infectious: Vec<_> = HealthState::ALL
            .into_iter()
            .filter(|s| s.is_infectious())
            .collect();
        assert_eq!(
            infectious,
            vec![HealthState::Infected, HealthState::Quarantined]
        );
    }
}
