use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{parse_bool, parse_f64, FieldParseError, HealthState, LocationKind, PolicySwitch};

/// Immutable snapshot of the disease and policy settings. Replaced as a whole
/// when policy changes; never edited field by field mid-round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContagionParameters {
    /// Chance that one infectious person infects one healthy co-located
    /// person during a single health pass.
    pub default_spread_chance: f64,
    pub recovery_chance: f64,
    pub death_chance: f64,
    pub quarantine_chance: f64,
    pub restaurants_open: bool,
    pub free_time_ban: bool,
    pub work_on_site: bool,
    pub schools_open: bool,
    pub home_spread_multiplier: f64,
    pub workplace_spread_multiplier: f64,
    pub school_spread_multiplier: f64,
    pub restaurant_spread_multiplier: f64,
    pub masks: bool,
    pub masks_multiplier: f64,
}

impl Default for ContagionParameters {
    fn default() -> Self {
        Self {
            default_spread_chance: 0.05,
            recovery_chance: 0.01,
            death_chance: 0.001,
            quarantine_chance: 0.02,
            restaurants_open: true,
            free_time_ban: false,
            work_on_site: true,
            schools_open: true,
            home_spread_multiplier: 2.0,
            workplace_spread_multiplier: 1.5,
            school_spread_multiplier: 1.8,
            restaurant_spread_multiplier: 1.2,
            masks: false,
            masks_multiplier: 0.5,
        }
    }
}

impl ContagionParameters {
    pub const FIELD_COUNT: usize = 14;

    pub fn is_open(&self, switch: PolicySwitch) -> bool {
        match switch {
            PolicySwitch::RestaurantsOpen => self.restaurants_open,
            PolicySwitch::SchoolsOpen => self.schools_open,
            PolicySwitch::WorkOnSite => self.work_on_site,
        }
    }

    pub fn kind_multiplier(&self, kind: LocationKind) -> f64 {
        match kind {
            LocationKind::Default => 1.0,
            LocationKind::Home => self.home_spread_multiplier,
            LocationKind::School => self.school_spread_multiplier,
            LocationKind::Workplace => self.workplace_spread_multiplier,
            LocationKind::Restaurant => self.restaurant_spread_multiplier,
        }
    }

    /// Per-contact infection chance inside a cell of the given kind.
    pub fn effective_spread(&self, kind: LocationKind) -> f64 {
        let mut chance = self.default_spread_chance * self.kind_multiplier(kind);
        if self.masks && kind.policy().masked {
            chance *= self.masks_multiplier;
        }
        chance
    }

    /// Applies one uniform draw `r` in `[0, 1)` to an infectious person.
    ///
    /// Thresholds are cumulative and checked from the widest band inward:
    /// `r < quarantine + death + recovery` quarantines, `r < death +
    /// recovery` kills, `r < recovery` cures. The narrower band wins, so
    /// recovery takes precedence over death and death over quarantine.
    /// Non-infectious states pass through unchanged.
    pub fn resolve_outcome(&self, current: HealthState, r: f64) -> HealthState {
        if !current.is_infectious() {
            return current;
        }
        let mut next = current;
        if r < self.quarantine_chance + self.death_chance + self.recovery_chance {
            next = HealthState::Quarantined;
        }
        if r < self.death_chance + self.recovery_chance {
            next = HealthState::Deceased;
        }
        if r < self.recovery_chance {
            next = HealthState::Cured;
        }
        next
    }
}

/// The fourteen colon-separated fields, without the message kind prefix.
impl fmt::Display for ContagionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}",
            self.default_spread_chance,
            self.recovery_chance,
            self.death_chance,
            self.quarantine_chance,
            self.restaurants_open,
            self.free_time_ban,
            self.work_on_site,
            self.schools_open,
            self.home_spread_multiplier,
            self.workplace_spread_multiplier,
            self.school_spread_multiplier,
            self.restaurant_spread_multiplier,
            self.masks,
            self.masks_multiplier,
        )
    }
}

impl FromStr for ContagionParameters {
    type Err = FieldParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let f: Vec<&str> = s.split(':').collect();
        if f.len() != Self::FIELD_COUNT {
            return Err(FieldParseError::Arity {
                value: s.to_string(),
                context: "contagion parameters",
                expected: Self::FIELD_COUNT,
            });
        }
        Ok(ContagionParameters {
            default_spread_chance: parse_f64(f[0], "default spread chance")?,
            recovery_chance: parse_f64(f[1], "recovery chance")?,
            death_chance: parse_f64(f[2], "death chance")?,
            quarantine_chance: parse_f64(f[3], "quarantine chance")?,
            restaurants_open: parse_bool(f[4], "restaurants open")?,
            free_time_ban: parse_bool(f[5], "free time ban")?,
            work_on_site: parse_bool(f[6], "work on site")?,
            schools_open: parse_bool(f[7], "schools open")?,
            home_spread_multiplier: parse_f64(f[8], "home spread multiplier")?,
            workplace_spread_multiplier: parse_f64(f[9], "workplace spread multiplier")?,
            school_spread_multiplier: parse_f64(f[10], "school spread multiplier")?,
            restaurant_spread_multiplier: parse_f64(f[11], "restaurant spread multiplier")?,
            masks: parse_bool(f[12], "masks")?,
            masks_multiplier: parse_f64(f[13], "masks multiplier")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn even_odds() -> ContagionParameters {
        ContagionParameters {
            recovery_chance: 0.2,
            death_chance: 0.2,
            quarantine_chance: 0.2,
            ..ContagionParameters::default()
        }
    }

    #[test]
    fn cascading_thresholds_prefer_recovery_then_death() {
        let params = even_odds();
        let infected = HealthState::Infected;
        assert_eq!(params.resolve_outcome(infected, 0.05), HealthState::Cured);
        assert_eq!(params.resolve_outcome(infected, 0.25), HealthState::Deceased);
        assert_eq!(params.resolve_outcome(infected, 0.45), HealthState::Quarantined);
        assert_eq!(params.resolve_outcome(infected, 0.75), HealthState::Infected);
        assert_eq!(
            params.resolve_outcome(HealthState::Quarantined, 0.75),
            HealthState::Quarantined
        );
        assert_eq!(
            params.resolve_outcome(HealthState::Quarantined, 0.1),
            HealthState::Cured
        );
    }

    #[test]
    fn terminal_and_healthy_states_are_untouched() {
        let params = even_odds();
        for state in [
            HealthState::Healthy,
            HealthState::Cured,
            HealthState::Deceased,
            HealthState::Vaccinated,
        ] {
            assert_eq!(params.resolve_outcome(state, 0.0), state);
        }
    }

    #[test]
    fn effective_spread_applies_kind_and_mask_multipliers() {
        let params = ContagionParameters {
            default_spread_chance: 0.1,
            masks: true,
            masks_multiplier: 0.5,
            restaurant_spread_multiplier: 2.0,
            home_spread_multiplier: 3.0,
            ..ContagionParameters::default()
        };
        assert!((params.effective_spread(LocationKind::Default) - 0.1).abs() < 1e-12);
        assert!((params.effective_spread(LocationKind::Restaurant) - 0.1).abs() < 1e-12);
        // masks never apply at home
        assert!((params.effective_spread(LocationKind::Home) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn text_form_is_stable() {
        let params = ContagionParameters {
            default_spread_chance: 0.125,
            masks: true,
            ..ContagionParameters::default()
        };
        let encoded = params.to_string();
        assert_eq!(encoded.split(':').count(), ContagionParameters::FIELD_COUNT);
        let decoded: ContagionParameters = encoded.parse().unwrap();
        assert_eq!(decoded, params);
        assert_eq!(decoded.to_string(), encoded);
        assert!("0.1:0.2".parse::<ContagionParameters>().is_err());
    }

    #[test]
    fn deserializes_partial_json_over_defaults() {
        let params: ContagionParameters =
            serde_json::from_str(r#"{ "masks": true, "recovery_chance": 0.3 }"#).unwrap();
        assert!(params.masks);
        assert_eq!(params.recovery_chance, 0.3);
        assert_eq!(
            params.default_spread_chance,
            ContagionParameters::default().default_spread_chance
        );
    }
}
