use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{parse_u32, FieldParseError, PersonId, Position};

/// Cell type tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationKind {
    #[default]
    Default,
    Home,
    School,
    Workplace,
    Restaurant,
}

/// Policy flag that can close a cell type for everybody.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicySwitch {
    RestaurantsOpen,
    SchoolsOpen,
    WorkOnSite,
}

/// Admission and spread rules of one cell type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationPolicy {
    /// Only listed personal numbers may enter.
    pub whitelisted: bool,
    /// Closed for everybody while the switch is off.
    pub switch: Option<PolicySwitch>,
    /// The mask multiplier applies when masks are mandated.
    pub masked: bool,
}

const POLICIES: [(LocationKind, LocationPolicy); 5] = [
    (
        LocationKind::Default,
        LocationPolicy {
            whitelisted: false,
            switch: None,
            masked: false,
        },
    ),
    (
        LocationKind::Home,
        LocationPolicy {
            whitelisted: true,
            switch: None,
            masked: false,
        },
    ),
    (
        LocationKind::School,
        LocationPolicy {
            whitelisted: true,
            switch: Some(PolicySwitch::SchoolsOpen),
            masked: true,
        },
    ),
    (
        LocationKind::Workplace,
        LocationPolicy {
            whitelisted: true,
            switch: Some(PolicySwitch::WorkOnSite),
            masked: true,
        },
    ),
    (
        LocationKind::Restaurant,
        LocationPolicy {
            whitelisted: false,
            switch: Some(PolicySwitch::RestaurantsOpen),
            masked: true,
        },
    ),
];

impl LocationKind {
    pub const ALL: [LocationKind; 5] = [
        LocationKind::Default,
        LocationKind::Home,
        LocationKind::School,
        LocationKind::Workplace,
        LocationKind::Restaurant,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LocationKind::Default => "default",
            LocationKind::Home => "home",
            LocationKind::School => "school",
            LocationKind::Workplace => "workplace",
            LocationKind::Restaurant => "restaurant",
        }
    }

    pub fn policy(self) -> LocationPolicy {
        POLICIES
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, policy)| *policy)
            .unwrap_or(POLICIES[0].1)
    }
}

impl fmt::Display for LocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LocationKind {
    type Err = FieldParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LocationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| FieldParseError::UnknownLocationKind(s.to_string()))
    }
}

/// Definition of a cell as shipped during world setup. Carries no
/// occupants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationDef {
    pub kind: LocationKind,
    pub position: Position,
    #[serde(default)]
    pub whitelist: Vec<PersonId>,
}

impl LocationDef {
    pub fn open(kind: LocationKind, position: Position) -> Self {
        Self {
            kind,
            position,
            whitelist: Vec::new(),
        }
    }

    pub fn whitelisted(kind: LocationKind, position: Position, whitelist: Vec<PersonId>) -> Self {
        Self {
            kind,
            position,
            whitelist,
        }
    }
}

/// `<type>:<x>,<y>` plus `:<id>,<id>,...` for whitelisted kinds.
impl fmt::Display for LocationDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.position)?;
        if self.kind.policy().whitelisted {
            f.write_str(":")?;
            for (i, id) in self.whitelist.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{id}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for LocationDef {
    type Err = FieldParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let (Some(kind), Some(position)) = (parts.next(), parts.next()) else {
            return Err(FieldParseError::Arity {
                value: s.to_string(),
                context: "location",
                expected: 2,
            });
        };
        let kind: LocationKind = kind.parse()?;
        let position: Position = position.parse()?;
        let whitelist = match parts.next() {
            Some(list) if kind.policy().whitelisted => parse_whitelist(list)?,
            _ => Vec::new(),
        };
        Ok(LocationDef {
            kind,
            position,
            whitelist,
        })
    }
}

fn parse_whitelist(list: &str) -> Result<Vec<PersonId>, FieldParseError> {
    if list.is_empty() {
        return Ok(Vec::new());
    }
    list.split(',')
        .map(|id| parse_u32(id, "whitelist entry"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_table_matches_kinds() {
        assert!(!LocationKind::Default.policy().whitelisted);
        assert!(LocationKind::Home.policy().whitelisted);
        assert_eq!(LocationKind::Home.policy().switch, None);
        assert_eq!(
            LocationKind::School.policy().switch,
            Some(PolicySwitch::SchoolsOpen)
        );
        assert_eq!(
            LocationKind::Workplace.policy().switch,
            Some(PolicySwitch::WorkOnSite)
        );
        let restaurant = LocationKind::Restaurant.policy();
        assert!(!restaurant.whitelisted);
        assert!(restaurant.masked);
    }

    #[test]
    fn whitelist_slot_only_for_whitelisted_kinds() {
        let home = LocationDef::whitelisted(LocationKind::Home, Position::new(4, 2), vec![7, 9]);
        assert_eq!(home.to_string(), "home:4,2:7,9");
        assert_eq!("home:4,2:7,9".parse::<LocationDef>(), Ok(home));

        let empty_school = LocationDef::whitelisted(LocationKind::School, Position::new(1, 1), vec![]);
        assert_eq!(empty_school.to_string(), "school:1,1:");
        assert_eq!("school:1,1:".parse::<LocationDef>(), Ok(empty_school));

        let restaurant = LocationDef::open(LocationKind::Restaurant, Position::new(0, 3));
        assert_eq!(restaurant.to_string(), "restaurant:0,3");
        assert_eq!("restaurant:0,3".parse::<LocationDef>(), Ok(restaurant));
    }

    #[test]
    fn rejects_unknown_kind_and_bad_ids() {
        assert!("castle:1,1".parse::<LocationDef>().is_err());
        assert!("home:1,1:3,x".parse::<LocationDef>().is_err());
        assert!("home".parse::<LocationDef>().is_err());
    }
}
