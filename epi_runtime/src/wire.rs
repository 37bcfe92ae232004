use std::fmt;

use thiserror::Error;

use epi_schema::{
    Area, ContagionParameters, ExtractEntry, FieldParseError, LocationDef, PersonId, PersonRecord,
    Position, Stats,
};

#[derive(Debug, Error, PartialEq)]
pub enum WireError {
    #[error("empty line")]
    Empty,
    #[error("unknown message kind: {0}")]
    UnknownKind(String),
    #[error("{kind}: missing field {field}")]
    MissingField {
        kind: MessageKind,
        field: &'static str,
    },
    #[error("{kind}: unexpected trailing fields '{rest}'")]
    TrailingFields { kind: MessageKind, rest: String },
    #[error("{kind}: {source}")]
    Field {
        kind: MessageKind,
        #[source]
        source: FieldParseError,
    },
}

impl WireError {
    /// Kind named by the line, when it was recognised.
    pub fn kind(&self) -> Option<MessageKind> {
        match self {
            WireError::Empty | WireError::UnknownKind(_) => None,
            WireError::MissingField { kind, .. }
            | WireError::TrailingFields { kind, .. }
            | WireError::Field { kind, .. } => Some(*kind),
        }
    }
}

/// Literal first field of every line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    SetUp,
    SimIsSet,
    ContagionParameters,
    ContagionParametersSet,
    Location,
    Person,
    PersonConfirmation,
    MovePeople,
    PeopleMoved,
    CalculateHealth,
    HealthCalculated,
    SendExtract,
    Extract,
    SendStats,
    Stats,
    Ping,
    ExitSim,
}

impl MessageKind {
    pub const ALL: [MessageKind; 17] = [
        MessageKind::SetUp,
        MessageKind::SimIsSet,
        MessageKind::ContagionParameters,
        MessageKind::ContagionParametersSet,
        MessageKind::Location,
        MessageKind::Person,
        MessageKind::PersonConfirmation,
        MessageKind::MovePeople,
        MessageKind::PeopleMoved,
        MessageKind::CalculateHealth,
        MessageKind::HealthCalculated,
        MessageKind::SendExtract,
        MessageKind::Extract,
        MessageKind::SendStats,
        MessageKind::Stats,
        MessageKind::Ping,
        MessageKind::ExitSim,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::SetUp => "SetUp",
            MessageKind::SimIsSet => "SimIsSet",
            MessageKind::ContagionParameters => "ContagionParameters",
            MessageKind::ContagionParametersSet => "ContagionParametersSet",
            MessageKind::Location => "Location",
            MessageKind::Person => "Person",
            MessageKind::PersonConfirmation => "PersonConfirmation",
            MessageKind::MovePeople => "MovePeople",
            MessageKind::PeopleMoved => "PeopleMoved",
            MessageKind::CalculateHealth => "CalculateHealth",
            MessageKind::HealthCalculated => "HealthCalculated",
            MessageKind::SendExtract => "SendExtract",
            MessageKind::Extract => "Extract",
            MessageKind::SendStats => "SendStats",
            MessageKind::Stats => "Stats",
            MessageKind::Ping => "Ping",
            MessageKind::ExitSim => "ExitSim",
        }
    }

    /// Setup and commit messages that the receiver never answers.
    pub fn is_fire_and_forget(self) -> bool {
        matches!(self, MessageKind::Location | MessageKind::PersonConfirmation)
    }

    fn lookup(token: &str) -> Option<MessageKind> {
        MessageKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == token)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One protocol line. Commands flow coordinator to worker; each has exactly
/// one reply except `MovePeople` (zero or more `Person` lines, then
/// `PeopleMoved`), `Location`, `PersonConfirmation` sent to a worker, and
/// `ExitSim`, which are not answered.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    SetUp { area: Area },
    SimIsSet,
    ContagionParameters(ContagionParameters),
    ContagionParametersSet,
    Location(LocationDef),
    Person {
        person: PersonRecord,
        target: Position,
    },
    PersonConfirmation {
        id: PersonId,
        accepted: bool,
    },
    MovePeople,
    PeopleMoved,
    CalculateHealth,
    HealthCalculated,
    SendExtract { window: Area },
    Extract(Vec<ExtractEntry>),
    SendStats,
    Stats(Stats),
    Ping,
    ExitSim,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::SetUp { .. } => MessageKind::SetUp,
            Message::SimIsSet => MessageKind::SimIsSet,
            Message::ContagionParameters(_) => MessageKind::ContagionParameters,
            Message::ContagionParametersSet => MessageKind::ContagionParametersSet,
            Message::Location(_) => MessageKind::Location,
            Message::Person { .. } => MessageKind::Person,
            Message::PersonConfirmation { .. } => MessageKind::PersonConfirmation,
            Message::MovePeople => MessageKind::MovePeople,
            Message::PeopleMoved => MessageKind::PeopleMoved,
            Message::CalculateHealth => MessageKind::CalculateHealth,
            Message::HealthCalculated => MessageKind::HealthCalculated,
            Message::SendExtract { .. } => MessageKind::SendExtract,
            Message::Extract(_) => MessageKind::Extract,
            Message::SendStats => MessageKind::SendStats,
            Message::Stats(_) => MessageKind::Stats,
            Message::Ping => MessageKind::Ping,
            Message::ExitSim => MessageKind::ExitSim,
        }
    }
}

/// Encodes a message as one line, without the terminating newline.
pub fn encode_message(message: &Message) -> String {
    message.to_string()
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind().as_str())?;
        match self {
            Message::SetUp { area } => write!(f, ":{area}"),
            Message::SendExtract { window } => write!(f, ":{window}"),
            Message::ContagionParameters(params) => write!(f, ":{params}"),
            Message::Location(def) => write!(f, ":{def}"),
            Message::Person { person, target } => write!(
                f,
                ":{}:{}:{}:{}:{}",
                person.id, target, person.health, person.timetable, person.home
            ),
            Message::PersonConfirmation { id, accepted } => write!(f, ":{id}:{accepted}"),
            Message::Extract(entries) => {
                for entry in entries {
                    write!(f, ":{entry}")?;
                }
                Ok(())
            }
            Message::Stats(stats) => write!(f, ":{stats}"),
            Message::SimIsSet
            | Message::ContagionParametersSet
            | Message::MovePeople
            | Message::PeopleMoved
            | Message::CalculateHealth
            | Message::HealthCalculated
            | Message::SendStats
            | Message::Ping
            | Message::ExitSim => Ok(()),
        }
    }
}

/// Decodes one line. Trailing `\r`/`\n` are ignored.
pub fn parse_message(input: &str) -> Result<Message, WireError> {
    let line = input.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Err(WireError::Empty);
    }

    let (verb, rest) = match line.split_once(':') {
        Some((verb, rest)) => (verb, Some(rest)),
        None => (line, None),
    };
    let kind = MessageKind::lookup(verb).ok_or_else(|| WireError::UnknownKind(verb.to_string()))?;
    let field = |source: FieldParseError| WireError::Field { kind, source };

    let message = match kind {
        MessageKind::SetUp => Message::SetUp {
            area: parse_area(kind, rest)?,
        },
        MessageKind::SendExtract => Message::SendExtract {
            window: parse_area(kind, rest)?,
        },
        MessageKind::ContagionParameters => Message::ContagionParameters(
            require(kind, rest, "parameters")?
                .parse()
                .map_err(field)?,
        ),
        MessageKind::Location => {
            Message::Location(require(kind, rest, "definition")?.parse().map_err(field)?)
        }
        MessageKind::Person => parse_person(require(kind, rest, "id")?)?,
        MessageKind::PersonConfirmation => {
            let rest = require(kind, rest, "id")?;
            let (id, accepted) = rest.split_once(':').ok_or(WireError::MissingField {
                kind,
                field: "accepted",
            })?;
            let id = id.parse::<PersonId>().map_err(|source| WireError::Field {
                kind,
                source: FieldParseError::InvalidInteger {
                    value: id.to_string(),
                    context: "personal number",
                    source,
                },
            })?;
            let accepted = match accepted {
                "true" => true,
                "false" => false,
                other => {
                    return Err(field(FieldParseError::InvalidBool {
                        value: other.to_string(),
                        context: "accepted",
                    }))
                }
            };
            Message::PersonConfirmation { id, accepted }
        }
        MessageKind::Extract => {
            let entries = match rest {
                None => Vec::new(),
                Some(rest) => rest
                    .split(':')
                    .map(|entry| entry.parse::<ExtractEntry>().map_err(field))
                    .collect::<Result<Vec<_>, _>>()?,
            };
            Message::Extract(entries)
        }
        MessageKind::Stats => {
            Message::Stats(require(kind, rest, "stats")?.parse().map_err(field)?)
        }
        bare => {
            if let Some(rest) = rest {
                return Err(WireError::TrailingFields {
                    kind: bare,
                    rest: rest.to_string(),
                });
            }
            match bare {
                MessageKind::SimIsSet => Message::SimIsSet,
                MessageKind::ContagionParametersSet => Message::ContagionParametersSet,
                MessageKind::MovePeople => Message::MovePeople,
                MessageKind::PeopleMoved => Message::PeopleMoved,
                MessageKind::CalculateHealth => Message::CalculateHealth,
                MessageKind::HealthCalculated => Message::HealthCalculated,
                MessageKind::SendStats => Message::SendStats,
                MessageKind::Ping => Message::Ping,
                _ => Message::ExitSim,
            }
        }
    };

    tracing::trace!(target: "epigrid::wire", kind = %kind, "wire.decoded");
    Ok(message)
}

fn require<'a>(
    kind: MessageKind,
    rest: Option<&'a str>,
    field: &'static str,
) -> Result<&'a str, WireError> {
    rest.ok_or(WireError::MissingField { kind, field })
}

fn parse_area(kind: MessageKind, rest: Option<&str>) -> Result<Area, WireError> {
    let rest = require(kind, rest, "top left")?;
    let (top_left, size) = rest.split_once(':').ok_or(WireError::MissingField {
        kind,
        field: "size",
    })?;
    let field = |source| WireError::Field { kind, source };
    Ok(Area::new(
        top_left.parse().map_err(field)?,
        size.parse().map_err(field)?,
    ))
}

fn parse_person(rest: &str) -> Result<Message, WireError> {
    let kind = MessageKind::Person;
    let field = |source| WireError::Field { kind, source };
    let parts: Vec<&str> = rest.split(':').collect();
    const NAMES: [&str; 5] = ["id", "target", "health", "timetable", "home"];
    if parts.len() < NAMES.len() {
        return Err(WireError::MissingField {
            kind,
            field: NAMES[parts.len()],
        });
    }
    if parts.len() > NAMES.len() {
        return Err(WireError::TrailingFields {
            kind,
            rest: parts[NAMES.len()..].join(":"),
        });
    }
    let id = parts[0].parse::<PersonId>().map_err(|source| {
        field(FieldParseError::InvalidInteger {
            value: parts[0].to_string(),
            context: "personal number",
            source,
        })
    })?;
    let target: Position = parts[1].parse().map_err(field)?;
    let person = PersonRecord {
        id,
        health: parts[2].parse().map_err(field)?,
        timetable: parts[3].parse().map_err(field)?,
        home: parts[4].parse().map_err(field)?,
    };
    Ok(Message::Person { person, target })
}

#[cfg(test)]
mod tests {
    use super::*;
    use epi_schema::{HealthState, LocationKind, Timetable};

    fn round_trip(message: Message) {
        let encoded = encode_message(&message);
        let decoded = parse_message(&encoded)
            .unwrap_or_else(|err| panic!("failed to decode '{encoded}': {err}"));
        assert_eq!(decoded, message);
        assert_eq!(encode_message(&decoded), encoded);
    }

    fn commuter() -> PersonRecord {
        let mut timetable = Timetable::new();
        timetable.set_occupation(0, Position::new(2, 2));
        timetable.set_occupation(8, Position::new(7, -1));
        PersonRecord::new(42, HealthState::Infected, Position::new(2, 2), timetable)
    }

    #[test]
    fn person_line_layout() {
        let line = encode_message(&Message::Person {
            person: commuter(),
            target: Position::new(6, 5),
        });
        assert!(line.starts_with("Person:42:6,5:infected:2,2;"));
        assert!(line.ends_with(":2,2"));
        assert_eq!(line.split(':').count(), 6);
    }

    #[test]
    fn every_kind_survives_encoding() {
        let area = Area::new(Position::new(0, 5), Position::new(5, 10));
        round_trip(Message::SetUp { area });
        round_trip(Message::SimIsSet);
        round_trip(Message::ContagionParameters(ContagionParameters::default()));
        round_trip(Message::ContagionParametersSet);
        round_trip(Message::Location(LocationDef::whitelisted(
            LocationKind::Home,
            Position::new(1, 1),
            vec![1, 2, 3],
        )));
        round_trip(Message::Location(LocationDef::open(
            LocationKind::Default,
            Position::new(1, 1),
        )));
        round_trip(Message::Person {
            person: commuter(),
            target: Position::new(-1, 4),
        });
        round_trip(Message::PersonConfirmation {
            id: 9,
            accepted: false,
        });
        round_trip(Message::MovePeople);
        round_trip(Message::PeopleMoved);
        round_trip(Message::CalculateHealth);
        round_trip(Message::HealthCalculated);
        round_trip(Message::SendExtract { window: area });
        round_trip(Message::Extract(vec![]));
        round_trip(Message::SendStats);
        round_trip(Message::Stats(Stats {
            healthy: 10,
            deceased: 1,
            ..Stats::default()
        }));
        round_trip(Message::Ping);
        round_trip(Message::ExitSim);
    }

    #[test]
    fn extract_with_entries() {
        let line = "Extract:5,0;default;1,0,0,0,0,0:5,1;home;0,2,0,0,0,0";
        let Message::Extract(entries) = parse_message(line).unwrap() else {
            panic!("expected extract");
        };
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].kind, LocationKind::Home);
        assert_eq!(entries[1].stats.infected, 2);
        assert_eq!(encode_message(&Message::Extract(entries)), line);
        assert_eq!(parse_message("Extract"), Ok(Message::Extract(vec![])));
    }

    #[test]
    fn errors_name_the_recognised_kind() {
        let bad_location = parse_message("Location:castle:1,1").unwrap_err();
        assert_eq!(bad_location.kind(), Some(MessageKind::Location));
        assert!(MessageKind::Location.is_fire_and_forget());
        assert!(MessageKind::PersonConfirmation.is_fire_and_forget());
        assert!(!MessageKind::Person.is_fire_and_forget());
        assert_eq!(parse_message("Teleport").unwrap_err().kind(), None);
    }

    #[test]
    fn tolerates_line_terminators() {
        assert_eq!(parse_message("PeopleMoved\r\n"), Ok(Message::PeopleMoved));
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!(parse_message(""), Err(WireError::Empty));
        assert_eq!(
            parse_message("Teleport:1"),
            Err(WireError::UnknownKind("Teleport".into()))
        );
        assert!(matches!(
            parse_message("SetUp:0,0"),
            Err(WireError::MissingField { field: "size", .. })
        ));
        assert!(matches!(
            parse_message("PersonConfirmation:7:maybe"),
            Err(WireError::Field { .. })
        ));
        assert!(matches!(
            parse_message("Person:1:2,2:healthy"),
            Err(WireError::MissingField {
                field: "timetable",
                ..
            })
        ));
        assert!(matches!(
            parse_message("Ping:extra"),
            Err(WireError::TrailingFields { .. })
        ));
        assert!(matches!(
            parse_message("Stats:1,2,3"),
            Err(WireError::Field { .. })
        ));
    }
}
