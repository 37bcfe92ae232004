//! Data contracts shared by the coordinator and the shard workers.
//!
//! Every type here has a deterministic single-line text form (`Display` /
//! `FromStr`) which the wire codec in `epi_runtime` composes into messages.

mod contagion;
mod extract;
mod health;
mod location;
mod person;
mod position;
mod stats;

use std::num::{ParseFloatError, ParseIntError};

use thiserror::Error;

pub use contagion::ContagionParameters;
pub use extract::ExtractEntry;
pub use health::HealthState;
pub use location::{LocationDef, LocationKind, LocationPolicy, PolicySwitch};
pub use person::{PersonId, PersonRecord, Timetable, HOURS_PER_DAY};
pub use position::{Area, Position};
pub use stats::Stats;

/// Failure to decode one leaf field of a wire line.
#[derive(Debug, Error, PartialEq)]
pub enum FieldParseError {
    #[error("expected {expected} components in {context} '{value}'")]
    Arity {
        value: String,
        context: &'static str,
        expected: usize,
    },
    #[error("invalid integer '{value}' for {context}: {source}")]
    InvalidInteger {
        value: String,
        context: &'static str,
        source: ParseIntError,
    },
    #[error("invalid float '{value}' for {context}: {source}")]
    InvalidFloat {
        value: String,
        context: &'static str,
        source: ParseFloatError,
    },
    #[error("invalid boolean '{value}' for {context}")]
    InvalidBool { value: String, context: &'static str },
    #[error("unknown health state '{0}'")]
    UnknownHealth(String),
    #[error("unknown location type '{0}'")]
    UnknownLocationKind(String),
}

pub(crate) fn parse_i32(value: &str, context: &'static str) -> Result<i32, FieldParseError> {
    value
        .trim()
        .parse::<i32>()
        .map_err(|source| FieldParseError::InvalidInteger {
            value: value.to_string(),
            context,
            source,
        })
}

pub(crate) fn parse_u32(value: &str, context: &'static str) -> Result<u32, FieldParseError> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|source| FieldParseError::InvalidInteger {
            value: value.to_string(),
            context,
            source,
        })
}

pub(crate) fn parse_u64(value: &str, context: &'static str) -> Result<u64, FieldParseError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|source| FieldParseError::InvalidInteger {
            value: value.to_string(),
            context,
            source,
        })
}

pub(crate) fn parse_f64(value: &str, context: &'static str) -> Result<f64, FieldParseError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|source| FieldParseError::InvalidFloat {
            value: value.to_string(),
            context,
            source,
        })
}

pub(crate) fn parse_bool(value: &str, context: &'static str) -> Result<bool, FieldParseError> {
    match value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(FieldParseError::InvalidBool {
            value: other.to_string(),
            context,
        }),
    }
}
