//! Shard workers and the coordinator of the epigrid simulation.
//!
//! A worker ([`ShardWorker`]) owns one rectangle of the world and executes
//! protocol commands against it. The [`Coordinator`] holds one
//! [`ShardHandle`] per worker and advances the world one round at a time,
//! relaying people that cross shard borders through a two-phase hand-off.

mod acceptor;
pub mod config;
mod connection;
mod controller;
mod coordinator;
mod events;
mod extract;
mod handle;
mod location;
pub mod partition;
mod person;
pub mod seeding;
mod shard;
mod worker;

pub use acceptor::ShardAcceptor;
pub use config::{load_simulation_config_from_env, ConfigError, SimulationConfig};
pub use connection::{ShardConnection, ShardError};
pub use controller::{RoundOutcome, SimulationController};
pub use coordinator::{Coordinator, CoordinatorError, PlacementReport, RoundReport};
pub use events::{EventHub, RoundEvent, RoundSubscription};
pub use extract::{Extract, ExtractLocation};
pub use handle::{ShardHandle, WaitingPerson, WaitingPersonConfirmation};
pub use location::Location;
pub use partition::{partition_world, shard_layout, PartitionError};
pub use person::{Person, RANDOM_WALK_RADIUS};
pub use seeding::{generate_world, SeededWorld};
pub use shard::{Migrant, ShardGrid};
pub use worker::{run_worker, Flow, ShardWorker, WorkerError};
