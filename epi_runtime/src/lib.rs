//! Wire protocol shared by the coordinator and the shard workers.
//!
//! Re-exports the data contracts from `epi_schema` so that both sides only
//! depend on this crate for anything that crosses a socket.

pub mod wire;

pub use epi_schema::*;
pub use wire::{encode_message, parse_message, Message, MessageKind, WireError};
