//! Matchroom
//!
//! Authoritative multiplayer room orchestration: each room is a single
//! sequenced task owning a generic lifecycle core plus one pluggable
//! game mode. Clients express intent, the room validates and simulates,
//! and the resulting state is replicated back at a fixed cadence.
//!
//! # Architecture
//!
//! - [`core`] - deterministic primitives: ordered containers, vectors,
//!   seeded randomness
//! - [`room`] - the lifecycle state machine, the per-room sequencer,
//!   wire-facing messages and replication snapshots
//! - [`game`] - game modes (turn-based board, continuous arena) and the
//!   simulation machinery they share
//!
//! Transport is out of scope: rooms consume [`room::driver::RoomCommand`]
//! values and emit [`room::protocol::Outbound`] notifications and
//! [`room::snapshot::RoomSnapshot`] values over channels; how those reach
//! a client is the embedding server's concern.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod room;

pub use game::arena::{ArenaConfig, ArenaGame, TICK_RATE};
pub use game::board::{BoardGame, BoardSettings};
pub use room::core::{
    ActionError, JoinOptions, Outcome, ParticipantId, Phase, RoomConfig, RoomCore,
};
pub use room::driver::{
    spawn_room, DriverConfig, GameMode, Outbox, Room, RoomCommand, RoomHandle,
};
pub use room::protocol::{ClientCommand, MoveCommand, Notification, Outbound, Target};
pub use room::snapshot::{ModeSnapshot, RoomSnapshot};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
