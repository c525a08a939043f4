//! Game modes and the simulation machinery they share.

pub mod arena;
pub mod board;
pub mod clock;
pub mod spatial;
pub mod throttle;
