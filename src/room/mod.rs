//! Room orchestration: lifecycle, sequencing, messages and replication.

pub mod core;
pub mod driver;
pub mod protocol;
pub mod snapshot;
pub mod turn;
