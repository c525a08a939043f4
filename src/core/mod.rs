//! Core Primitives
//!
//! Domain-free building blocks shared by the room and game layers.

pub mod ordered;
pub mod rng;
pub mod vec2;
