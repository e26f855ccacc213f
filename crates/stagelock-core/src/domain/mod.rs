//! Domain layer
//!
//! Arbitration state machines and the events they emit.

pub mod arbiter;
pub mod events;
