//! Quality of Service
//!
//! The state machine type and the engine that drives objects through it.

pub mod engine;
pub mod state;

pub use engine::*;
pub use state::QosState;
