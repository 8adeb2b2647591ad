//! Control Plane Module
//!
//! Everything above the object tree: storage backends and their registry,
//! the capability bridge, the QoS transition engine, the orchestrator that
//! wires them together, and the REST API.

pub mod api;
pub mod backends;
pub mod bridge;
pub mod orchestrator;
pub mod qos;

pub use api::*;
pub use backends::*;
pub use bridge::*;
pub use orchestrator::*;
pub use qos::*;
