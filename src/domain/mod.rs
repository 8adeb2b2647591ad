//! Domain layer - CDMI object model, identifiers and port definitions
//!
//! This module defines the entities the server persists and the traits
//! (ports) that store and backend adapters implement.

pub mod model;
pub mod object_id;
pub mod ports;

pub use model::*;
pub use object_id::{ObjectIdGenerator, DEFAULT_ENTERPRISE_NUMBER};
pub use ports::*;
