//! API Module
//!
//! CDMI REST front end: routes, field projection and request metrics.

pub mod filter;
pub mod metrics;
pub mod rest;
pub mod server;

pub use filter::filter_fields;
pub use metrics::ApiMetrics;
pub use rest::*;
pub use server::*;
