//! Storage Backend Adapters
//!
//! Backends are resolved by type name through an explicit registry of
//! constructor functions:
//! - `dummy_filesystem` (alias `simulated`): profile-document driven simulation

pub mod simulated;

pub use simulated::*;

use crate::domain::ports::StorageBackendRef;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Free-form backend properties, as read from configuration
pub type BackendProperties = BTreeMap<String, String>;

/// Constructor registered for a backend type
pub type BackendConstructor = fn(&BackendProperties) -> Result<StorageBackendRef>;

/// Registry for creating storage backends by type name
#[derive(Clone)]
pub struct BackendRegistry {
    constructors: BTreeMap<String, BackendConstructor>,
}

impl BackendRegistry {
    /// Create an empty registry
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Register a constructor under `backend_type`, replacing any previous one
    pub fn register(&mut self, backend_type: &str, constructor: BackendConstructor) {
        self.constructors
            .insert(backend_type.to_lowercase(), constructor);
    }

    /// Registered type names
    pub fn backend_types(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }

    /// Create a backend by type name
    pub fn create(&self, backend_type: &str, properties: &BackendProperties) -> Result<StorageBackendRef> {
        let constructor = self
            .constructors
            .get(&backend_type.to_lowercase())
            .ok_or_else(|| Error::BackendUnavailable {
                backend: backend_type.to_string(),
                reason: "unknown backend type".to_string(),
            })?;

        debug!(backend = %backend_type, "Constructing storage backend");
        constructor(properties).map_err(|e| match e {
            e @ Error::BackendUnavailable { .. } => e,
            other => Error::BackendUnavailable {
                backend: backend_type.to_string(),
                reason: other.to_string(),
            },
        })
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(SIMULATED_BACKEND_TYPE, simulated_backend);
        registry.register("simulated", simulated_backend);
        registry
    }
}

fn simulated_backend(properties: &BackendProperties) -> Result<StorageBackendRef> {
    Ok(Arc::new(SimulatedBackend::from_properties(properties)?))
}
