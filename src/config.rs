//! Server Configuration
//!
//! A YAML document with every field optional; missing fields take the
//! defaults below. The binary layers CLI and environment overrides on top.
//!
//! ```yaml
//! store:
//!   type: filesystem
//!   base_directory: /var/lib/cdmi
//! enterprise_number: 99999
//! parent_policy: require_existing
//! backend:
//!   type: dummy_filesystem
//!   properties:
//!     transition_delay_ms: "5000"
//! api:
//!   addr: 0.0.0.0:8080
//! ```

use crate::controlplane::backends::{BackendProperties, SIMULATED_BACKEND_TYPE};
use crate::controlplane::{ApiServerConfig, OrchestratorConfig};
use crate::domain::object_id::{self, DEFAULT_ENTERPRISE_NUMBER};
use crate::domain::ports::{ObjectStoreRef, StoreKind};
use crate::error::{Error, Result};
use crate::hierarchy::{Hierarchy, HierarchyConfig, ParentPolicy};
use crate::store::{FilesystemStore, FilesystemStoreConfig, KeyValueStore};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

// =============================================================================
// Sections
// =============================================================================

/// Object store selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    #[serde(rename = "type")]
    pub kind: StoreKind,
    /// Filesystem store only
    pub base_directory: PathBuf,
    /// Filesystem store only
    pub record_prefix: String,
    /// Filesystem store only
    pub object_id_directory: String,
    /// Filesystem store only
    pub sync_writes: bool,
}

impl Default for StoreSection {
    fn default() -> Self {
        let fs = FilesystemStoreConfig::default();
        Self {
            kind: StoreKind::Filesystem,
            base_directory: fs.base_directory,
            record_prefix: fs.record_prefix,
            object_id_directory: fs.object_id_directory,
            sync_writes: fs.sync_writes,
        }
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSection {
    #[serde(rename = "type")]
    pub backend_type: String,
    pub properties: BackendProperties,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            backend_type: SIMULATED_BACKEND_TYPE.to_string(),
            properties: BackendProperties::new(),
        }
    }
}

/// REST API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    pub addr: SocketAddr,
    pub max_body_size: usize,
}

impl Default for ApiSection {
    fn default() -> Self {
        let api = ApiServerConfig::default();
        Self {
            addr: api.rest_addr,
            max_body_size: api.max_body_size,
        }
    }
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Complete server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub store: StoreSection,
    pub enterprise_number: u32,
    pub root_object_id: Option<String>,
    pub parent_policy: Option<ParentPolicy>,
    pub backend: BackendSection,
    pub api: ApiSection,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            store: StoreSection::default(),
            enterprise_number: DEFAULT_ENTERPRISE_NUMBER,
            root_object_id: None,
            parent_policy: None,
            backend: BackendSection::default(),
            api: ApiSection::default(),
        }
    }
}

impl ServerConfig {
    /// Load a YAML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: ServerConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the store or hierarchy would only fail on later
    pub fn validate(&self) -> Result<()> {
        if let Some(root) = &self.root_object_id {
            if !object_id::verify(root) {
                return Err(Error::Configuration(format!(
                    "root_object_id '{}' is not a valid object identifier",
                    root
                )));
            }
        }
        if self.backend.backend_type.is_empty() {
            return Err(Error::Configuration("backend type is empty".to_string()));
        }
        Ok(())
    }

    pub fn filesystem_config(&self) -> FilesystemStoreConfig {
        FilesystemStoreConfig {
            base_directory: self.store.base_directory.clone(),
            record_prefix: self.store.record_prefix.clone(),
            object_id_directory: self.store.object_id_directory.clone(),
            sync_writes: self.store.sync_writes,
        }
    }

    pub fn hierarchy_config(&self) -> HierarchyConfig {
        HierarchyConfig {
            parent_policy: self.parent_policy,
            enterprise_number: self.enterprise_number,
            root_object_id: self.root_object_id.clone(),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            backend_type: self.backend.backend_type.clone(),
            backend_properties: self.backend.properties.clone(),
        }
    }

    pub fn api_config(&self) -> ApiServerConfig {
        ApiServerConfig {
            rest_addr: self.api.addr,
            max_body_size: self.api.max_body_size,
        }
    }

    /// Open the configured object store
    pub async fn open_store(&self) -> Result<ObjectStoreRef> {
        let store: ObjectStoreRef = match self.store.kind {
            StoreKind::Filesystem => {
                info!(base = %self.store.base_directory.display(), "Using filesystem store");
                Arc::new(FilesystemStore::with_config(self.filesystem_config()).await?)
            }
            StoreKind::KeyValue => {
                info!("Using in-process key-value store");
                Arc::new(KeyValueStore::new())
            }
        };
        Ok(store)
    }

    /// Open the store and wrap it in a hierarchy
    pub async fn open_hierarchy(&self) -> Result<Arc<Hierarchy>> {
        let store = self.open_store().await?;
        Ok(Arc::new(Hierarchy::with_config(store, self.hierarchy_config())))
    }
}
