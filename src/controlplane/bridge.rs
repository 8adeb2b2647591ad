//! Capability Bridge
//!
//! Mirrors the profiles a storage backend advertises into the capability
//! tree under `/cdmi_capabilities/{container,dataobject}/<name>`.

use crate::domain::model::CapabilityRequest;
use crate::domain::ports::StorageBackend;
use crate::error::Result;
use crate::hierarchy::CapabilityDao;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Outcome of one synchronisation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BridgeReport {
    /// Capability URIs created or refreshed
    pub mirrored: Vec<String>,
    /// Capability URIs that could not be written
    pub failed: Vec<String>,
}

/// Copies backend capabilities into the capability tree
#[derive(Clone)]
pub struct CapabilityBridge {
    capabilities: CapabilityDao,
}

impl CapabilityBridge {
    pub fn new(capabilities: CapabilityDao) -> Self {
        Self { capabilities }
    }

    /// Create or refresh a capability node for every advertised profile.
    ///
    /// A failure to list the backend's profiles is returned; a failure to
    /// write one profile is logged and the pass continues with the rest.
    pub async fn sync(&self, backend: &dyn StorageBackend) -> Result<BridgeReport> {
        let advertised = backend.list_capabilities().await?;
        info!(
            backend = %backend.backend_type(),
            count = advertised.len(),
            "Mirroring backend capabilities"
        );

        let mut report = BridgeReport::default();
        for capability in advertised {
            let uri = capability.uri();
            let request = CapabilityRequest {
                capabilities: capability.capabilities,
                metadata: capability.metadata,
            };

            match self.capabilities.upsert_by_path(&uri, &request).await {
                Ok(_) => {
                    debug!(uri = %uri, "Mirrored capability");
                    report.mirrored.push(uri);
                }
                Err(e) => {
                    warn!(uri = %uri, error = %e, "Failed to mirror capability");
                    report.failed.push(uri);
                }
            }
        }

        Ok(report)
    }
}
