//! Main Orchestrator
//!
//! Coordinates the CDMI server:
//! - Bootstrapping the root container, capability tree and domain tree
//! - Attaching a storage backend and mirroring its capabilities
//! - Create, read, update and delete on behalf of the REST layer
//! - QoS status and transitions through the engine

use crate::controlplane::backends::{BackendProperties, BackendRegistry, SIMULATED_BACKEND_TYPE};
use crate::controlplane::bridge::{BridgeReport, CapabilityBridge};
use crate::controlplane::qos::{
    apply_status, QosEngine, META_ASSOCIATION_TIME, META_CAPABILITIES_TARGET,
    META_POLLING_INTERVAL,
};
use crate::domain::model::{
    normalize_path, CapabilityRequest, CdmiObject, ContainerRequest, DataObjectRequest,
    DomainRequest, Metadata, ObjectKind, CAPABILITIES_ROOT, CONTAINER_CAPABILITIES,
    DATA_OBJECT_CAPABILITIES, DOMAINS_ROOT, META_CTIME, META_MTIME, META_SIZE,
};
use crate::domain::ports::{CapabilityType, ObjectStatus, StorageBackendRef};
use crate::error::{Error, Result};
use crate::hierarchy::{CapabilityDao, ContainerDao, DataObjectDao, DomainDao, Hierarchy};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Metadata entries owned by the server; callers cannot overwrite them
const SYSTEM_METADATA: &[&str] = &[
    META_CTIME,
    META_MTIME,
    META_SIZE,
    META_CAPABILITIES_TARGET,
    META_POLLING_INTERVAL,
    META_ASSOCIATION_TIME,
];

// =============================================================================
// Orchestrator Configuration
// =============================================================================

/// Configuration for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Registry key of the storage backend attached at bootstrap
    pub backend_type: String,
    /// Properties handed to the backend constructor
    pub backend_properties: BackendProperties,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            backend_type: SIMULATED_BACKEND_TYPE.to_string(),
            backend_properties: BackendProperties::new(),
        }
    }
}

// =============================================================================
// Update request
// =============================================================================

/// Fields a caller may change on an existing container or data object
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ObjectUpdate {
    /// Replacement user metadata
    #[serde(default)]
    pub metadata: Option<Metadata>,
    /// Replacement value (data objects only)
    #[serde(default)]
    pub value: Option<String>,
    /// Requested QoS profile
    #[serde(rename = "capabilitiesURI", default)]
    pub capabilities_uri: Option<String>,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Facade over the hierarchy, the capability bridge and the QoS engine
pub struct Orchestrator {
    config: OrchestratorConfig,
    hierarchy: Arc<Hierarchy>,
    containers: ContainerDao,
    data_objects: DataObjectDao,
    capabilities: CapabilityDao,
    domains: DomainDao,
    registry: BackendRegistry,
    /// QoS engine of the attached backend
    qos: RwLock<Option<Arc<QosEngine>>>,
}

impl Orchestrator {
    /// Create a new orchestrator
    pub fn new(
        config: OrchestratorConfig,
        hierarchy: Arc<Hierarchy>,
        registry: BackendRegistry,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            containers: ContainerDao::new(hierarchy.clone()),
            data_objects: DataObjectDao::new(hierarchy.clone()),
            capabilities: CapabilityDao::new(hierarchy.clone()),
            domains: DomainDao::new(hierarchy.clone()),
            hierarchy,
            registry,
            qos: RwLock::new(None),
        })
    }

    pub fn hierarchy(&self) -> &Arc<Hierarchy> {
        &self.hierarchy
    }

    pub fn containers(&self) -> &ContainerDao {
        &self.containers
    }

    pub fn data_objects(&self) -> &DataObjectDao {
        &self.data_objects
    }

    pub fn capabilities(&self) -> &CapabilityDao {
        &self.capabilities
    }

    pub fn domains(&self) -> &DomainDao {
        &self.domains
    }

    /// QoS engine of the attached backend, if one is attached
    pub async fn qos(&self) -> Option<Arc<QosEngine>> {
        self.qos.read().await.clone()
    }

    // =========================================================================
    // Bootstrap
    // =========================================================================

    /// Create the fixed part of the tree and attach the configured backend.
    ///
    /// Safe to call on an initialised store. A backend that cannot be built
    /// or listed is logged and the server keeps running with whatever
    /// capability tree it has.
    pub async fn bootstrap(&self) -> Result<()> {
        info!("Bootstrapping CDMI tree");

        let root = self.hierarchy.ensure_root().await?;
        debug!(object_id = %root.object_id(), "Root container ready");

        self.capabilities
            .upsert_by_path(CAPABILITIES_ROOT, &system_capabilities())
            .await?;
        self.capabilities
            .upsert_by_path(CONTAINER_CAPABILITIES, &container_capabilities())
            .await?;
        self.capabilities
            .upsert_by_path(DATA_OBJECT_CAPABILITIES, &data_object_capabilities())
            .await?;

        if self.domains.find_by_path(DOMAINS_ROOT).await?.is_none() {
            self.domains
                .create_by_path(DOMAINS_ROOT, &DomainRequest::default())
                .await?;
        }

        let backend_type = self.config.backend_type.clone();
        let properties = self.config.backend_properties.clone();
        match self.attach_backend(&backend_type, &properties).await {
            Ok(report) => info!(
                backend = %backend_type,
                mirrored = report.mirrored.len(),
                failed = report.failed.len(),
                "Storage backend attached"
            ),
            Err(e) => warn!(
                backend = %backend_type,
                error = %e,
                "Storage backend unavailable, continuing without it"
            ),
        }

        info!("Bootstrap complete");
        Ok(())
    }

    /// Construct a backend by type, mirror its capabilities and route QoS
    /// requests to it
    pub async fn attach_backend(
        &self,
        backend_type: &str,
        properties: &BackendProperties,
    ) -> Result<BridgeReport> {
        let backend = self.registry.create(backend_type, properties)?;
        self.attach(backend).await
    }

    /// Attach an already constructed backend
    pub async fn attach(&self, backend: StorageBackendRef) -> Result<BridgeReport> {
        let report = CapabilityBridge::new(self.capabilities.clone())
            .sync(backend.as_ref())
            .await?;

        let engine = QosEngine::new(&self.hierarchy, backend);
        *self.qos.write().await = Some(engine);
        Ok(report)
    }

    // =========================================================================
    // Objects
    // =========================================================================

    /// Entity at `path` with its QoS status folded in.
    ///
    /// A path the store does not know but the backend holds is adopted
    /// into the tree first.
    pub async fn get_by_path(&self, path: &str) -> Result<Option<CdmiObject>> {
        let object = match self.hierarchy.find_by_path(path).await? {
            Some(object) => object,
            None => match self.adopt(path).await? {
                Some(object) => object,
                None => return Ok(None),
            },
        };
        Ok(Some(self.with_status(object).await))
    }

    /// Create the entry for an object the backend reports at `path`
    async fn adopt(&self, path: &str) -> Result<Option<CdmiObject>> {
        let Some(engine) = self.qos().await else {
            return Ok(None);
        };
        let path = normalize_path(path)?;
        let path = path.as_str();
        let Some(reported) = engine.backend().get_current_status(path).await? else {
            return Ok(None);
        };

        let profile = Some(reported.current_capabilities_uri.clone());
        let capability_type = CapabilityType::of_uri(&reported.current_capabilities_uri);
        let created: Result<CdmiObject> = match capability_type {
            Some(CapabilityType::Container) => {
                let request = ContainerRequest {
                    capabilities_uri: profile,
                    ..Default::default()
                };
                self.containers
                    .create_by_path(path, &request)
                    .await
                    .map(Into::into)
            }
            Some(CapabilityType::Dataobject) => {
                let request = DataObjectRequest {
                    capabilities_uri: profile,
                    ..Default::default()
                };
                self.data_objects
                    .create_by_path(path, &request)
                    .await
                    .map(Into::into)
            }
            None => {
                warn!(
                    path = %path,
                    profile = %reported.current_capabilities_uri,
                    "Backend reported an object with an unknown profile type"
                );
                return Ok(None);
            }
        };

        match created {
            Ok(object) => {
                info!(
                    path = %path,
                    kind = %object.kind(),
                    profile = %reported.current_capabilities_uri,
                    "Adopted object held by the storage backend"
                );
                Ok(Some(object))
            }
            // Adopted concurrently
            Err(Error::Conflict { .. }) => self.hierarchy.find_by_path(path).await,
            // Ancestors are adopted one GET at a time under RequireExisting
            Err(Error::NotFound { key }) => {
                debug!(path = %path, missing = %key, "Cannot adopt object without its parent");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Entity with `object_id` with its QoS status folded in
    pub async fn get_by_id(&self, object_id: &str) -> Result<Option<CdmiObject>> {
        match self.hierarchy.find_by_object_id(object_id).await? {
            Some(object) => Ok(Some(self.with_status(object).await)),
            None => Ok(None),
        }
    }

    /// Create the entity of `kind` at `path` from a JSON request body
    pub async fn create(&self, path: &str, kind: ObjectKind, body: Value) -> Result<CdmiObject> {
        let object: CdmiObject = match kind {
            ObjectKind::Container => {
                let request: ContainerRequest = serde_json::from_value(body)?;
                self.containers.create_by_path(path, &request).await?.into()
            }
            ObjectKind::DataObject => {
                let request: DataObjectRequest = serde_json::from_value(body)?;
                self.data_objects.create_by_path(path, &request).await?.into()
            }
            ObjectKind::Domain => {
                let request: DomainRequest = serde_json::from_value(body)?;
                self.domains.create_by_path(path, &request).await?.into()
            }
            other => {
                return Err(Error::Malformed(format!("cannot create a {} at {}", other, path)))
            }
        };
        Ok(object)
    }

    /// Apply a caller update to the container or data object at `path`.
    ///
    /// The update is checked against the stored entity before anything is
    /// written. A requested profile change then goes to the QoS engine; if
    /// it is rejected nothing else is changed.
    pub async fn update(&self, path: &str, update: ObjectUpdate) -> Result<CdmiObject> {
        let existing = self
            .hierarchy
            .find_by_path(path)
            .await?
            .ok_or_else(|| Error::not_found(path))?;
        check_update(&existing, &update)?;

        if let Some(target) = &update.capabilities_uri {
            let already = existing.capabilities_uri() == Some(target.as_str());
            if !already {
                let engine = self.qos().await.ok_or_else(|| Error::BackendUnavailable {
                    backend: self.config.backend_type.clone(),
                    reason: "no storage backend attached".to_string(),
                })?;
                engine.request_transition(path, target).await?;
            }
        }

        let ObjectUpdate {
            metadata, value, ..
        } = update;
        let object = self
            .hierarchy
            .modify(path, move |object| {
                if let Some(metadata) = metadata {
                    replace_user_metadata(object, metadata);
                }
                if let Some(value) = value {
                    let CdmiObject::DataObject(d) = object else {
                        return Err(value_not_allowed(object));
                    };
                    d.value = value;
                    d.refresh_size();
                }
                Ok(())
            })
            .await?;

        Ok(self.with_status(object).await)
    }

    /// Delete the entity at `path` and its subtree
    pub async fn delete(&self, path: &str) -> Result<Option<CdmiObject>> {
        self.hierarchy.delete_entry(path).await
    }

    /// QoS status of the object at `path`
    pub async fn status_of(&self, path: &str) -> Result<ObjectStatus> {
        let engine = self.qos().await.ok_or_else(|| Error::BackendUnavailable {
            backend: self.config.backend_type.clone(),
            reason: "no storage backend attached".to_string(),
        })?;
        engine.get_current_status(path).await
    }

    async fn with_status(&self, mut object: CdmiObject) -> CdmiObject {
        if !matches!(object.kind(), ObjectKind::Container | ObjectKind::DataObject) {
            return object;
        }
        let (Some(engine), Some(path)) = (self.qos().await, object.path()) else {
            return object;
        };

        match engine.get_current_status(&path).await {
            Ok(status) => apply_status(&mut object, &status),
            Err(e) => warn!(path = %path, error = %e, "Could not read QoS status"),
        }
        object
    }

    // =========================================================================
    // Health
    // =========================================================================

    /// Health of the object store and the attached backend
    pub async fn health(&self) -> BTreeMap<String, bool> {
        let mut health = BTreeMap::new();
        health.insert(
            "store".to_string(),
            self.hierarchy.store().health_check().await.unwrap_or(false),
        );
        if let Some(engine) = self.qos().await {
            health.insert(
                engine.backend().backend_type().to_string(),
                engine.backend().health_check().await.unwrap_or(false),
            );
        }
        health
    }

    /// Get overall orchestrator status
    pub async fn status(&self) -> OrchestratorStatus {
        let health = self.health().await;
        let engine = self.qos().await;

        OrchestratorStatus {
            healthy: health.values().all(|&h| h),
            store: self.hierarchy.store().kind().to_string(),
            parent_policy: format!("{:?}", self.hierarchy.parent_policy()),
            backend: engine
                .as_ref()
                .map(|e| e.backend().backend_type().to_string()),
            pending_transitions: engine.map(|e| e.pending_transitions()).unwrap_or(0),
            health,
        }
    }
}

/// Orchestrator status summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    pub healthy: bool,
    pub store: String,
    pub parent_policy: String,
    pub backend: Option<String>,
    pub pending_transitions: usize,
    pub health: BTreeMap<String, bool>,
}

/// Reject an update the entity cannot take
fn check_update(existing: &CdmiObject, update: &ObjectUpdate) -> Result<()> {
    if update.value.is_some() && existing.kind() != ObjectKind::DataObject {
        return Err(value_not_allowed(existing));
    }
    if update.capabilities_uri.is_some() && CapabilityType::for_kind(existing.kind()).is_none() {
        return Err(Error::Malformed(format!(
            "{} is a {}; QoS applies to containers and data objects",
            existing.path().unwrap_or_default(),
            existing.kind()
        )));
    }
    Ok(())
}

fn value_not_allowed(object: &CdmiObject) -> Error {
    Error::Malformed(format!(
        "{} is a {}; only data objects carry a value",
        object.path().unwrap_or_default(),
        object.kind()
    ))
}

/// Replace user metadata, keeping the server-owned entries
fn replace_user_metadata(object: &mut CdmiObject, mut metadata: Metadata) {
    let Some(stored) = object.metadata_mut() else {
        return;
    };
    for key in SYSTEM_METADATA {
        metadata.remove(*key);
        if let Some(value) = stored.remove(*key) {
            metadata.insert(key.to_string(), value);
        }
    }
    *stored = metadata;
}

fn capability_map(entries: &[(&str, Value)]) -> Metadata {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

fn system_capabilities() -> CapabilityRequest {
    CapabilityRequest {
        capabilities: capability_map(&[
            ("cdmi_domains", json!("true")),
            ("cdmi_dataobjects", json!("true")),
            ("cdmi_object_access_by_ID", json!("true")),
            ("cdmi_metadata_maxitems", json!(1024)),
        ]),
        metadata: Metadata::new(),
    }
}

fn container_capabilities() -> CapabilityRequest {
    CapabilityRequest {
        capabilities: capability_map(&[
            ("cdmi_list_children", json!("true")),
            ("cdmi_read_metadata", json!("true")),
            ("cdmi_modify_metadata", json!("true")),
            ("cdmi_create_dataobject", json!("true")),
            ("cdmi_create_container", json!("true")),
            ("cdmi_delete_container", json!("true")),
        ]),
        metadata: Metadata::new(),
    }
}

fn data_object_capabilities() -> CapabilityRequest {
    CapabilityRequest {
        capabilities: capability_map(&[
            ("cdmi_read_value", json!("true")),
            ("cdmi_read_metadata", json!("true")),
            ("cdmi_modify_value", json!("true")),
            ("cdmi_modify_metadata", json!("true")),
            ("cdmi_delete_dataobject", json!("true")),
        ]),
        metadata: Metadata::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::tests::{fs_hierarchy, kv_hierarchy};
    use assert_matches::assert_matches;
    use std::time::Duration;

    const OBJECT_DEFAULT: &str = "/cdmi_capabilities/dataobject/default";
    const OBJECT_PROFILE1: &str = "/cdmi_capabilities/dataobject/profile1";
    const OBJECT_PROFILE2: &str = "/cdmi_capabilities/dataobject/profile2";

    fn fast_config() -> OrchestratorConfig {
        let mut config = OrchestratorConfig::default();
        config
            .backend_properties
            .insert("transition_delay_ms".to_string(), "20".to_string());
        config
    }

    async fn bootstrapped(hierarchy: Arc<Hierarchy>) -> Arc<Orchestrator> {
        let orchestrator = Orchestrator::new(fast_config(), hierarchy, BackendRegistry::default());
        orchestrator.bootstrap().await.unwrap();
        orchestrator
    }

    #[tokio::test]
    async fn test_bootstrap_tree() {
        let (hierarchy, _tmp) = fs_hierarchy().await;
        let orchestrator = bootstrapped(hierarchy.clone()).await;

        let root = hierarchy.find_by_path("/").await.unwrap().unwrap();
        assert_eq!(root.children(), ["cdmi_capabilities", "cdmi_domains"]);

        let capabilities = orchestrator
            .capabilities()
            .find_by_path(CAPABILITIES_ROOT)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(capabilities.parent_id, root.object_id());
        assert_eq!(capabilities.children, vec!["container", "dataobject"]);

        let dataobject = orchestrator
            .capabilities()
            .find_by_path(DATA_OBJECT_CAPABILITIES)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(dataobject.children, vec!["default", "profile1", "profile2"]);

        assert!(orchestrator
            .domains()
            .find_by_path(DOMAINS_ROOT)
            .await
            .unwrap()
            .is_some());
        assert!(orchestrator.qos().await.is_some());
    }

    #[tokio::test]
    async fn test_bootstrap_is_idempotent() {
        let hierarchy = kv_hierarchy();
        let orchestrator = bootstrapped(hierarchy.clone()).await;
        let first = hierarchy.find_by_path(CAPABILITIES_ROOT).await.unwrap().unwrap();

        orchestrator.bootstrap().await.unwrap();
        let second = hierarchy.find_by_path(CAPABILITIES_ROOT).await.unwrap().unwrap();
        assert_eq!(first.object_id(), second.object_id());

        let root = hierarchy.find_by_path("/").await.unwrap().unwrap();
        assert_eq!(root.children().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_backend_is_swallowed() {
        let hierarchy = kv_hierarchy();
        let config = OrchestratorConfig {
            backend_type: "tape_library".to_string(),
            ..Default::default()
        };
        let orchestrator = Orchestrator::new(config, hierarchy, BackendRegistry::default());

        orchestrator.bootstrap().await.unwrap();
        assert!(orchestrator.qos().await.is_none());

        let container = orchestrator
            .capabilities()
            .find_by_path(CONTAINER_CAPABILITIES)
            .await
            .unwrap()
            .unwrap();
        assert!(container.children.is_empty());

        assert_matches!(
            orchestrator.status_of("/").await,
            Err(Error::BackendUnavailable { .. })
        );
        let status = orchestrator.status().await;
        assert_eq!(status.backend, None);
        assert!(status.healthy);
    }

    #[tokio::test]
    async fn test_create_get_update_delete() {
        let hierarchy = kv_hierarchy();
        let orchestrator = bootstrapped(hierarchy).await;

        let created = orchestrator
            .create(
                "/f.txt",
                ObjectKind::DataObject,
                json!({"value": "hello", "metadata": {"color": "red"}}),
            )
            .await
            .unwrap();
        assert_eq!(created.kind(), ObjectKind::DataObject);

        let fetched = orchestrator.get_by_path("/f.txt").await.unwrap().unwrap();
        assert_eq!(fetched.capabilities_uri(), Some(OBJECT_DEFAULT));
        assert!(fetched
            .metadata()
            .unwrap()
            .contains_key("cdmi_latency_provided"));

        let updated = orchestrator
            .update(
                "/f.txt",
                ObjectUpdate {
                    metadata: Some(capability_map(&[("color", json!("blue"))])),
                    value: Some("hello, world".to_string()),
                    capabilities_uri: None,
                },
            )
            .await
            .unwrap();
        let metadata = updated.metadata().unwrap();
        assert_eq!(metadata["color"], "blue");
        assert_eq!(metadata[META_SIZE], json!(12));
        assert!(metadata.contains_key(META_CTIME));

        let by_id = orchestrator
            .get_by_id(created.object_id())
            .await
            .unwrap()
            .unwrap();
        assert_matches!(by_id, CdmiObject::DataObject(d) if d.value == "hello, world");

        orchestrator.delete("/f.txt").await.unwrap().unwrap();
        assert!(orchestrator.get_by_path("/f.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_requests_transition() {
        let hierarchy = kv_hierarchy();
        let orchestrator = bootstrapped(hierarchy).await;
        orchestrator
            .create("/f", ObjectKind::DataObject, json!({}))
            .await
            .unwrap();
        orchestrator.status_of("/f").await.unwrap();

        assert_matches!(
            orchestrator
                .update(
                    "/f",
                    ObjectUpdate {
                        capabilities_uri: Some(OBJECT_PROFILE2.to_string()),
                        metadata: Some(Metadata::new()),
                        ..Default::default()
                    },
                )
                .await,
            Err(Error::UnsupportedTransition { .. })
        );

        let updated = orchestrator
            .update(
                "/f",
                ObjectUpdate {
                    capabilities_uri: Some(OBJECT_PROFILE1.to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.capabilities_uri(), Some(OBJECT_DEFAULT));
        assert_eq!(
            updated.metadata().unwrap()[META_CAPABILITIES_TARGET],
            OBJECT_PROFILE1
        );

        let status = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let status = orchestrator.status_of("/f").await.unwrap();
                if !status.is_transitioning() {
                    return status;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(status.current_capabilities_uri, OBJECT_PROFILE1);
    }

    #[tokio::test]
    async fn test_value_on_container_rejected() {
        let hierarchy = kv_hierarchy();
        let orchestrator = bootstrapped(hierarchy).await;
        orchestrator
            .create("/a", ObjectKind::Container, json!({}))
            .await
            .unwrap();

        assert_matches!(
            orchestrator
                .update(
                    "/a",
                    ObjectUpdate {
                        value: Some("x".to_string()),
                        ..Default::default()
                    },
                )
                .await,
            Err(Error::Malformed(_))
        );
        assert_matches!(
            orchestrator
                .create("/cap", ObjectKind::Capability, json!({}))
                .await,
            Err(Error::Malformed(_))
        );
        assert_matches!(
            orchestrator
                .create("/b", ObjectKind::Container, json!({"metadata": 5}))
                .await,
            Err(Error::JsonParse(_))
        );
    }

    #[tokio::test]
    async fn test_rejected_update_schedules_nothing() {
        let hierarchy = kv_hierarchy();
        let orchestrator = bootstrapped(hierarchy).await;
        orchestrator
            .create("/a", ObjectKind::Container, json!({}))
            .await
            .unwrap();

        assert_matches!(
            orchestrator
                .update(
                    "/a",
                    ObjectUpdate {
                        capabilities_uri: Some(
                            "/cdmi_capabilities/container/profile1".to_string()
                        ),
                        value: Some("x".to_string()),
                        ..Default::default()
                    },
                )
                .await,
            Err(Error::Malformed(_))
        );

        let status = orchestrator.status_of("/a").await.unwrap();
        assert!(!status.is_transitioning());
        assert_eq!(
            status.current_capabilities_uri,
            "/cdmi_capabilities/container/default"
        );
        assert_eq!(orchestrator.qos().await.unwrap().pending_transitions(), 0);
    }

    #[tokio::test]
    async fn test_adopts_objects_held_by_backend() {
        let held = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(held.path().join("d")).unwrap();
        std::fs::write(held.path().join("d").join("f.txt"), "x").unwrap();

        let mut config = fast_config();
        config
            .backend_properties
            .insert("base_directory".to_string(), held.path().display().to_string());
        let hierarchy = kv_hierarchy();
        let orchestrator = Orchestrator::new(config, hierarchy.clone(), BackendRegistry::default());
        orchestrator.bootstrap().await.unwrap();

        // The key-value store needs the parent adopted first
        assert!(orchestrator.get_by_path("/d/f.txt").await.unwrap().is_none());

        let dir = orchestrator.get_by_path("/d").await.unwrap().unwrap();
        assert_eq!(dir.kind(), ObjectKind::Container);
        assert_eq!(
            dir.capabilities_uri(),
            Some("/cdmi_capabilities/container/default")
        );

        let file = orchestrator.get_by_path("/d/f.txt").await.unwrap().unwrap();
        assert_eq!(file.kind(), ObjectKind::DataObject);
        assert_eq!(file.capabilities_uri(), Some(OBJECT_DEFAULT));
        assert_eq!(file.parent_id(), Some(dir.object_id()));

        let root = hierarchy.find_by_path("/").await.unwrap().unwrap();
        assert!(root.children().iter().any(|c| c == "d"));
        assert!(orchestrator.get_by_path("/missing").await.unwrap().is_none());

        // Adoption happens once
        let again = orchestrator.get_by_path("/d").await.unwrap().unwrap();
        assert_eq!(again.object_id(), dir.object_id());
    }

    #[tokio::test]
    async fn test_status_summary() {
        let (hierarchy, _tmp) = fs_hierarchy().await;
        let orchestrator = bootstrapped(hierarchy).await;

        let status = orchestrator.status().await;
        assert!(status.healthy);
        assert_eq!(status.store, "filesystem");
        assert_eq!(status.backend.as_deref(), Some("dummy_filesystem"));
        assert_eq!(status.pending_transitions, 0);
        assert_eq!(status.health.len(), 2);
    }
}
