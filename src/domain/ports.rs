//! Domain Ports - Core trait definitions for the CDMI server
//!
//! These traits define the boundaries between the hierarchy / QoS logic and
//! the persistence and storage-driver adapters that implement them.

use crate::domain::model::{CdmiObject, Metadata, ObjectKind};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Object Store Port
// =============================================================================

/// Object store flavours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Filesystem,
    KeyValue,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::Filesystem => write!(f, "filesystem"),
            StoreKind::KeyValue => write!(f, "keyvalue"),
        }
    }
}

impl std::str::FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "filesystem" | "fs" => Ok(StoreKind::Filesystem),
            "keyvalue" | "kv" => Ok(StoreKind::KeyValue),
            other => Err(format!("unknown store kind '{}'", other)),
        }
    }
}

/// Result of a create against an object store
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    /// Both keys were written
    Created,
    /// The path was occupied; the stored object is returned unchanged
    Existing(CdmiObject),
}

/// Dual-indexed persistence of CDMI entities.
///
/// Every write goes to both the path key and the identifier key; every
/// delete removes both. Absence is `Ok(None)`, never an error.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store flavour
    fn kind(&self) -> StoreKind;

    /// Create under `path`. An occupied path yields `Existing` or
    /// `Error::Conflict` depending on the flavour.
    async fn create(&self, path: &str, object: &CdmiObject) -> Result<CreateOutcome>;

    /// Create or overwrite both keys
    async fn put(&self, path: &str, object: &CdmiObject) -> Result<()>;

    async fn get_by_path(&self, path: &str) -> Result<Option<CdmiObject>>;

    async fn get_by_id(&self, object_id: &str) -> Result<Option<CdmiObject>>;

    /// Remove both keys of the entity at `path`
    async fn delete_by_path(&self, path: &str) -> Result<Option<CdmiObject>>;

    /// Remove both keys of the entity with `object_id`
    async fn delete_by_id(&self, object_id: &str) -> Result<Option<CdmiObject>>;

    async fn contains(&self, path: &str) -> Result<bool>;

    /// True iff `path` holds a container
    async fn is_container(&self, path: &str) -> Result<bool>;

    async fn health_check(&self) -> Result<bool>;
}

// =============================================================================
// Storage Backend Port
// =============================================================================

/// Capability sub-tree a backend profile belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CapabilityType {
    Container,
    Dataobject,
}

impl CapabilityType {
    /// Capability tree node profiles of this type hang under
    pub fn capabilities_root(&self) -> &'static str {
        match self {
            CapabilityType::Container => crate::domain::model::CONTAINER_CAPABILITIES,
            CapabilityType::Dataobject => crate::domain::model::DATA_OBJECT_CAPABILITIES,
        }
    }

    /// Profile type a capability URI belongs to
    pub fn of_uri(uri: &str) -> Option<Self> {
        [CapabilityType::Container, CapabilityType::Dataobject]
            .into_iter()
            .find(|t| {
                uri.strip_prefix(t.capabilities_root())
                    .is_some_and(|rest| rest.starts_with('/'))
            })
    }

    /// Profile type governing an entity kind, if QoS applies to it
    pub fn for_kind(kind: ObjectKind) -> Option<Self> {
        match kind {
            ObjectKind::Container => Some(CapabilityType::Container),
            ObjectKind::DataObject => Some(CapabilityType::Dataobject),
            _ => None,
        }
    }
}

impl std::fmt::Display for CapabilityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapabilityType::Container => write!(f, "container"),
            CapabilityType::Dataobject => write!(f, "dataobject"),
        }
    }
}

/// A QoS profile advertised by a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendCapability {
    pub name: String,
    #[serde(rename = "type")]
    pub capability_type: CapabilityType,
    pub capabilities: Metadata,
    pub metadata: Metadata,
}

impl BackendCapability {
    /// Capability tree path this profile is mirrored to
    pub fn uri(&self) -> String {
        format!("{}/{}", self.capability_type.capabilities_root(), self.name)
    }
}

/// QoS status of a stored object as reported to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectStatus {
    #[serde(rename = "capabilitiesURI")]
    pub current_capabilities_uri: String,
    #[serde(rename = "targetCapabilitiesURI", default, skip_serializing_if = "Option::is_none")]
    pub target_capabilities_uri: Option<String>,
    #[serde(rename = "monitoredAttributes", default)]
    pub monitored_attributes: Metadata,
    #[serde(rename = "exports", default, skip_serializing_if = "Metadata::is_empty")]
    pub export_attributes: Metadata,
}

impl ObjectStatus {
    pub fn is_transitioning(&self) -> bool {
        self.target_capabilities_uri.is_some()
    }
}

/// Pluggable storage driver that advertises QoS profiles and executes
/// profile transitions on the underlying media.
///
/// The current and pending profile of an object are persisted with the
/// object and handed in by the QoS engine. A backend that holds objects of
/// its own reports them through [`StorageBackend::get_current_status`].
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Registry key this backend was constructed under
    fn backend_type(&self) -> &str;

    /// Profiles to mirror into the capability tree
    async fn list_capabilities(&self) -> Result<Vec<BackendCapability>>;

    /// Profile an object starts in when none is recorded
    fn default_profile(&self, capability_type: CapabilityType) -> String;

    /// Whether `uri` names a profile of this backend
    fn has_profile(&self, uri: &str) -> bool;

    /// Profiles reachable from `current`
    fn allowed_transitions(&self, current: &str) -> Vec<String>;

    fn is_transition_allowed(&self, current: &str, target: &str) -> bool {
        self.allowed_transitions(current).iter().any(|t| t == target)
    }

    /// Start moving the object at `path` from `current` to `target`.
    /// Returns the time after which the transition is complete.
    async fn request_transition(&self, path: &str, current: &str, target: &str)
        -> Result<Duration>;

    /// Attributes the backend reports for an object in `profile`
    fn monitored_attributes(&self, profile: &str) -> Metadata;

    /// Export attributes for objects of the given type
    fn export_attributes(&self, _capability_type: CapabilityType) -> Metadata {
        Metadata::new()
    }

    /// Status of the object at `path` as the backend sees it.
    ///
    /// `None` when the backend holds nothing at `path`. A reported status
    /// with a target means the backend has not finished moving the object.
    async fn get_current_status(&self, _path: &str) -> Result<Option<ObjectStatus>> {
        Ok(None)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type ObjectStoreRef = Arc<dyn ObjectStore>;
pub type StorageBackendRef = Arc<dyn StorageBackend>;
