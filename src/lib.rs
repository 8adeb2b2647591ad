//! CDMI Server
//!
//! A CDMI object server: containers, data objects, capabilities and domains
//! kept in a dual-indexed store (by path and by object identifier), with a
//! capability tree mirrored from a storage backend and asynchronous QoS
//! profile transitions.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         REST API (axum)                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                          Orchestrator                            │
//! │  ┌──────────────────┐  ┌────────────────┐  ┌──────────────────┐  │
//! │  │ Capability Bridge│  │   QoS Engine   │  │ Backend Registry │  │
//! │  └────────┬─────────┘  └───────┬────────┘  └────────┬─────────┘  │
//! │           └────────────────────┼────────────────────┘            │
//! ├────────────────────────────────┼─────────────────────────────────┤
//! │      Hierarchy (container / data object / capability / domain)   │
//! │                  per-path locks, parent policy                   │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                          Object Store                            │
//! │  ┌──────────────────────────┐   ┌─────────────────────────────┐  │
//! │  │ Filesystem (path + id)   │   │ Key-value (path + objectid:)│  │
//! │  └──────────────────────────┘   └─────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`config`]: server configuration
//! - [`controlplane`]: backends, capability bridge, QoS engine, orchestrator and API
//! - [`domain`]: entity model, identifier generator and the store/backend traits
//! - [`error`]: error types and handling
//! - [`hierarchy`]: tree bookkeeping and the per-kind DAOs
//! - [`store`]: filesystem and key-value object stores

pub mod config;
pub mod controlplane;
pub mod domain;
pub mod error;
pub mod hierarchy;
pub mod store;

// Re-export commonly used types
pub use config::ServerConfig;

pub use controlplane::{
    ApiServer, ApiServerConfig, BackendRegistry, CapabilityBridge, ObjectUpdate, Orchestrator,
    OrchestratorConfig, OrchestratorStatus, QosEngine, QosState, SimulatedBackend,
};

pub use domain::model::{
    CdmiObject, Capability, Container, DataObject, Domain, GenericObject, ObjectKind,
};
pub use domain::object_id::ObjectIdGenerator;
pub use domain::ports::{
    BackendCapability, CapabilityType, ObjectStatus, ObjectStore, StorageBackend, StoreKind,
};

pub use error::{Error, ErrorKind, Result};

pub use hierarchy::{
    CapabilityDao, ContainerDao, DataObjectDao, DomainDao, Hierarchy, HierarchyConfig,
    ParentPolicy,
};

pub use store::{FilesystemStore, KeyValueStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
