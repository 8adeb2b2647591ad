//! Object Store Backends
//!
//! Dual-indexed persistence for CDMI entities. Each flavour writes an entity
//! under its path and under its object identifier.

mod filesystem;
mod keyvalue;

pub use filesystem::{FilesystemStore, FilesystemStoreConfig};
pub use keyvalue::{KeyValueStore, KvClient, MemoryKvClient, OBJECT_ID_KEY_PREFIX};

pub use crate::domain::ports::{CreateOutcome, ObjectStore, ObjectStoreRef, StoreKind};
