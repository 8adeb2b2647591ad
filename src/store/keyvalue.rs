//! Key-Value Object Store
//!
//! Stores each entity under two string keys holding the same JSON: the path
//! itself and `objectid:<ID>`. Creation claims the path key with
//! set-if-absent, so a concurrent create of the same path observes the
//! winner's object instead of overwriting it.

use crate::domain::model::{CdmiObject, ObjectKind};
use crate::domain::ports::{CreateOutcome, ObjectStore, StoreKind};
use crate::error::{Error, Result};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Key prefix of identifier entries
pub const OBJECT_ID_KEY_PREFIX: &str = "objectid:";

// =============================================================================
// KvClient Trait
// =============================================================================

/// Minimal string key-value client
#[async_trait]
pub trait KvClient: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String) -> Result<()>;

    /// Store `value` only if `key` is unset. Returns whether it was stored.
    async fn set_if_absent(&self, key: &str, value: String) -> Result<bool>;

    /// Returns whether the key existed
    async fn delete(&self, key: &str) -> Result<bool>;

    async fn ping(&self) -> Result<bool>;
}

/// In-process client backed by DashMap
#[derive(Debug, Default)]
pub struct MemoryKvClient {
    entries: DashMap<String, String>,
}

impl MemoryKvClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KvClient for MemoryKvClient {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|r| r.value().clone()))
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: String) -> Result<bool> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(value);
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn ping(&self) -> Result<bool> {
        Ok(true)
    }
}

// =============================================================================
// Key-Value Store
// =============================================================================

/// Object store over a [`KvClient`]
pub struct KeyValueStore {
    client: Arc<dyn KvClient>,
}

impl KeyValueStore {
    /// Create a store over an in-process client
    pub fn new() -> Self {
        Self::with_client(Arc::new(MemoryKvClient::new()))
    }

    pub fn with_client(client: Arc<dyn KvClient>) -> Self {
        Self { client }
    }

    fn id_key(object_id: &str) -> String {
        format!("{}{}", OBJECT_ID_KEY_PREFIX, object_id)
    }

    async fn read(&self, key: &str) -> Result<Option<CdmiObject>> {
        match self.client.get(key).await? {
            Some(json) => CdmiObject::from_slice(json.as_bytes()).map(Some),
            None => Ok(None),
        }
    }

    fn encode(object: &CdmiObject) -> Result<String> {
        Ok(serde_json::to_string(&object.to_json()?)?)
    }
}

impl Default for KeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for KeyValueStore {
    fn kind(&self) -> StoreKind {
        StoreKind::KeyValue
    }

    async fn create(&self, path: &str, object: &CdmiObject) -> Result<CreateOutcome> {
        let json = Self::encode(object)?;

        if !self.client.set_if_absent(path, json.clone()).await? {
            return match self.read(path).await? {
                Some(existing) => {
                    debug!(path = %path, "Path already occupied, returning existing object");
                    Ok(CreateOutcome::Existing(existing))
                }
                // Claimed and released again between the two calls
                None => Err(Error::Conflict {
                    key: path.to_string(),
                }),
            };
        }

        self.client
            .set(&Self::id_key(object.object_id()), json)
            .await?;
        debug!(path = %path, object_id = %object.object_id(), "Created object");
        Ok(CreateOutcome::Created)
    }

    async fn put(&self, path: &str, object: &CdmiObject) -> Result<()> {
        let json = Self::encode(object)?;
        self.client.set(path, json.clone()).await?;
        self.client
            .set(&Self::id_key(object.object_id()), json)
            .await?;
        debug!(path = %path, object_id = %object.object_id(), "Stored object");
        Ok(())
    }

    async fn get_by_path(&self, path: &str) -> Result<Option<CdmiObject>> {
        self.read(path).await
    }

    async fn get_by_id(&self, object_id: &str) -> Result<Option<CdmiObject>> {
        self.read(&Self::id_key(object_id)).await
    }

    async fn delete_by_path(&self, path: &str) -> Result<Option<CdmiObject>> {
        let object = match self.read(path).await? {
            Some(object) => object,
            None => return Ok(None),
        };

        self.client.delete(path).await?;
        self.client.delete(&Self::id_key(object.object_id())).await?;
        debug!(path = %path, object_id = %object.object_id(), "Deleted object");
        Ok(Some(object))
    }

    async fn delete_by_id(&self, object_id: &str) -> Result<Option<CdmiObject>> {
        let object = match self.get_by_id(object_id).await? {
            Some(object) => object,
            None => return Ok(None),
        };

        if let Some(path) = object.path() {
            let at_path = self.read(&path).await?;
            if at_path.as_ref().map(|o| o.object_id()) == Some(object_id) {
                self.client.delete(&path).await?;
            } else {
                warn!(object_id = %object_id, path = %path, "Identifier entry has no matching path entry");
            }
        }

        self.client.delete(&Self::id_key(object_id)).await?;
        debug!(object_id = %object_id, "Deleted object");
        Ok(Some(object))
    }

    async fn contains(&self, path: &str) -> Result<bool> {
        Ok(self.client.get(path).await?.is_some())
    }

    async fn is_container(&self, path: &str) -> Result<bool> {
        Ok(self
            .read(path)
            .await?
            .map(|o| o.kind() == ObjectKind::Container)
            .unwrap_or(false))
    }

    async fn health_check(&self) -> Result<bool> {
        self.client.ping().await
    }
}
