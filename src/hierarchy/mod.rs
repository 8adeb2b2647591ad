//! Hierarchy Manager
//!
//! Builds and maintains the CDMI tree on top of an [`ObjectStore`]: creating
//! a child appends its name to the parent's `children` and recomputes
//! `childrenrange`, deleting a child removes it again. The typed DAOs in the
//! submodules are thin views over [`Hierarchy`].
//!
//! Parent and child writes are not transactional across keys. Sibling
//! creates and deletes serialize on the parent's [`PathLocks`] entry, which
//! bounds the inconsistency window to a crash between the two writes.

mod capability;
mod container;
mod data_object;
mod domain;
mod locks;

pub use capability::CapabilityDao;
pub use container::ContainerDao;
pub use data_object::DataObjectDao;
pub use domain::DomainDao;
pub use locks::{PathGuard, PathLocks};

use crate::domain::model::{
    join_path, normalize_path, split_path, timestamp, CdmiObject, Container, ContainerRequest,
    Placement, META_CTIME, META_MTIME, ROOT_PATH,
};
use crate::domain::object_id::{ObjectIdGenerator, DEFAULT_ENTERPRISE_NUMBER};
use crate::domain::ports::{CreateOutcome, ObjectStoreRef, StoreKind};
use crate::error::{Error, Result};
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

// =============================================================================
// Configuration
// =============================================================================

/// What `create` does when the parent path has no entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentPolicy {
    /// Create missing ancestors as empty containers
    AutoCreate,
    /// Fail with `NotFound` naming the missing parent
    RequireExisting,
}

impl ParentPolicy {
    /// Policy a store flavour uses unless configured otherwise
    pub fn default_for(kind: StoreKind) -> Self {
        match kind {
            StoreKind::Filesystem => ParentPolicy::AutoCreate,
            StoreKind::KeyValue => ParentPolicy::RequireExisting,
        }
    }
}

/// Configuration for the hierarchy manager
#[derive(Debug, Clone)]
pub struct HierarchyConfig {
    /// Override of the store's default parent policy
    pub parent_policy: Option<ParentPolicy>,
    /// Enterprise number stamped into new identifiers
    pub enterprise_number: u32,
    /// Fixed identifier for the root container
    pub root_object_id: Option<String>,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            parent_policy: None,
            enterprise_number: DEFAULT_ENTERPRISE_NUMBER,
            root_object_id: None,
        }
    }
}

// =============================================================================
// Hierarchy
// =============================================================================

/// Tree bookkeeping shared by all DAOs
pub struct Hierarchy {
    store: ObjectStoreRef,
    ids: ObjectIdGenerator,
    locks: Arc<PathLocks>,
    parent_policy: ParentPolicy,
    root_object_id: Option<String>,
}

impl Hierarchy {
    /// Create with default config
    pub fn new(store: ObjectStoreRef) -> Self {
        Self::with_config(store, HierarchyConfig::default())
    }

    /// Create with full config
    pub fn with_config(store: ObjectStoreRef, config: HierarchyConfig) -> Self {
        let parent_policy = config
            .parent_policy
            .unwrap_or_else(|| ParentPolicy::default_for(store.kind()));

        Self {
            store,
            ids: ObjectIdGenerator::new(config.enterprise_number),
            locks: Arc::new(PathLocks::new()),
            parent_policy,
            root_object_id: config.root_object_id,
        }
    }

    pub fn store(&self) -> &ObjectStoreRef {
        &self.store
    }

    /// Lock table, shared with the QoS engine
    pub fn locks(&self) -> Arc<PathLocks> {
        Arc::clone(&self.locks)
    }

    pub fn parent_policy(&self) -> ParentPolicy {
        self.parent_policy
    }

    pub fn id_generator(&self) -> &ObjectIdGenerator {
        &self.ids
    }

    // =========================================================================
    // Root
    // =========================================================================

    /// Return the root container, creating it on first use.
    ///
    /// The root is its own parent: `parentURI` is `/` and `parentID` is its
    /// own identifier.
    pub async fn ensure_root(&self) -> Result<CdmiObject> {
        let _guard = self.locks.lock(ROOT_PATH).await;

        if let Some(root) = self.store.get_by_path(ROOT_PATH).await? {
            return Ok(root);
        }

        let object_id = self
            .root_object_id
            .clone()
            .unwrap_or_else(|| self.ids.generate());
        let mut root: CdmiObject = Container::from_request(
            Placement {
                object_id: object_id.clone(),
                object_name: ROOT_PATH.to_string(),
                parent_uri: ROOT_PATH.to_string(),
                parent_id: object_id,
            },
            &ContainerRequest::default(),
        )
        .into();
        stamp(&mut root, META_CTIME);

        match self.store.create(ROOT_PATH, &root).await? {
            CreateOutcome::Created => {
                info!(object_id = %root.object_id(), "Created root container");
                Ok(root)
            }
            CreateOutcome::Existing(existing) => Ok(existing),
        }
    }

    // =========================================================================
    // Create
    // =========================================================================

    /// Create the entity at `path`, linking it into its parent.
    ///
    /// `build` receives the identifier and addressing fields and returns the
    /// entity to persist. An occupied path follows the store's semantics:
    /// the key-value store returns the existing entity, the filesystem store
    /// fails with `Conflict`. The root path returns the root.
    pub async fn create_entry<F>(&self, path: &str, build: F) -> Result<CdmiObject>
    where
        F: FnOnce(Placement) -> CdmiObject + Send,
    {
        let path = normalize_path(path)?;
        let (parent_path, name) = match split_path(&path) {
            Some(split) => split,
            None => return self.ensure_root().await,
        };

        self.resolve_parent(&parent_path).await?;

        let _guard = self.locks.lock(&parent_path).await;

        // Re-read under the lock; a sibling may have rewritten the listing.
        let mut parent = self
            .store
            .get_by_path(&parent_path)
            .await?
            .ok_or_else(|| Error::not_found(parent_path.as_str()))?;
        if !parent.kind().holds_children() {
            return Err(Error::invalid_path(
                path.as_str(),
                format!("parent {} is a {}", parent_path, parent.kind()),
            ));
        }

        let mut child = build(Placement {
            object_id: self.ids.generate(),
            object_name: name.clone(),
            parent_uri: parent_path.clone(),
            parent_id: parent.object_id().to_string(),
        });
        stamp(&mut child, META_CTIME);

        let linked = !self.store.contains(&path).await? && parent.link_child(&name);
        if linked {
            self.store.put(&parent_path, &parent).await?;
        }

        match self.store.create(&path, &child).await {
            Ok(CreateOutcome::Created) => {
                info!(
                    path = %path,
                    kind = %child.kind(),
                    object_id = %child.object_id(),
                    "Created object"
                );
                Ok(child)
            }
            Ok(CreateOutcome::Existing(existing)) => {
                debug!(path = %path, "Create returned existing object");
                Ok(existing)
            }
            Err(e) => {
                if linked && parent.unlink_child(&name) {
                    if let Err(rollback) = self.store.put(&parent_path, &parent).await {
                        warn!(
                            path = %parent_path,
                            error = %rollback,
                            "Failed to unlink child after failed create"
                        );
                    }
                }
                Err(e)
            }
        }
    }

    /// Load the parent of a pending create, applying the parent policy
    fn resolve_parent<'a>(&'a self, parent_path: &'a str) -> BoxFuture<'a, Result<CdmiObject>> {
        async move {
            if let Some(parent) = self.store.get_by_path(parent_path).await? {
                return Ok(parent);
            }
            if parent_path == ROOT_PATH {
                return self.ensure_root().await;
            }

            match self.parent_policy {
                ParentPolicy::RequireExisting => Err(Error::not_found(parent_path)),
                ParentPolicy::AutoCreate => {
                    debug!(path = %parent_path, "Creating missing parent container");
                    let created = self
                        .create_entry(parent_path, |placement| {
                            Container::from_request(placement, &ContainerRequest::default())
                                .into()
                        })
                        .await;
                    match created {
                        // A concurrent create got there first
                        Err(Error::Conflict { .. }) => self
                            .store
                            .get_by_path(parent_path)
                            .await?
                            .ok_or_else(|| Error::not_found(parent_path)),
                        other => other,
                    }
                }
            }
        }
        .boxed()
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub async fn find_by_path(&self, path: &str) -> Result<Option<CdmiObject>> {
        let path = normalize_path(path)?;
        self.store.get_by_path(&path).await
    }

    pub async fn find_by_object_id(&self, object_id: &str) -> Result<Option<CdmiObject>> {
        self.store.get_by_id(object_id).await
    }

    pub async fn is_container(&self, path: &str) -> Result<bool> {
        let path = normalize_path(path)?;
        self.store.is_container(&path).await
    }

    pub(crate) async fn find_as<T>(&self, path: &str) -> Result<Option<T>>
    where
        T: TryFrom<CdmiObject, Error = Error>,
    {
        self.find_by_path(path).await?.map(T::try_from).transpose()
    }

    pub(crate) async fn find_by_id_as<T>(&self, object_id: &str) -> Result<Option<T>>
    where
        T: TryFrom<CdmiObject, Error = Error>,
    {
        self.find_by_object_id(object_id)
            .await?
            .map(T::try_from)
            .transpose()
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Read-modify-write the entity at `path` under its lock.
    ///
    /// The identifier, kind and address may not change; the child listing
    /// is owned by the hierarchy and carried over from the stored record.
    pub async fn modify<F>(&self, path: &str, apply: F) -> Result<CdmiObject>
    where
        F: FnOnce(&mut CdmiObject) -> Result<()> + Send,
    {
        let path = normalize_path(path)?;
        let _guard = self.locks.lock(&path).await;

        let stored = self
            .store
            .get_by_path(&path)
            .await?
            .ok_or_else(|| Error::not_found(path.as_str()))?;

        let mut object = stored.clone();
        apply(&mut object)?;

        if object.object_id() != stored.object_id() {
            return Err(Error::Malformed(format!("objectID of {} is immutable", path)));
        }
        if object.kind() != stored.kind() {
            return Err(Error::Malformed(format!(
                "{} is a {}, not a {}",
                path,
                stored.kind(),
                object.kind()
            )));
        }
        if object.path().as_deref() != Some(path.as_str()) {
            return Err(Error::Malformed(format!(
                "objectName and parentURI of {} are immutable",
                path
            )));
        }

        object.adopt_children(&stored);
        stamp(&mut object, META_MTIME);

        self.store.put(&path, &object).await?;
        debug!(path = %path, "Updated object");
        Ok(object)
    }

    /// Replace the stored entity with `object`, addressed by its own path
    pub async fn update_entry(&self, object: CdmiObject) -> Result<CdmiObject> {
        let path = object
            .path()
            .ok_or_else(|| Error::Malformed("object has no objectName/parentURI".to_string()))?;
        self.modify(&path, move |stored| {
            *stored = object;
            Ok(())
        })
        .await
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Delete the entity at `path` and its subtree, depth first.
    ///
    /// Both keys of every entity are removed and each name is unlinked from
    /// its parent's listing.
    pub fn delete_entry<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Option<CdmiObject>>> {
        async move {
            let path = normalize_path(path)?;
            let (parent_path, name) = split_path(&path)
                .ok_or_else(|| Error::invalid_path(path.as_str(), "the root cannot be deleted"))?;

            let object = match self.store.get_by_path(&path).await? {
                Some(object) => object,
                None => return Ok(None),
            };

            for child in object.children().to_vec() {
                self.delete_entry(&join_path(&path, &child)).await?;
            }

            let removed = {
                let _parent_guard = self.locks.lock(&parent_path).await;
                let _guard = self.locks.lock(&path).await;

                let removed = self.store.delete_by_path(&path).await?;
                if let Some(mut parent) = self.store.get_by_path(&parent_path).await? {
                    if parent.unlink_child(&name) {
                        self.store.put(&parent_path, &parent).await?;
                    }
                }
                removed
            };

            if let Some(removed) = &removed {
                info!(path = %path, object_id = %removed.object_id(), "Deleted object");
            }
            Ok(removed)
        }
        .boxed()
    }

    pub(crate) async fn delete_as<T>(&self, path: &str) -> Result<Option<T>>
    where
        T: TryFrom<CdmiObject, Error = Error>,
    {
        // Reject a mismatched kind before touching anything
        if let Some(existing) = self.find_by_path(path).await? {
            T::try_from(existing)?;
        }
        self.delete_entry(path).await?.map(T::try_from).transpose()
    }
}

/// Set a system timestamp in the entity's metadata
fn stamp(object: &mut CdmiObject, key: &str) {
    if let Some(metadata) = object.metadata_mut() {
        metadata.insert(key.to_string(), Value::String(timestamp()));
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::model::{children_range, DataObject, DataObjectRequest};
    use crate::store::{FilesystemStore, KeyValueStore};
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    pub(crate) fn kv_hierarchy() -> Arc<Hierarchy> {
        Arc::new(Hierarchy::new(Arc::new(KeyValueStore::new())))
    }

    pub(crate) async fn fs_hierarchy() -> (Arc<Hierarchy>, TempDir) {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemStore::with_path(tmp.path()).await.unwrap();
        (Arc::new(Hierarchy::new(Arc::new(store))), tmp)
    }

    fn container_builder() -> impl FnOnce(Placement) -> CdmiObject + Send {
        |placement| Container::from_request(placement, &ContainerRequest::default()).into()
    }

    #[tokio::test]
    async fn test_default_parent_policies() {
        assert_eq!(kv_hierarchy().parent_policy(), ParentPolicy::RequireExisting);
        let (fs, _tmp) = fs_hierarchy().await;
        assert_eq!(fs.parent_policy(), ParentPolicy::AutoCreate);
    }

    #[tokio::test]
    async fn test_root_is_its_own_parent() {
        let hierarchy = Hierarchy::with_config(
            Arc::new(KeyValueStore::new()),
            HierarchyConfig {
                root_object_id: Some("ROOTID".to_string()),
                ..Default::default()
            },
        );

        let root = hierarchy.ensure_root().await.unwrap();
        assert_eq!(root.object_id(), "ROOTID");
        assert_eq!(root.parent_id(), Some("ROOTID"));
        assert_eq!(root.parent_uri(), Some("/"));
        assert_eq!(root.path().as_deref(), Some("/"));

        // Creating "/" returns the existing root
        let again = hierarchy.create_entry("/", container_builder()).await.unwrap();
        assert_eq!(again, root);
    }

    #[tokio::test]
    async fn test_parent_bookkeeping() {
        let hierarchy = kv_hierarchy();
        hierarchy.create_entry("/c", container_builder()).await.unwrap();

        let names = ["x", "y", "z", "w"];
        for name in names {
            hierarchy
                .create_entry(&format!("/c/{}", name), container_builder())
                .await
                .unwrap();
        }

        let parent = hierarchy.find_by_path("/c").await.unwrap().unwrap();
        assert_eq!(parent.children(), names);
        assert_matches!(&parent, CdmiObject::Container(c) if c.childrenrange == children_range(4));

        for name in names {
            let child = hierarchy
                .find_by_path(&format!("/c/{}", name))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(child.parent_id(), Some(parent.object_id()));
            assert_eq!(child.parent_uri(), Some("/c"));
        }
    }

    #[tokio::test]
    async fn test_concurrent_sibling_creates() {
        let hierarchy = kv_hierarchy();
        hierarchy.create_entry("/p", container_builder()).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let hierarchy = hierarchy.clone();
            handles.push(tokio::spawn(async move {
                hierarchy
                    .create_entry(&format!("/p/child{}", i), container_builder())
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let parent = hierarchy.find_by_path("/p").await.unwrap().unwrap();
        assert_eq!(parent.children().len(), 20);
        assert_matches!(&parent, CdmiObject::Container(c) if c.childrenrange == "0-19");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_share_auto_created_parent() {
        let (hierarchy, _tmp) = fs_hierarchy().await;
        assert_eq!(hierarchy.parent_policy(), ParentPolicy::AutoCreate);

        let mut handles = Vec::new();
        for i in 0..16 {
            let hierarchy = hierarchy.clone();
            handles.push(tokio::spawn(async move {
                hierarchy
                    .create_entry(&format!("/x/c{}", i), container_builder())
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let x = hierarchy.find_by_path("/x").await.unwrap().unwrap();
        assert_eq!(x.children().len(), 16);
        let root = hierarchy.find_by_path("/").await.unwrap().unwrap();
        assert_eq!(root.children(), ["x"]);
    }

    #[tokio::test]
    async fn test_lock_table_drains_after_operations() {
        let hierarchy = kv_hierarchy();
        hierarchy.create_entry("/a", container_builder()).await.unwrap();
        for _ in 0..10 {
            hierarchy.modify("/a", |_| Ok(())).await.unwrap();
        }
        hierarchy.delete_entry("/a").await.unwrap();
        assert!(hierarchy.locks().is_empty());
    }

    #[tokio::test]
    async fn test_require_existing_parent() {
        let hierarchy = kv_hierarchy();
        let err = hierarchy
            .create_entry("/missing/child", container_builder())
            .await
            .unwrap_err();
        assert_matches!(err, Error::NotFound { key } if key == "/missing");
        assert!(hierarchy.find_by_path("/missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_auto_create_parents() {
        let hierarchy = Hierarchy::with_config(
            Arc::new(KeyValueStore::new()),
            HierarchyConfig {
                parent_policy: Some(ParentPolicy::AutoCreate),
                ..Default::default()
            },
        );

        hierarchy
            .create_entry("/x/y/z", container_builder())
            .await
            .unwrap();

        let x = hierarchy.find_by_path("/x").await.unwrap().unwrap();
        let y = hierarchy.find_by_path("/x/y").await.unwrap().unwrap();
        let root = hierarchy.find_by_path("/").await.unwrap().unwrap();
        assert_eq!(x.children(), ["y"]);
        assert_eq!(y.children(), ["z"]);
        assert_eq!(root.children(), ["x"]);
        assert_eq!(y.parent_id(), Some(x.object_id()));
    }

    #[tokio::test]
    async fn test_child_of_data_object_rejected() {
        let hierarchy = kv_hierarchy();
        hierarchy
            .create_entry("/f", |p| {
                DataObject::from_request(p, &DataObjectRequest::default()).into()
            })
            .await
            .unwrap();

        assert_matches!(
            hierarchy.create_entry("/f/g", container_builder()).await,
            Err(Error::InvalidPath { .. })
        );
    }

    #[tokio::test]
    async fn test_create_twice_follows_store_semantics() {
        let kv = kv_hierarchy();
        let first = kv.create_entry("/a", container_builder()).await.unwrap();
        let second = kv.create_entry("/a", container_builder()).await.unwrap();
        assert_eq!(first, second);
        let root = kv.find_by_path("/").await.unwrap().unwrap();
        assert_eq!(root.children(), ["a"]);

        let (fs, _tmp) = fs_hierarchy().await;
        fs.create_entry("/a", container_builder()).await.unwrap();
        assert_matches!(
            fs.create_entry("/a", container_builder()).await,
            Err(Error::Conflict { .. })
        );
        let root = fs.find_by_path("/").await.unwrap().unwrap();
        assert_eq!(root.children(), ["a"]);
    }

    #[tokio::test]
    async fn test_delete_unlinks_and_removes_subtree() {
        let hierarchy = kv_hierarchy();
        for path in ["/a", "/a/b", "/a/b/c", "/a/d"] {
            hierarchy.create_entry(path, container_builder()).await.unwrap();
        }
        let c = hierarchy.find_by_path("/a/b/c").await.unwrap().unwrap();

        let removed = hierarchy.delete_entry("/a/b").await.unwrap().unwrap();
        assert_eq!(removed.path().as_deref(), Some("/a/b"));

        assert!(hierarchy.find_by_path("/a/b").await.unwrap().is_none());
        assert!(hierarchy.find_by_path("/a/b/c").await.unwrap().is_none());
        assert!(hierarchy
            .find_by_object_id(c.object_id())
            .await
            .unwrap()
            .is_none());

        let a = hierarchy.find_by_path("/a").await.unwrap().unwrap();
        assert_eq!(a.children(), ["d"]);
        assert_matches!(&a, CdmiObject::Container(c) if c.childrenrange == "0");

        assert!(hierarchy.delete_entry("/a/b").await.unwrap().is_none());
        assert_matches!(
            hierarchy.delete_entry("/").await,
            Err(Error::InvalidPath { .. })
        );
    }

    #[tokio::test]
    async fn test_modify_keeps_identity_and_listing() {
        let hierarchy = kv_hierarchy();
        hierarchy.create_entry("/a", container_builder()).await.unwrap();
        hierarchy.create_entry("/a/b", container_builder()).await.unwrap();

        let updated = hierarchy
            .modify("/a", |object| {
                if let CdmiObject::Container(c) = object {
                    c.metadata.insert("color".into(), "blue".into());
                    c.children.clear();
                }
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(updated.children(), ["b"]);
        assert!(updated.metadata().unwrap().contains_key(META_MTIME));

        let by_id = hierarchy
            .find_by_object_id(updated.object_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_id, updated);

        let err = hierarchy
            .modify("/a", |object| {
                if let CdmiObject::Container(c) = object {
                    c.object_id = "OTHER".into();
                }
                Ok(())
            })
            .await
            .unwrap_err();
        assert_matches!(err, Error::Malformed(_));

        assert_matches!(
            hierarchy.modify("/nope", |_| Ok(())).await,
            Err(Error::NotFound { .. })
        );
    }
}
