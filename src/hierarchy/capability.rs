//! Capability DAO

use super::Hierarchy;
use crate::domain::model::{CdmiObject, Capability, CapabilityRequest, META_CTIME};
use crate::error::{Error, Result};
use std::sync::Arc;
use tracing::debug;

/// Typed access to the capability tree
#[derive(Clone)]
pub struct CapabilityDao {
    hierarchy: Arc<Hierarchy>,
}

impl CapabilityDao {
    pub fn new(hierarchy: Arc<Hierarchy>) -> Self {
        Self { hierarchy }
    }

    pub async fn create_by_path(
        &self,
        path: &str,
        request: &CapabilityRequest,
    ) -> Result<Capability> {
        let request = request.clone();
        let object = self
            .hierarchy
            .create_entry(path, move |placement| {
                Capability::from_request(placement, &request).into()
            })
            .await?;
        Capability::try_from(object)
    }

    /// Create the capability, or replace the capabilities and metadata of
    /// the one already at `path`
    pub async fn upsert_by_path(
        &self,
        path: &str,
        request: &CapabilityRequest,
    ) -> Result<Capability> {
        if self.find_by_path(path).await?.is_none() {
            return self.create_by_path(path, request).await;
        }

        debug!(path = %path, "Replacing capability");
        let request = request.clone();
        let object = self
            .hierarchy
            .modify(path, move |object| match object {
                CdmiObject::Capability(c) => {
                    let created = c.metadata.remove(META_CTIME);
                    c.capabilities = request.capabilities;
                    c.metadata = request.metadata;
                    if let Some(created) = created {
                        c.metadata.insert(META_CTIME.to_string(), created);
                    }
                    Ok(())
                }
                other => Err(Error::Malformed(format!(
                    "{} is a {}, not a capability",
                    other.path().unwrap_or_default(),
                    other.kind()
                ))),
            })
            .await?;
        Capability::try_from(object)
    }

    pub async fn find_by_path(&self, path: &str) -> Result<Option<Capability>> {
        self.hierarchy.find_as(path).await
    }

    pub async fn find_by_object_id(&self, object_id: &str) -> Result<Option<Capability>> {
        self.hierarchy.find_by_id_as(object_id).await
    }

    pub async fn delete_by_path(&self, path: &str) -> Result<Option<Capability>> {
        self.hierarchy.delete_as(path).await
    }

    pub async fn update(&self, capability: Capability) -> Result<Capability> {
        let object = self
            .hierarchy
            .update_entry(CdmiObject::Capability(capability))
            .await?;
        Capability::try_from(object)
    }

    pub async fn is_container(&self, path: &str) -> Result<bool> {
        self.hierarchy.is_container(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::tests::{fs_hierarchy, kv_hierarchy};
    use serde_json::json;

    fn request(latency: u64) -> CapabilityRequest {
        let mut request = CapabilityRequest::default();
        request
            .capabilities
            .insert("cdmi_latency".into(), json!(latency));
        request
            .metadata
            .insert("cdmi_geographic_placement".into(), json!(["DE"]));
        request
    }

    #[tokio::test]
    async fn test_capability_tree() {
        let (hierarchy, _tmp) = fs_hierarchy().await;
        let dao = CapabilityDao::new(hierarchy);

        let root = dao
            .create_by_path("/cdmi_capabilities", &CapabilityRequest::default())
            .await
            .unwrap();
        let container = dao
            .create_by_path("/cdmi_capabilities/container", &CapabilityRequest::default())
            .await
            .unwrap();
        let profile = dao
            .create_by_path("/cdmi_capabilities/container/profile1", &request(100))
            .await
            .unwrap();

        assert_eq!(container.parent_id, root.object_id);
        assert_eq!(profile.parent_uri, "/cdmi_capabilities/container");
        assert_eq!(profile.capabilities["cdmi_latency"], json!(100));

        let container = dao
            .find_by_path("/cdmi_capabilities/container")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(container.children, vec!["profile1".to_string()]);
        assert_eq!(container.childrenrange, "0");
        assert!(!dao.is_container("/cdmi_capabilities").await.unwrap());
    }

    #[tokio::test]
    async fn test_upsert_replaces_maps() {
        let dao = CapabilityDao::new(kv_hierarchy());
        dao.create_by_path("/cdmi_capabilities", &CapabilityRequest::default())
            .await
            .unwrap();

        let first = dao
            .upsert_by_path("/cdmi_capabilities/fast", &request(10))
            .await
            .unwrap();
        let second = dao
            .upsert_by_path("/cdmi_capabilities/fast", &request(20))
            .await
            .unwrap();

        assert_eq!(first.object_id, second.object_id);
        assert_eq!(second.capabilities["cdmi_latency"], json!(20));
        assert_eq!(
            second.metadata.get(META_CTIME),
            first.metadata.get(META_CTIME)
        );

        let parent = dao
            .find_by_path("/cdmi_capabilities")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(parent.children, vec!["fast".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_capability() {
        let dao = CapabilityDao::new(kv_hierarchy());
        dao.create_by_path("/cdmi_capabilities", &CapabilityRequest::default())
            .await
            .unwrap();
        let fast = dao
            .create_by_path("/cdmi_capabilities/fast", &request(1))
            .await
            .unwrap();

        let deleted = dao
            .delete_by_path("/cdmi_capabilities/fast")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(deleted.object_id, fast.object_id);
        assert!(dao
            .find_by_object_id(&fast.object_id)
            .await
            .unwrap()
            .is_none());
    }
}
