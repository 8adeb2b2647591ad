//! Data Object DAO

use super::Hierarchy;
use crate::domain::model::{CdmiObject, DataObject, DataObjectRequest};
use crate::error::{Error, Result};
use std::sync::Arc;

/// Typed access to data objects
#[derive(Clone)]
pub struct DataObjectDao {
    hierarchy: Arc<Hierarchy>,
}

impl DataObjectDao {
    pub fn new(hierarchy: Arc<Hierarchy>) -> Self {
        Self { hierarchy }
    }

    pub async fn create_by_path(
        &self,
        path: &str,
        request: &DataObjectRequest,
    ) -> Result<DataObject> {
        let request = request.clone();
        let object = self
            .hierarchy
            .create_entry(path, move |placement| {
                DataObject::from_request(placement, &request).into()
            })
            .await?;
        DataObject::try_from(object)
    }

    pub async fn find_by_path(&self, path: &str) -> Result<Option<DataObject>> {
        self.hierarchy.find_as(path).await
    }

    pub async fn find_by_object_id(&self, object_id: &str) -> Result<Option<DataObject>> {
        self.hierarchy.find_by_id_as(object_id).await
    }

    pub async fn delete_by_path(&self, path: &str) -> Result<Option<DataObject>> {
        self.hierarchy.delete_as(path).await
    }

    pub async fn update(&self, mut data_object: DataObject) -> Result<DataObject> {
        data_object.refresh_size();
        let object = self
            .hierarchy
            .update_entry(CdmiObject::DataObject(data_object))
            .await?;
        DataObject::try_from(object)
    }

    /// Replace the value, refreshing `cdmi_size`
    pub async fn update_content(&self, path: &str, value: impl Into<String>) -> Result<DataObject> {
        let value = value.into();
        let object = self
            .hierarchy
            .modify(path, move |object| match object {
                CdmiObject::DataObject(d) => {
                    d.value = value;
                    d.refresh_size();
                    Ok(())
                }
                other => Err(Error::Malformed(format!(
                    "{} is a {}, not a data object",
                    other.path().unwrap_or_default(),
                    other.kind()
                ))),
            })
            .await?;
        DataObject::try_from(object)
    }

    pub async fn is_container(&self, path: &str) -> Result<bool> {
        self.hierarchy.is_container(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{ContainerRequest, META_MTIME, META_SIZE};
    use crate::hierarchy::tests::{fs_hierarchy, kv_hierarchy};
    use crate::hierarchy::ContainerDao;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn hello() -> DataObjectRequest {
        DataObjectRequest {
            value: Some("hello".to_string()),
            mimetype: Some("text/plain".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_under_existing_container() {
        let hierarchy = kv_hierarchy();
        let containers = ContainerDao::new(hierarchy.clone());
        let objects = DataObjectDao::new(hierarchy);

        let a = containers
            .create_by_path("/a", &ContainerRequest::default())
            .await
            .unwrap();
        let f = objects.create_by_path("/a/f.txt", &hello()).await.unwrap();

        assert_eq!(f.parent_uri, "/a");
        assert_eq!(f.parent_id, a.object_id);
        assert_eq!(f.mimetype, "text/plain");
        assert_eq!(f.metadata[META_SIZE], json!(5));

        let by_id = objects.find_by_object_id(&f.object_id).await.unwrap().unwrap();
        assert_eq!(by_id.value, "hello");
    }

    #[tokio::test]
    async fn test_missing_parent_per_policy() {
        let kv = DataObjectDao::new(kv_hierarchy());
        assert_matches!(
            kv.create_by_path("/a/f.txt", &hello()).await,
            Err(Error::NotFound { key }) if key == "/a"
        );

        let (hierarchy, _tmp) = fs_hierarchy().await;
        let fs = DataObjectDao::new(hierarchy.clone());
        let f = fs.create_by_path("/a/b/f.txt", &hello()).await.unwrap();
        assert_eq!(f.parent_uri, "/a/b");
        assert!(hierarchy.is_container("/a/b").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_content() {
        let (hierarchy, tmp) = fs_hierarchy().await;
        let objects = DataObjectDao::new(hierarchy);

        let f = objects.create_by_path("/f.txt", &hello()).await.unwrap();
        let updated = objects
            .update_content("/f.txt", "hello, world")
            .await
            .unwrap();

        assert_eq!(updated.object_id, f.object_id);
        assert_eq!(updated.value, "hello, world");
        assert_eq!(updated.metadata[META_SIZE], json!(12));
        assert!(updated.metadata.contains_key(META_MTIME));
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("f.txt")).unwrap(),
            "hello, world"
        );

        assert_matches!(
            objects.update_content("/", "x").await,
            Err(Error::Malformed(_))
        );
        assert_matches!(
            objects.update_content("/missing", "x").await,
            Err(Error::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn test_update_refreshes_size() {
        let objects = DataObjectDao::new(kv_hierarchy());
        let mut f = objects.create_by_path("/f", &hello()).await.unwrap();

        f.value = "hi".to_string();
        f.mimetype = "text/markdown".to_string();
        let updated = objects.update(f).await.unwrap();
        assert_eq!(updated.metadata[META_SIZE], json!(2));
        assert_eq!(updated.mimetype, "text/markdown");
    }

    #[tokio::test]
    async fn test_delete_unlinks_from_parent() {
        let hierarchy = kv_hierarchy();
        let containers = ContainerDao::new(hierarchy.clone());
        let objects = DataObjectDao::new(hierarchy);

        containers
            .create_by_path("/a", &ContainerRequest::default())
            .await
            .unwrap();
        let f = objects.create_by_path("/a/f", &hello()).await.unwrap();
        objects.create_by_path("/a/g", &hello()).await.unwrap();

        let deleted = objects.delete_by_path("/a/f").await.unwrap().unwrap();
        assert_eq!(deleted.object_id, f.object_id);
        assert!(objects.find_by_object_id(&f.object_id).await.unwrap().is_none());

        let a = containers.find_by_path("/a").await.unwrap().unwrap();
        assert_eq!(a.children, vec!["g".to_string()]);
        assert_eq!(a.childrenrange, "0");
    }
}
