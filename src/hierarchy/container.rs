//! Container DAO

use super::Hierarchy;
use crate::domain::model::{CdmiObject, Container, ContainerRequest};
use crate::error::Result;
use std::sync::Arc;

/// Typed access to containers
#[derive(Clone)]
pub struct ContainerDao {
    hierarchy: Arc<Hierarchy>,
}

impl ContainerDao {
    pub fn new(hierarchy: Arc<Hierarchy>) -> Self {
        Self { hierarchy }
    }

    /// Create the container at `path`; `/` returns the root
    pub async fn create_by_path(&self, path: &str, request: &ContainerRequest) -> Result<Container> {
        let request = request.clone();
        let object = self
            .hierarchy
            .create_entry(path, move |placement| {
                Container::from_request(placement, &request).into()
            })
            .await?;
        Container::try_from(object)
    }

    pub async fn find_by_path(&self, path: &str) -> Result<Option<Container>> {
        self.hierarchy.find_as(path).await
    }

    pub async fn find_by_object_id(&self, object_id: &str) -> Result<Option<Container>> {
        self.hierarchy.find_by_id_as(object_id).await
    }

    /// Delete the container and everything below it
    pub async fn delete_by_path(&self, path: &str) -> Result<Option<Container>> {
        self.hierarchy.delete_as(path).await
    }

    /// Rewrite metadata and other caller-owned fields
    pub async fn update(&self, container: Container) -> Result<Container> {
        let object = self
            .hierarchy
            .update_entry(CdmiObject::Container(container))
            .await?;
        Container::try_from(object)
    }

    pub async fn is_container(&self, path: &str) -> Result<bool> {
        self.hierarchy.is_container(path).await
    }
}
