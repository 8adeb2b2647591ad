//! Domain DAO
//!
//! Domains scope accounts and tenants. Only tree bookkeeping is provided;
//! membership and access rules are left to the caller.

use super::Hierarchy;
use crate::domain::model::{CdmiObject, Domain, DomainRequest};
use crate::error::Result;
use std::sync::Arc;

#[derive(Clone)]
pub struct DomainDao {
    hierarchy: Arc<Hierarchy>,
}

impl DomainDao {
    pub fn new(hierarchy: Arc<Hierarchy>) -> Self {
        Self { hierarchy }
    }

    pub async fn create_by_path(&self, path: &str, request: &DomainRequest) -> Result<Domain> {
        let request = request.clone();
        let object = self
            .hierarchy
            .create_entry(path, move |placement| Domain::from_request(placement, &request).into())
            .await?;
        Domain::try_from(object)
    }

    pub async fn find_by_path(&self, path: &str) -> Result<Option<Domain>> {
        self.hierarchy.find_as(path).await
    }

    pub async fn find_by_object_id(&self, object_id: &str) -> Result<Option<Domain>> {
        self.hierarchy.find_by_id_as(object_id).await
    }

    pub async fn delete_by_path(&self, path: &str) -> Result<Option<Domain>> {
        self.hierarchy.delete_as(path).await
    }

    pub async fn update(&self, domain: Domain) -> Result<Domain> {
        let object = self
            .hierarchy
            .update_entry(CdmiObject::Domain(domain))
            .await?;
        Domain::try_from(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::tests::kv_hierarchy;

    #[tokio::test]
    async fn test_domain_lifecycle() {
        let dao = DomainDao::new(kv_hierarchy());

        let domains = dao
            .create_by_path("/cdmi_domains", &DomainRequest::default())
            .await
            .unwrap();
        let tenant = dao
            .create_by_path("/cdmi_domains/tenant", &DomainRequest::default())
            .await
            .unwrap();
        assert_eq!(tenant.parent_id, domains.object_id);

        let mut tenant = dao.find_by_path("/cdmi_domains/tenant").await.unwrap().unwrap();
        tenant.metadata.insert("quota".into(), "10GB".into());
        let updated = dao.update(tenant).await.unwrap();
        assert_eq!(updated.metadata["quota"], "10GB");

        dao.delete_by_path("/cdmi_domains/tenant").await.unwrap();
        let domains = dao.find_by_path("/cdmi_domains").await.unwrap().unwrap();
        assert!(domains.children.is_empty());
    }
}
