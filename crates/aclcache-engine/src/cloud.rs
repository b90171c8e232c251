//! Boundary to the cloud endpoint.
//!
//! [`CloudAclDriver`] is what the reconciler lists from and what the task
//! worker realizes changes through. [`StaticCloudDriver`] is an in-process
//! endpoint backed by a map, used by the binary's fixture mode and by tests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use aclcache_core::{AclEntries, short_suffix};
use aclcache_storage::{CloudProvider, CloudRegion};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::differ::GlobalKeyed;

/// One ACL as the cloud endpoint reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteAclDescriptor {
    pub global_id: String,
    #[serde(default)]
    pub name: String,
    pub entries: AclEntries,
    /// Global id of the listener the ACL is attached to, for per-listener providers.
    #[serde(default)]
    pub listener_global_id: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl RemoteAclDescriptor {
    pub fn new(global_id: impl Into<String>, name: impl Into<String>, entries: AclEntries) -> Self {
        Self {
            global_id: global_id.into(),
            name: name.into(),
            entries,
            listener_global_id: None,
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_listener(mut self, listener_global_id: impl Into<String>) -> Self {
        self.listener_global_id = Some(listener_global_id.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Bound listener id, ignoring empty strings some endpoints report.
    pub fn bound_listener(&self) -> Option<&str> {
        self.listener_global_id.as_deref().filter(|l| !l.is_empty())
    }
}

impl GlobalKeyed for RemoteAclDescriptor {
    fn global_key(&self) -> &str {
        &self.global_id
    }
}

/// Payload for creating or updating a remote ACL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteAclRequest {
    pub name: String,
    pub entries: AclEntries,
    pub listener_external_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Cloud request failed: {0}")]
    Request(String),

    #[error("Remote acl not found: {0}")]
    NotFound(String),
}

impl DriverError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[async_trait]
pub trait CloudAclDriver: Send + Sync {
    async fn list_acls(
        &self,
        provider: &CloudProvider,
        region: &CloudRegion,
    ) -> Result<Vec<RemoteAclDescriptor>, DriverError>;

    /// Creates the ACL remotely and returns its global id.
    async fn create_acl(
        &self,
        provider: &CloudProvider,
        region: &CloudRegion,
        request: &RemoteAclRequest,
    ) -> Result<String, DriverError>;

    async fn update_acl(
        &self,
        provider: &CloudProvider,
        region: &CloudRegion,
        external_id: &str,
        request: &RemoteAclRequest,
    ) -> Result<(), DriverError>;

    async fn delete_acl(
        &self,
        provider: &CloudProvider,
        region: &CloudRegion,
        external_id: &str,
    ) -> Result<(), DriverError>;
}

pub type DynCloudDriver = Arc<dyn CloudAclDriver>;

#[derive(Debug, Clone)]
struct StoredAcl {
    provider_id: String,
    region_external_id: String,
    descriptor: RemoteAclDescriptor,
}

/// Map-backed endpoint. Listing order is by global id.
#[derive(Debug, Default)]
pub struct StaticCloudDriver {
    acls: DashMap<String, StoredAcl>,
    failures: AtomicUsize,
    calls: AtomicUsize,
}

impl StaticCloudDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places `descriptor` in the listing of (`provider`, `region`).
    pub fn seed(&self, provider: &CloudProvider, region: &CloudRegion, descriptor: RemoteAclDescriptor) {
        self.acls.insert(
            descriptor.global_id.clone(),
            StoredAcl {
                provider_id: provider.id.clone(),
                region_external_id: region.external_id.clone(),
                descriptor,
            },
        );
    }

    /// Drops an ACL from the listing, as if removed out of band.
    pub fn remove(&self, global_id: &str) -> Option<RemoteAclDescriptor> {
        self.acls.remove(global_id).map(|(_, stored)| stored.descriptor)
    }

    pub fn get(&self, global_id: &str) -> Option<RemoteAclDescriptor> {
        self.acls.get(global_id).map(|stored| stored.descriptor.clone())
    }

    /// Makes the next `times` calls fail with a request error.
    pub fn fail_next(&self, times: usize) {
        self.failures.store(times, Ordering::SeqCst);
    }

    /// Number of calls served, failed ones included.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self, op: &str) -> Result<(), DriverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(DriverError::Request(format!("injected failure on {op}")));
        }
        Ok(())
    }
}

#[async_trait]
impl CloudAclDriver for StaticCloudDriver {
    async fn list_acls(
        &self,
        provider: &CloudProvider,
        region: &CloudRegion,
    ) -> Result<Vec<RemoteAclDescriptor>, DriverError> {
        self.enter("list_acls")?;
        let mut listed: Vec<RemoteAclDescriptor> = self
            .acls
            .iter()
            .filter(|s| s.provider_id == provider.id && s.region_external_id == region.external_id)
            .map(|s| s.descriptor.clone())
            .collect();
        listed.sort_by(|a, b| a.global_id.cmp(&b.global_id));
        Ok(listed)
    }

    async fn create_acl(
        &self,
        provider: &CloudProvider,
        region: &CloudRegion,
        request: &RemoteAclRequest,
    ) -> Result<String, DriverError> {
        self.enter("create_acl")?;
        let global_id = format!("acl-{}", short_suffix());
        let mut descriptor =
            RemoteAclDescriptor::new(&global_id, &request.name, request.entries.clone());
        descriptor.listener_global_id = request.listener_external_id.clone();
        self.seed(provider, region, descriptor);
        Ok(global_id)
    }

    async fn update_acl(
        &self,
        _provider: &CloudProvider,
        _region: &CloudRegion,
        external_id: &str,
        request: &RemoteAclRequest,
    ) -> Result<(), DriverError> {
        self.enter("update_acl")?;
        let mut stored = self
            .acls
            .get_mut(external_id)
            .ok_or_else(|| DriverError::NotFound(external_id.to_string()))?;
        stored.descriptor.name = request.name.clone();
        stored.descriptor.entries = request.entries.clone();
        Ok(())
    }

    async fn delete_acl(
        &self,
        _provider: &CloudProvider,
        _region: &CloudRegion,
        external_id: &str,
    ) -> Result<(), DriverError> {
        self.enter("delete_acl")?;
        self.acls
            .remove(external_id)
            .map(|_| ())
            .ok_or_else(|| DriverError::NotFound(external_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aclcache_core::{AclEntry, ProviderKind};

    fn entries(cidr: &str) -> AclEntries {
        vec![AclEntry::new(cidr, "")].into()
    }

    #[tokio::test]
    async fn test_listing_is_scoped_and_sorted() {
        let driver = StaticCloudDriver::new();
        let provider = CloudProvider::new("aliyun", ProviderKind::Aliyun, "p1");
        let other = CloudProvider::new("aws", ProviderKind::Aws, "p1");
        let region = CloudRegion::new("cn-hz", "cn-hangzhou");

        driver.seed(&provider, &region, RemoteAclDescriptor::new("b", "b", entries("10.0.0.0/8")));
        driver.seed(&provider, &region, RemoteAclDescriptor::new("a", "a", entries("10.1.0.0/16")));
        driver.seed(&other, &region, RemoteAclDescriptor::new("c", "c", entries("10.2.0.0/16")));

        let listed = driver.list_acls(&provider, &region).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|d| d.global_id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[tokio::test]
    async fn test_create_update_delete() {
        let driver = StaticCloudDriver::new();
        let provider = CloudProvider::new("aliyun", ProviderKind::Aliyun, "p1");
        let region = CloudRegion::new("cn-hz", "cn-hangzhou");
        let request = RemoteAclRequest {
            name: "office".into(),
            entries: entries("10.0.0.0/8"),
            listener_external_id: None,
        };

        let id = driver.create_acl(&provider, &region, &request).await.unwrap();
        assert_eq!(driver.get(&id).unwrap().name, "office");

        let renamed = RemoteAclRequest {
            name: "office-2".into(),
            ..request
        };
        driver.update_acl(&provider, &region, &id, &renamed).await.unwrap();
        assert_eq!(driver.get(&id).unwrap().name, "office-2");

        driver.delete_acl(&provider, &region, &id).await.unwrap();
        let err = driver.delete_acl(&provider, &region, &id).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let driver = StaticCloudDriver::new();
        let provider = CloudProvider::new("aliyun", ProviderKind::Aliyun, "p1");
        let region = CloudRegion::new("cn-hz", "cn-hangzhou");

        driver.fail_next(1);
        assert!(driver.list_acls(&provider, &region).await.is_err());
        assert!(driver.list_acls(&provider, &region).await.is_ok());
        assert_eq!(driver.call_count(), 2);
    }

    #[test]
    fn test_descriptor_deserializes_with_defaults() {
        let d: RemoteAclDescriptor = serde_json::from_str(
            r#"{"global_id":"acl-1","entries":[{"cidr":"10.0.0.0/8","comment":""}],"listener_global_id":""}"#,
        )
        .unwrap();
        assert_eq!(d.name, "");
        assert!(d.bound_listener().is_none());
        assert!(d.metadata.is_empty());
    }
}
