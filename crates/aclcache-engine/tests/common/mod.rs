#![allow(dead_code)]

use std::sync::Arc;

use aclcache_core::{AclEntries, AclEntry, ProviderKind};
use aclcache_db_memory::InMemoryStorage;
use aclcache_engine::{AclCache, AppConfig, RemoteAclDescriptor, StaticCloudDriver, UserCredential};
use aclcache_storage::{
    CachedAclFilter, CachedAclRecord, CachedAclStorage, CatalogStorage, CloudProvider, CloudRegion,
    DynStorage, LoadbalancerListener,
};

pub struct Harness {
    pub cache: AclCache,
    pub memory: Arc<InMemoryStorage>,
    pub storage: DynStorage,
    pub driver: Arc<StaticCloudDriver>,
    pub provider: CloudProvider,
    pub region: CloudRegion,
    pub cred: UserCredential,
}

impl Harness {
    pub async fn new(kind: ProviderKind) -> Self {
        Self::with_config(kind, &AppConfig::default()).await
    }

    pub async fn with_config(kind: ProviderKind, config: &AppConfig) -> Self {
        let memory = Arc::new(InMemoryStorage::new());
        let storage: DynStorage = memory.clone();
        Self::on_storage(kind, config, memory, storage).await
    }

    pub async fn on_storage(
        kind: ProviderKind,
        config: &AppConfig,
        memory: Arc<InMemoryStorage>,
        storage: DynStorage,
    ) -> Self {
        let driver = Arc::new(StaticCloudDriver::new());
        let provider = storage
            .insert_provider(CloudProvider::new("account", kind, "proj-1"))
            .await
            .unwrap();
        let region = storage
            .insert_region(CloudRegion::new("hangzhou", "cn-hangzhou"))
            .await
            .unwrap();
        let cache = AclCache::assemble(storage.clone(), driver.clone(), config);
        Self {
            cache,
            memory,
            storage,
            driver,
            provider,
            region,
            cred: UserCredential::new("alice", "proj-1"),
        }
    }

    pub async fn sync(&self, remote: Vec<RemoteAclDescriptor>) -> aclcache_engine::SyncResult {
        self.cache
            .manager
            .sync_loadbalancer_acls(&self.cred, &self.provider, &self.region, remote)
            .await
            .unwrap()
    }

    /// Runs every queued task on the current task.
    pub async fn drain(&mut self) -> usize {
        self.cache.worker.drain(&mut self.cache.tasks).await
    }

    pub async fn listener(&self, external_id: &str) -> LoadbalancerListener {
        self.storage
            .insert_listener(LoadbalancerListener::new(
                format!("lis-{external_id}"),
                external_id,
                &self.provider,
                &self.region.id,
            ))
            .await
            .unwrap()
    }

    pub async fn live_records(&self) -> Vec<CachedAclRecord> {
        self.storage
            .find_cached_acls(&CachedAclFilter::new().region(&self.region.id))
            .await
            .unwrap()
    }

    pub async fn record(&self, id: &str) -> CachedAclRecord {
        self.storage.get_cached_acl(id).await.unwrap().unwrap()
    }

    pub async fn by_external_id(&self, external_id: &str) -> CachedAclRecord {
        let found = self
            .storage
            .find_cached_acls(&CachedAclFilter::new().external_id(external_id))
            .await
            .unwrap();
        assert_eq!(found.len(), 1, "records bound to {external_id}");
        found.into_iter().next().unwrap()
    }
}

pub fn entries(cidrs: &[&str]) -> AclEntries {
    cidrs.iter().map(|c| AclEntry::new(*c, "")).collect()
}

pub fn remote(global_id: &str, name: &str, cidrs: &[&str]) -> RemoteAclDescriptor {
    RemoteAclDescriptor::new(global_id, name, entries(cidrs))
}
