use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use aclcache_storage::{
    AclStorage, CACHED_ACL_KEYWORD, CANONICAL_ACL_KEYWORD, CachedAclFilter, CachedAclRecord,
    CachedAclStorage, CanonicalAcl, CanonicalAclStorage, CatalogStorage, CloudProvider,
    CloudRegion, LoadbalancerListener, RecordDiff, RecordMutation, StorageError,
};
use async_trait::async_trait;
use papaya::HashMap as PapayaHashMap;
use time::OffsetDateTime;

use crate::factory::StorageOptions;

/// Storage calls that can be made to fail on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultOp {
    InsertCanonicalAcl,
    InsertCachedAcl,
    GetCachedAcl,
    UpdateCachedAcl,
    FindCachedAcls,
    CountListeners,
}

/// In-memory ACL cache storage using papaya lock-free HashMaps.
///
/// This storage implementation provides:
/// - Lock-free concurrent reads via papaya::HashMap
/// - A single write lane, so check-then-insert and update-with-lock are atomic
/// - A fingerprint index enforcing one canonical ACL per content
/// - Fault injection for exercising partial-failure paths
#[derive(Debug)]
pub struct InMemoryStorage {
    canonical: Arc<PapayaHashMap<String, CanonicalAcl>>,
    /// fingerprint -> canonical id
    fingerprints: Arc<PapayaHashMap<String, String>>,
    cached: Arc<PapayaHashMap<String, CachedAclRecord>>,
    providers: Arc<PapayaHashMap<String, CloudProvider>>,
    regions: Arc<PapayaHashMap<String, CloudRegion>>,
    listeners: Arc<PapayaHashMap<String, LoadbalancerListener>>,
    write_lane: tokio::sync::Mutex<()>,
    faults: Mutex<HashMap<FaultOp, usize>>,
}

impl InMemoryStorage {
    /// Creates a new in-memory storage with default options.
    pub fn new() -> Self {
        Self::with_options(StorageOptions::default())
    }

    /// Creates a new in-memory storage with the given options.
    pub fn with_options(options: StorageOptions) -> Self {
        let cached = match options.preallocate_items {
            Some(n) => PapayaHashMap::with_capacity(n),
            None => PapayaHashMap::new(),
        };
        Self {
            canonical: Arc::new(PapayaHashMap::new()),
            fingerprints: Arc::new(PapayaHashMap::new()),
            cached: Arc::new(cached),
            providers: Arc::new(PapayaHashMap::new()),
            regions: Arc::new(PapayaHashMap::new()),
            listeners: Arc::new(PapayaHashMap::new()),
            write_lane: tokio::sync::Mutex::new(()),
            faults: Mutex::new(HashMap::new()),
        }
    }

    /// Makes the next `times` calls of `op` fail with a connection error.
    pub fn fail_next(&self, op: FaultOp, times: usize) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.insert(op, times);
        }
    }

    fn take_fault(&self, op: FaultOp) -> Result<(), StorageError> {
        let Ok(mut faults) = self.faults.lock() else {
            return Ok(());
        };
        match faults.get_mut(&op) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(StorageError::connection_error(format!("injected fault on {op:?}")))
            }
            _ => Ok(()),
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CanonicalAclStorage for InMemoryStorage {
    async fn insert_canonical_acl(&self, acl: CanonicalAcl) -> Result<CanonicalAcl, StorageError> {
        self.take_fault(FaultOp::InsertCanonicalAcl)?;
        let _lane = self.write_lane.lock().await;

        let fingerprints = self.fingerprints.pin();
        if fingerprints.get(acl.fingerprint()).is_some() {
            return Err(StorageError::already_exists(
                CANONICAL_ACL_KEYWORD,
                acl.fingerprint(),
            ));
        }
        let canonical = self.canonical.pin();
        if canonical.get(&acl.id).is_some() {
            return Err(StorageError::already_exists(CANONICAL_ACL_KEYWORD, &acl.id));
        }

        fingerprints.insert(acl.fingerprint().to_string(), acl.id.clone());
        canonical.insert(acl.id.clone(), acl.clone());
        Ok(acl)
    }

    async fn get_canonical_acl(&self, id: &str) -> Result<Option<CanonicalAcl>, StorageError> {
        Ok(self.canonical.pin().get(id).cloned())
    }

    async fn find_canonical_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<CanonicalAcl>, StorageError> {
        let Some(id) = self.fingerprints.pin().get(fingerprint).cloned() else {
            return Ok(None);
        };
        Ok(self.canonical.pin().get(&id).cloned())
    }

    async fn count_canonical_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<usize, StorageError> {
        let guard = self.canonical.pin();
        Ok(guard
            .iter()
            .filter(|(_, acl)| acl.fingerprint() == fingerprint)
            .count())
    }

    async fn count_canonical_acls(&self) -> Result<usize, StorageError> {
        Ok(self.canonical.pin().len())
    }
}

#[async_trait]
impl CachedAclStorage for InMemoryStorage {
    async fn insert_cached_acl(
        &self,
        record: CachedAclRecord,
    ) -> Result<CachedAclRecord, StorageError> {
        self.take_fault(FaultOp::InsertCachedAcl)?;
        let _lane = self.write_lane.lock().await;

        let guard = self.cached.pin();
        if guard.get(&record.id).is_some() {
            return Err(StorageError::already_exists(CACHED_ACL_KEYWORD, &record.id));
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get_cached_acl(&self, id: &str) -> Result<Option<CachedAclRecord>, StorageError> {
        self.take_fault(FaultOp::GetCachedAcl)?;
        Ok(self.cached.pin().get(id).cloned())
    }

    async fn find_cached_acls(
        &self,
        filter: &CachedAclFilter,
    ) -> Result<Vec<CachedAclRecord>, StorageError> {
        self.take_fault(FaultOp::FindCachedAcls)?;
        let guard = self.cached.pin();
        let mut records: Vec<CachedAclRecord> = guard
            .iter()
            .filter(|(_, r)| filter.matches(r))
            .map(|(_, r)| r.clone())
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    async fn count_cached_acls(&self, filter: &CachedAclFilter) -> Result<usize, StorageError> {
        let guard = self.cached.pin();
        Ok(guard.iter().filter(|(_, r)| filter.matches(r)).count())
    }

    async fn update_cached_acl_with_lock(
        &self,
        id: &str,
        mutate: RecordMutation<'_>,
    ) -> Result<(CachedAclRecord, RecordDiff), StorageError> {
        self.take_fault(FaultOp::UpdateCachedAcl)?;
        let _lane = self.write_lane.lock().await;

        let guard = self.cached.pin();
        let before = guard
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::not_found(CACHED_ACL_KEYWORD, id))?;

        let mut after = before.clone();
        mutate(&mut after)?;
        if after.id != before.id {
            return Err(StorageError::invalid_resource("record id is immutable"));
        }

        let diff = RecordDiff::between(&before, &after);
        if !diff.is_empty() {
            after.updated_at = OffsetDateTime::now_utc();
            guard.insert(after.id.clone(), after.clone());
        }
        Ok((after, diff))
    }

    async fn cached_acl_name_exists(
        &self,
        project_id: &str,
        name: &str,
    ) -> Result<bool, StorageError> {
        let guard = self.cached.pin();
        Ok(guard
            .iter()
            .any(|(_, r)| r.is_live() && r.project_id == project_id && r.name == name))
    }
}

#[async_trait]
impl CatalogStorage for InMemoryStorage {
    async fn insert_provider(&self, provider: CloudProvider) -> Result<CloudProvider, StorageError> {
        let _lane = self.write_lane.lock().await;
        let guard = self.providers.pin();
        if guard.get(&provider.id).is_some() {
            return Err(StorageError::already_exists("cloudprovider", &provider.id));
        }
        guard.insert(provider.id.clone(), provider.clone());
        Ok(provider)
    }

    async fn get_provider(&self, id: &str) -> Result<Option<CloudProvider>, StorageError> {
        Ok(self.providers.pin().get(id).cloned())
    }

    async fn insert_region(&self, region: CloudRegion) -> Result<CloudRegion, StorageError> {
        let _lane = self.write_lane.lock().await;
        let guard = self.regions.pin();
        if guard.get(&region.id).is_some() {
            return Err(StorageError::already_exists("cloudregion", &region.id));
        }
        guard.insert(region.id.clone(), region.clone());
        Ok(region)
    }

    async fn get_region(&self, id: &str) -> Result<Option<CloudRegion>, StorageError> {
        Ok(self.regions.pin().get(id).cloned())
    }

    async fn insert_listener(
        &self,
        listener: LoadbalancerListener,
    ) -> Result<LoadbalancerListener, StorageError> {
        let _lane = self.write_lane.lock().await;
        let guard = self.listeners.pin();
        if guard.get(&listener.id).is_some() {
            return Err(StorageError::already_exists(
                "loadbalancerlistener",
                &listener.id,
            ));
        }
        guard.insert(listener.id.clone(), listener.clone());
        Ok(listener)
    }

    async fn get_listener(&self, id: &str) -> Result<Option<LoadbalancerListener>, StorageError> {
        Ok(self.listeners.pin().get(id).cloned())
    }

    async fn find_listener_by_external_id(
        &self,
        provider_id: &str,
        external_id: &str,
    ) -> Result<Option<LoadbalancerListener>, StorageError> {
        let guard = self.listeners.pin();
        Ok(guard
            .iter()
            .map(|(_, l)| l)
            .find(|l| {
                !l.pending_deleted && l.provider_id == provider_id && l.external_id == external_id
            })
            .cloned())
    }

    async fn count_listeners_referencing(
        &self,
        cached_acl_id: &str,
    ) -> Result<usize, StorageError> {
        self.take_fault(FaultOp::CountListeners)?;
        let guard = self.listeners.pin();
        Ok(guard
            .iter()
            .filter(|(_, l)| !l.pending_deleted && l.acl_id.as_deref() == Some(cached_acl_id))
            .count())
    }

    async fn mark_listener_pending_deleted(&self, id: &str) -> Result<(), StorageError> {
        let _lane = self.write_lane.lock().await;
        let guard = self.listeners.pin();
        let mut listener = guard
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("loadbalancerlistener", id))?;
        listener.pending_deleted = true;
        guard.insert(listener.id.clone(), listener);
        Ok(())
    }
}

impl AclStorage for InMemoryStorage {
    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
