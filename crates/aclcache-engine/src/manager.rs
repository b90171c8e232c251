//! Record-level facade over the cached ACL table.
//!
//! [`CachedAclManager`] is the single entry point callers use: resolver and
//! reconciler calls plus authorized create/update/delete/purge.

use std::sync::Arc;

use aclcache_core::{AclEntries, CacheStatus};
use aclcache_storage::{
    CACHED_ACL_KEYWORD, CachedAclFilter, CachedAclRecord, CachedAclStorage, CanonicalAcl,
    CatalogStorage, CloudProvider, CloudRegion, DynStorage, LoadbalancerListener, StorageError,
};
use serde::Deserialize;
use tracing::info;

use crate::auth::{Action, Authorizer, UserCredential};
use crate::canonical::CanonicalAclStore;
use crate::cloud::{DynCloudDriver, RemoteAclDescriptor};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::lockman::LockManager;
use crate::naming::generate_name;
use crate::reconciler::{AclReconciler, validate_delete_condition};
use crate::resolver::{CacheResolver, ensure_key_free};
use crate::sync_result::SyncResult;
use crate::tasks::{TaskDispatcher, TaskKind, TaskParams};

const LISTENER_KEYWORD: &str = "loadbalancerlistener";

#[derive(Debug, Clone, Deserialize)]
pub struct CachedAclCreateInput {
    pub canonical_acl_id: String,
    pub provider_id: String,
    pub region_id: String,
    #[serde(default)]
    pub listener_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Owning project; defaults to the caller's.
    #[serde(default)]
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CachedAclUpdateInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// New entry set. Resolved to a canonical ACL, never edited in place.
    #[serde(default)]
    pub entries: Option<AclEntries>,
}

pub struct CachedAclManager {
    storage: DynStorage,
    locks: LockManager,
    canonical: CanonicalAclStore,
    resolver: CacheResolver,
    reconciler: AclReconciler,
    dispatcher: TaskDispatcher,
    authorizer: Arc<dyn Authorizer>,
    name_suffix_limit: u32,
}

impl CachedAclManager {
    pub fn new(
        storage: DynStorage,
        locks: LockManager,
        dispatcher: TaskDispatcher,
        driver: DynCloudDriver,
        authorizer: Arc<dyn Authorizer>,
        sync: &SyncConfig,
    ) -> Self {
        Self {
            canonical: CanonicalAclStore::new(storage.clone()),
            resolver: CacheResolver::new(storage.clone(), locks.clone()),
            reconciler: AclReconciler::new(
                storage.clone(),
                locks.clone(),
                dispatcher.clone(),
                driver,
                sync.name_suffix_limit,
            ),
            storage,
            locks,
            dispatcher,
            authorizer,
            name_suffix_limit: sync.name_suffix_limit,
        }
    }

    pub fn storage(&self) -> &DynStorage {
        &self.storage
    }

    pub fn canonical_store(&self) -> &CanonicalAclStore {
        &self.canonical
    }

    // ---- resolver / reconciler ----

    pub async fn get_or_create_cached_acl(
        &self,
        provider: &CloudProvider,
        region_id: &str,
        listener: Option<&LoadbalancerListener>,
        canonical: &CanonicalAcl,
    ) -> Result<CachedAclRecord> {
        self.resolver
            .get_or_create(provider, region_id, listener, canonical)
            .await
    }

    pub async fn sync_loadbalancer_acls(
        &self,
        cred: &UserCredential,
        provider: &CloudProvider,
        region: &CloudRegion,
        remote: Vec<RemoteAclDescriptor>,
    ) -> Result<SyncResult> {
        self.reconciler.sync(cred, provider, region, remote).await
    }

    pub async fn sync_from_cloud(
        &self,
        cred: &UserCredential,
        provider: &CloudProvider,
        region: &CloudRegion,
    ) -> Result<SyncResult> {
        self.reconciler.sync_from_cloud(cred, provider, region).await
    }

    // ---- reads ----

    /// Live record by id.
    pub async fn get(&self, id: &str) -> Result<CachedAclRecord> {
        self.storage
            .get_cached_acl(id)
            .await?
            .filter(CachedAclRecord::is_live)
            .ok_or_else(|| StorageError::not_found(CACHED_ACL_KEYWORD, id).into())
    }

    pub async fn list(&self, filter: &CachedAclFilter) -> Result<Vec<CachedAclRecord>> {
        Ok(self.storage.find_cached_acls(filter).await?)
    }

    /// The listener a per-listener record is bound to.
    pub async fn get_listener(&self, record: &CachedAclRecord) -> Result<LoadbalancerListener> {
        let id = record.listener_id.as_deref().unwrap_or_default();
        self.storage
            .get_listener(id)
            .await?
            .ok_or_else(|| StorageError::not_found(LISTENER_KEYWORD, id).into())
    }

    // ---- record-level mutations ----

    pub async fn create(
        &self,
        cred: &UserCredential,
        input: CachedAclCreateInput,
    ) -> Result<CachedAclRecord> {
        let owner = input
            .project_id
            .clone()
            .unwrap_or_else(|| cred.project_id.clone());
        self.authorize(cred, Action::Create, &owner)?;

        let canonical = self.canonical.get(&input.canonical_acl_id).await?;
        let provider = self
            .storage
            .get_provider(&input.provider_id)
            .await?
            .ok_or_else(|| StorageError::not_found("cloudprovider", &input.provider_id))?;
        self.storage
            .get_region(&input.region_id)
            .await?
            .ok_or_else(|| StorageError::not_found("cloudregion", &input.region_id))?;

        let listener_id = if provider.kind.is_listener_scoped() {
            let id = input
                .listener_id
                .as_deref()
                .filter(|l| !l.is_empty())
                .ok_or_else(|| {
                    StorageError::invalid_resource(format!(
                        "listener is required for {} acls",
                        provider.kind
                    ))
                })?;
            let listener = self
                .storage
                .get_listener(id)
                .await?
                .ok_or_else(|| StorageError::not_found(LISTENER_KEYWORD, id))?;
            Some(listener.id)
        } else {
            None
        };

        let _guard = self
            .locks
            .lock_class(CACHED_ACL_KEYWORD, &provider.project_id)
            .await;

        let filter = CachedAclFilter::new()
            .region(&input.region_id)
            .provider(&provider.id);
        let filter = match &listener_id {
            Some(l) => filter.listener(l),
            None => filter.canonical_acl(&canonical.id),
        };
        if self.storage.count_cached_acls(&filter).await? > 0 {
            return Err(StorageError::duplicate(
                CACHED_ACL_KEYWORD,
                format!(
                    "acl {} in region {} of provider {}",
                    canonical.id, input.region_id, provider.id
                ),
            )
            .into());
        }

        let base = input.name.as_deref().unwrap_or(&canonical.name);
        let name = generate_name(&self.storage, &owner, base, self.name_suffix_limit).await?;
        let mut record =
            CachedAclRecord::new(name, &provider.id, &input.region_id, &canonical.id, owner)
                .with_listener(listener_id);
        record.description = input.description;
        record.domain_id = cred.domain_id.clone();

        let record = self.storage.insert_cached_acl(record).await?;
        info!(record_id = %record.id, user = %cred.user_id, "Cached acl created");

        self.dispatcher
            .dispatch_logged(TaskKind::Create, &record, cred, TaskParams::default());
        Ok(record)
    }

    pub async fn update(
        &self,
        cred: &UserCredential,
        id: &str,
        input: CachedAclUpdateInput,
    ) -> Result<CachedAclRecord> {
        let current = self.get(id).await?;
        self.authorize(cred, Action::Patch, &current.project_id)?;

        let canonical_id = match &input.entries {
            Some(entries) => {
                entries.validate()?;
                let name = input.name.as_deref().unwrap_or(&current.name);
                Some(self.canonical.resolve(entries, name, cred).await?.id)
            }
            None => None,
        };

        // Moving a region-scoped record onto new content changes its uniqueness
        // key, which is only stable under the class lock.
        let repoint_key = canonical_id
            .as_deref()
            .filter(|c| *c != current.canonical_acl_id && current.listener_id.is_none());
        let _class_guard = match repoint_key {
            Some(_) => {
                let provider = self
                    .storage
                    .get_provider(&current.provider_id)
                    .await?
                    .ok_or_else(|| StorageError::not_found("cloudprovider", &current.provider_id))?;
                Some(
                    self.locks
                        .lock_class(CACHED_ACL_KEYWORD, &provider.project_id)
                        .await,
                )
            }
            None => None,
        };
        let _guard = self.locks.lock_object(CACHED_ACL_KEYWORD, id).await;

        if let Some(canonical_id) = repoint_key {
            let filter = CachedAclFilter::new()
                .region(&current.region_id)
                .provider(&current.provider_id)
                .canonical_acl(canonical_id);
            ensure_key_free(&self.storage, &filter, id, &format!("acl={canonical_id}")).await?;
        }

        if let Some(name) = input.name.as_deref().filter(|n| *n != current.name) {
            if self
                .storage
                .cached_acl_name_exists(&current.project_id, name)
                .await?
            {
                return Err(StorageError::duplicate(CACHED_ACL_KEYWORD, format!("name={name}")).into());
            }
        }

        let CachedAclUpdateInput {
            name, description, ..
        } = input;
        let (record, diff) = self
            .storage
            .update_cached_acl_with_lock(
                id,
                Box::new(move |r| {
                    if let Some(name) = name {
                        r.name = name;
                    }
                    if description.is_some() {
                        r.description = description;
                    }
                    let repointed = canonical_id.is_some_and(|c| {
                        let changed = c != r.canonical_acl_id;
                        r.canonical_acl_id = c;
                        changed
                    });
                    let renamed = r.name != current.name;
                    if (repointed || renamed) && !r.external_id.is_empty() {
                        r.set_status(CacheStatus::SyncConf)?;
                    }
                    Ok(())
                }),
            )
            .await?;

        if diff.touches("status") {
            self.dispatcher
                .dispatch_logged(TaskKind::Sync, &record, cred, TaskParams::default());
        }
        Ok(record)
    }

    pub async fn delete(&self, cred: &UserCredential, id: &str) -> Result<CachedAclRecord> {
        let current = self.get(id).await?;
        self.authorize(cred, Action::Delete, &current.project_id)?;

        let _guard = self.locks.lock_object(CACHED_ACL_KEYWORD, id).await;
        validate_delete_condition(&self.storage, id).await?;
        let record = self.set_status(id, CacheStatus::Deleting).await?;

        self.dispatcher
            .dispatch_logged(TaskKind::Delete, &record, cred, TaskParams::default());
        Ok(record)
    }

    /// Local-only deletion for records whose remote side is already gone.
    pub async fn purge(&self, cred: &UserCredential, id: &str) -> Result<CachedAclRecord> {
        let current = self.get(id).await?;
        self.authorize(cred, Action::Purge, &current.project_id)?;

        let _guard = self.locks.lock_object(CACHED_ACL_KEYWORD, id).await;
        let record = self.set_status(id, CacheStatus::Deleting).await?;

        self.dispatcher
            .dispatch_logged(TaskKind::Delete, &record, cred, TaskParams::purge());
        Ok(record)
    }

    /// Direct status changes are not allowed; status belongs to the tasks.
    pub async fn perform_status(
        &self,
        cred: &UserCredential,
        id: &str,
        _status: CacheStatus,
    ) -> Result<CachedAclRecord> {
        let current = self.get(id).await?;
        self.authorize(cred, Action::PerformStatus, &current.project_id)?;
        Ok(current)
    }

    async fn set_status(&self, id: &str, status: CacheStatus) -> Result<CachedAclRecord> {
        let (record, _) = self
            .storage
            .update_cached_acl_with_lock(
                id,
                Box::new(move |r| {
                    r.set_status(status)?;
                    Ok(())
                }),
            )
            .await?;
        Ok(record)
    }

    fn authorize(&self, cred: &UserCredential, action: Action, owner: &str) -> Result<()> {
        if self.authorizer.allow(cred, action, owner) {
            Ok(())
        } else {
            Err(SyncError::forbidden(format!(
                "{} not allowed to {action} cached acl of project {owner}",
                cred.user_id
            )))
        }
    }
}
