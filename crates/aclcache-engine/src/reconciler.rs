//! Reconciliation of cached ACL records against a cloud listing.
//!
//! One pass covers a (provider, region) scope and runs under the provider's
//! class lock. Local records are partitioned against the remote descriptors:
//!
//! - removed: delete-validated, then soft-deleted with a purge Delete task,
//!   or left in `Unknown` when still referenced
//! - common: name, listener binding, metadata and owner refreshed in place;
//!   a listener already held by another live record is an update error
//! - added: resolved through the canonical store and the cache resolver,
//!   then handed a Create task
//!
//! Per-item failures are counted in the [`SyncResult`]; only the class lock,
//! the bulk load and the partition itself abort a pass.

use aclcache_core::CacheStatus;
use aclcache_storage::{
    CACHED_ACL_KEYWORD, CachedAclFilter, CachedAclRecord, CachedAclStorage, CatalogStorage,
    CloudProvider, CloudRegion, DynStorage, StorageError,
};
use tracing::{debug, error, info, warn};

use crate::auth::UserCredential;
use crate::canonical::CanonicalAclStore;
use crate::cloud::{DynCloudDriver, RemoteAclDescriptor};
use crate::differ::{self, ExternalKeyed};
use crate::error::Result;
use crate::lockman::{ClassLockGuard, LockManager};
use crate::naming::generate_name;
use crate::resolver::{CacheResolver, RecordTemplate, ensure_key_free};
use crate::sync_result::SyncResult;
use crate::tasks::{TaskDispatcher, TaskHandle, TaskKind, TaskParams};

const LISTENER_KEYWORD: &str = "loadbalancerlistener";

impl ExternalKeyed for CachedAclRecord {
    fn external_key(&self) -> &str {
        &self.external_id
    }
}

/// Fails with `ResourceBusy` while a live listener still points at the record.
pub async fn validate_delete_condition(storage: &DynStorage, record_id: &str) -> Result<()> {
    let refs = storage.count_listeners_referencing(record_id).await?;
    if refs > 0 {
        return Err(StorageError::resource_busy(format!(
            "acl {record_id} is still referred to by {refs} loadbalancer listener(s)"
        ))
        .into());
    }
    Ok(())
}

#[derive(Clone)]
pub struct AclReconciler {
    storage: DynStorage,
    locks: LockManager,
    canonical: CanonicalAclStore,
    resolver: CacheResolver,
    dispatcher: TaskDispatcher,
    driver: DynCloudDriver,
    name_suffix_limit: u32,
}

impl AclReconciler {
    pub fn new(
        storage: DynStorage,
        locks: LockManager,
        dispatcher: TaskDispatcher,
        driver: DynCloudDriver,
        name_suffix_limit: u32,
    ) -> Self {
        Self {
            canonical: CanonicalAclStore::new(storage.clone()),
            resolver: CacheResolver::new(storage.clone(), locks.clone()),
            storage,
            locks,
            dispatcher,
            driver,
            name_suffix_limit,
        }
    }

    /// Lists the scope from the cloud endpoint and reconciles against it.
    ///
    /// A listing failure aborts the pass.
    pub async fn sync_from_cloud(
        &self,
        cred: &UserCredential,
        provider: &CloudProvider,
        region: &CloudRegion,
    ) -> Result<SyncResult> {
        let remote = self.driver.list_acls(provider, region).await?;
        self.sync(cred, provider, region, remote).await
    }

    /// Runs one reconciliation pass for (`provider`, `region`).
    pub async fn sync(
        &self,
        cred: &UserCredential,
        provider: &CloudProvider,
        region: &CloudRegion,
        remote: Vec<RemoteAclDescriptor>,
    ) -> Result<SyncResult> {
        let guard = self
            .locks
            .lock_class(CACHED_ACL_KEYWORD, &provider.project_id)
            .await;

        let filter = CachedAclFilter::new().region(&region.id).provider(&provider.id);
        let local = self.storage.find_cached_acls(&filter).await?;
        // Records still waiting on their Create task have no remote identity yet.
        let (local, pending): (Vec<_>, Vec<_>) =
            local.into_iter().partition(|r| !r.external_id.is_empty());
        if !pending.is_empty() {
            debug!(count = pending.len(), "Skipping records not yet created remotely");
        }

        let diff = differ::partition(local, remote)?;
        let mut result = SyncResult::new();

        for record in diff.removed {
            match self.sync_remove(cred, &record).await {
                Ok(()) => result.delete(),
                Err(e) => {
                    warn!(record_id = %record.id, error = %e, "Failed to remove cached acl");
                    result.delete_error(&record.id, &e);
                }
            }
        }

        for (record, descriptor) in diff.common {
            match self.sync_update(provider, &record, &descriptor).await {
                Ok(()) => result.update(),
                Err(e) => {
                    warn!(record_id = %record.id, error = %e, "Failed to update cached acl");
                    result.update_error(&record.id, &e);
                }
            }
        }

        for descriptor in diff.added {
            match self
                .sync_add(&guard, cred, provider, region, &descriptor)
                .await
            {
                Ok(()) => result.add(),
                Err(e) => {
                    warn!(global_id = %descriptor.global_id, error = %e, "Failed to add cached acl");
                    result.add_error(&descriptor.global_id, &e);
                }
            }
        }

        info!(
            provider_id = %provider.id,
            region_id = %region.id,
            result = %result,
            "Loadbalancer acls synced"
        );
        Ok(result)
    }

    async fn sync_remove(&self, cred: &UserCredential, record: &CachedAclRecord) -> Result<()> {
        let _guard = self
            .locks
            .lock_object(CACHED_ACL_KEYWORD, &record.id)
            .await;

        match validate_delete_condition(&self.storage, &record.id).await {
            Ok(()) => {}
            Err(busy) if busy.is_resource_busy() => {
                self.storage
                    .update_cached_acl_with_lock(
                        &record.id,
                        Box::new(|r| {
                            r.set_status(CacheStatus::Unknown)?;
                            Ok(())
                        }),
                    )
                    .await?;
                return Err(busy);
            }
            Err(e) => return Err(e),
        }

        let (deleted, _) = self
            .storage
            .update_cached_acl_with_lock(
                &record.id,
                Box::new(|r| {
                    r.set_status(CacheStatus::Deleting)?;
                    r.mark_pending_deleted();
                    Ok(())
                }),
            )
            .await?;

        self.dispatch(TaskKind::Delete, &deleted, cred, TaskParams::purge())?;
        Ok(())
    }

    async fn sync_update(
        &self,
        provider: &CloudProvider,
        record: &CachedAclRecord,
        descriptor: &RemoteAclDescriptor,
    ) -> Result<()> {
        let _guard = self
            .locks
            .lock_object(CACHED_ACL_KEYWORD, &record.id)
            .await;

        let listener_id = self.bound_listener_id(provider, descriptor).await?;
        if let Some(l) = listener_id
            .as_deref()
            .filter(|l| record.listener_id.as_deref() != Some(*l))
        {
            let filter = CachedAclFilter::new()
                .region(&record.region_id)
                .provider(&provider.id)
                .listener(l);
            ensure_key_free(&self.storage, &filter, &record.id, &format!("listener={l}")).await?;
        }
        let name = provider
            .kind
            .syncs_acl_name()
            .then(|| descriptor.name.clone())
            .filter(|n| !n.is_empty());
        let metadata = descriptor.metadata.clone();
        let project_id = provider.project_id.clone();

        self.storage
            .update_cached_acl_with_lock(
                &record.id,
                Box::new(move |r| {
                    if let Some(name) = name {
                        r.name = name;
                    }
                    if let Some(listener_id) = listener_id {
                        r.listener_id = Some(listener_id);
                    }
                    r.metadata = metadata;
                    r.project_id = project_id;
                    // Listed again after an earlier blocked removal.
                    if r.status == CacheStatus::Unknown {
                        r.set_status(CacheStatus::Running)?;
                    }
                    Ok(())
                }),
            )
            .await?;
        Ok(())
    }

    async fn sync_add(
        &self,
        guard: &ClassLockGuard,
        cred: &UserCredential,
        provider: &CloudProvider,
        region: &CloudRegion,
        descriptor: &RemoteAclDescriptor,
    ) -> Result<()> {
        let listener_id = self.bound_listener_id(provider, descriptor).await?;
        let name = generate_name(
            &self.storage,
            &provider.project_id,
            &descriptor.name,
            self.name_suffix_limit,
        )
        .await?;
        let canonical = self.canonical.resolve(&descriptor.entries, &name, cred).await?;

        let template = RecordTemplate {
            name: Some(name),
            external_id: descriptor.global_id.clone(),
            metadata: descriptor.metadata.clone(),
            project_id: Some(provider.project_id.clone()),
        };
        let resolved = self
            .resolver
            .get_or_create_locked(
                guard,
                provider,
                &region.id,
                listener_id.as_deref(),
                &canonical,
                template,
            )
            .await?;

        let record = if resolved.created {
            resolved.record
        } else {
            self.adopt(resolved.record, descriptor).await?
        };

        self.dispatch(TaskKind::Create, &record, cred, TaskParams::default())?;
        Ok(())
    }

    /// Binds a remote ACL to a local record that has no remote identity yet.
    async fn adopt(
        &self,
        existing: CachedAclRecord,
        descriptor: &RemoteAclDescriptor,
    ) -> Result<CachedAclRecord> {
        if existing.external_id == descriptor.global_id {
            return Ok(existing);
        }
        if !existing.external_id.is_empty() {
            return Err(StorageError::duplicate(
                CACHED_ACL_KEYWORD,
                format!(
                    "remote acl {} resolves to record {} already bound to {}",
                    descriptor.global_id, existing.id, existing.external_id
                ),
            )
            .into());
        }

        let _guard = self
            .locks
            .lock_object(CACHED_ACL_KEYWORD, &existing.id)
            .await;
        let external_id = descriptor.global_id.clone();
        let metadata = descriptor.metadata.clone();
        let (record, _) = self
            .storage
            .update_cached_acl_with_lock(
                &existing.id,
                Box::new(move |r| {
                    r.external_id = external_id;
                    r.metadata = metadata;
                    Ok(())
                }),
            )
            .await?;
        debug!(record_id = %record.id, external_id = %record.external_id, "Adopted remote acl");
        Ok(record)
    }

    /// Local listener id for a per-listener provider's descriptor.
    async fn bound_listener_id(
        &self,
        provider: &CloudProvider,
        descriptor: &RemoteAclDescriptor,
    ) -> Result<Option<String>> {
        if !provider.kind.is_listener_scoped() {
            return Ok(None);
        }
        let Some(external) = descriptor.bound_listener() else {
            return Ok(None);
        };
        let listener = self
            .storage
            .find_listener_by_external_id(&provider.id, external)
            .await?
            .ok_or_else(|| StorageError::not_found(LISTENER_KEYWORD, external))?;
        Ok(Some(listener.id))
    }

    fn dispatch(
        &self,
        kind: TaskKind,
        record: &CachedAclRecord,
        cred: &UserCredential,
        params: TaskParams,
    ) -> Result<TaskHandle> {
        self.dispatcher
            .dispatch(kind, record, cred, params)
            .map_err(|e| {
                error!(task = %kind, record_id = %record.id, error = %e, "Failed to dispatch task");
                e.into()
            })
    }
}
