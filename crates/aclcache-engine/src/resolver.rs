//! Idempotent lookup-or-create of cached ACL records.
//!
//! The lookup key is (region, provider, listener) when the provider binds
//! ACLs per listener and a listener is given, otherwise (region, provider,
//! canonical acl). Lookup and insert both run under the owning project's
//! class lock.

use std::collections::BTreeMap;

use aclcache_storage::{
    CACHED_ACL_KEYWORD, CachedAclFilter, CachedAclRecord, CachedAclStorage, CanonicalAcl,
    CloudProvider, DynStorage, LoadbalancerListener, StorageError,
};
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::lockman::{ClassLockGuard, LockManager};

/// Attributes applied only when the resolver inserts a new record.
#[derive(Debug, Clone, Default)]
pub struct RecordTemplate {
    /// Defaults to the canonical ACL's name.
    pub name: Option<String>,
    pub external_id: String,
    pub metadata: BTreeMap<String, String>,
    /// Defaults to the provider's project.
    pub project_id: Option<String>,
}

/// A resolved record and whether this call inserted it.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub record: CachedAclRecord,
    pub created: bool,
}

/// Fails with `Duplicate` if a live record other than `owner_id` matches `filter`.
///
/// Used before moving an existing record onto a new uniqueness key.
pub async fn ensure_key_free(
    storage: &DynStorage,
    filter: &CachedAclFilter,
    owner_id: &str,
    key: &str,
) -> Result<()> {
    let taken = storage
        .find_cached_acls(filter)
        .await?
        .into_iter()
        .find(|r| r.id != owner_id);
    match taken {
        Some(other) => Err(StorageError::duplicate(
            CACHED_ACL_KEYWORD,
            format!("{key} (held by record {})", other.id),
        )
        .into()),
        None => Ok(()),
    }
}

#[derive(Clone)]
pub struct CacheResolver {
    storage: DynStorage,
    locks: LockManager,
}

impl CacheResolver {
    pub fn new(storage: DynStorage, locks: LockManager) -> Self {
        Self { storage, locks }
    }

    /// Returns the record for the key, creating or re-pointing it as needed.
    ///
    /// Acquires the class lock of `provider.project_id` for the whole call.
    pub async fn get_or_create(
        &self,
        provider: &CloudProvider,
        region_id: &str,
        listener: Option<&LoadbalancerListener>,
        canonical: &CanonicalAcl,
    ) -> Result<CachedAclRecord> {
        let guard = self
            .locks
            .lock_class(CACHED_ACL_KEYWORD, &provider.project_id)
            .await;

        let listener = listener.filter(|_| provider.kind.is_listener_scoped());
        let template = RecordTemplate {
            project_id: listener.map(|l| l.project_id.clone()),
            ..RecordTemplate::default()
        };
        let resolved = self
            .get_or_create_locked(
                &guard,
                provider,
                region_id,
                listener.map(|l| l.id.as_str()),
                canonical,
                template,
            )
            .await?;
        Ok(resolved.record)
    }

    /// Same as [`get_or_create`](Self::get_or_create) for callers that already
    /// hold the class lock.
    ///
    /// A match already bound to a different external id than
    /// `template.external_id` is returned as found, without re-pointing.
    ///
    /// # Errors
    ///
    /// - `SyncError::LockScope` if `guard` is for another project.
    /// - `StorageError::Duplicate` if more than one live record matches the key.
    pub async fn get_or_create_locked(
        &self,
        guard: &ClassLockGuard,
        provider: &CloudProvider,
        region_id: &str,
        listener_id: Option<&str>,
        canonical: &CanonicalAcl,
        template: RecordTemplate,
    ) -> Result<Resolved> {
        if !guard.covers(CACHED_ACL_KEYWORD, &provider.project_id) {
            return Err(SyncError::LockScope {
                held: guard.project_id().to_string(),
                wanted: provider.project_id.clone(),
            });
        }

        let listener_id = listener_id.filter(|l| !l.is_empty());
        let filter = CachedAclFilter::new().region(region_id).provider(&provider.id);
        let filter = match listener_id {
            Some(l) => filter.listener(l),
            None => filter.canonical_acl(&canonical.id),
        };

        let mut matches = self.storage.find_cached_acls(&filter).await?;
        match matches.len() {
            0 => {
                let record = self
                    .insert(provider, region_id, listener_id, canonical, template)
                    .await?;
                Ok(Resolved {
                    record,
                    created: true,
                })
            }
            1 => {
                let existing = matches.remove(0);
                // A match bound to another remote acl is left for the caller to reject.
                let foreign = !existing.external_id.is_empty()
                    && !template.external_id.is_empty()
                    && existing.external_id != template.external_id;
                let record = if foreign || existing.canonical_acl_id == canonical.id {
                    existing
                } else {
                    self.repoint(existing, canonical).await?
                };
                Ok(Resolved {
                    record,
                    created: false,
                })
            }
            n => Err(StorageError::duplicate(
                CACHED_ACL_KEYWORD,
                format!(
                    "region={region_id} provider={} {} ({n} live records)",
                    provider.id,
                    match listener_id {
                        Some(l) => format!("listener={l}"),
                        None => format!("acl={}", canonical.id),
                    }
                ),
            )
            .into()),
        }
    }

    async fn insert(
        &self,
        provider: &CloudProvider,
        region_id: &str,
        listener_id: Option<&str>,
        canonical: &CanonicalAcl,
        template: RecordTemplate,
    ) -> Result<CachedAclRecord> {
        let name = template.name.unwrap_or_else(|| canonical.name.clone());
        let project_id = template
            .project_id
            .unwrap_or_else(|| provider.project_id.clone());
        let mut record = CachedAclRecord::new(name, &provider.id, region_id, &canonical.id, project_id)
            .with_listener(listener_id.map(str::to_string))
            .with_external_id(template.external_id);
        record.domain_id = provider.domain_id.clone();
        record.metadata = template.metadata;

        let record = self.storage.insert_cached_acl(record).await?;
        info!(
            record_id = %record.id,
            canonical_id = %canonical.id,
            region_id = %region_id,
            provider_id = %provider.id,
            "Cached acl created"
        );
        Ok(record)
    }

    async fn repoint(
        &self,
        existing: CachedAclRecord,
        canonical: &CanonicalAcl,
    ) -> Result<CachedAclRecord> {
        let _guard = self
            .locks
            .lock_object(CACHED_ACL_KEYWORD, &existing.id)
            .await;
        let canonical_id = canonical.id.clone();
        let name = canonical.name.clone();
        let (record, _) = self
            .storage
            .update_cached_acl_with_lock(
                &existing.id,
                Box::new(move |r| {
                    r.canonical_acl_id = canonical_id;
                    r.name = name;
                    Ok(())
                }),
            )
            .await?;
        debug!(
            record_id = %record.id,
            from = %existing.canonical_acl_id,
            to = %record.canonical_acl_id,
            "Cached acl re-pointed"
        );
        Ok(record)
    }
}
