//! EventedStorage - A storage wrapper that writes the ops log.
//!
//! This wrapper delegates every call to an inner backend and, after a write
//! succeeds, publishes a [`RecordEvent`] describing it.
//!
//! # Example
//!
//! ```ignore
//! use aclcache_core::events::EventBroadcaster;
//! use aclcache_storage::EventedStorage;
//!
//! let broadcaster = EventBroadcaster::new_shared();
//! let storage = EventedStorage::new(InMemoryStorage::new(), broadcaster);
//!
//! // Emits a `created` event
//! storage.insert_cached_acl(record).await?;
//! ```

use std::sync::Arc;

use aclcache_core::events::{EventBroadcaster, RecordEvent, RecordEventType};
use async_trait::async_trait;
use tracing::debug;

use crate::error::StorageError;
use crate::traits::{AclStorage, CachedAclStorage, CanonicalAclStorage, CatalogStorage, RecordMutation};
use crate::types::{
    CACHED_ACL_KEYWORD, CANONICAL_ACL_KEYWORD, CachedAclFilter, CachedAclRecord, CanonicalAcl,
    CloudProvider, CloudRegion, LoadbalancerListener, RecordDiff,
};

/// A storage wrapper that emits ops-log events after successful writes.
///
/// Events are emitted **after** the write succeeds, so every event
/// corresponds to a persisted change.
pub struct EventedStorage<S: AclStorage> {
    inner: S,
    broadcaster: Arc<EventBroadcaster>,
}

impl<S: AclStorage> EventedStorage<S> {
    pub fn new(inner: S, broadcaster: Arc<EventBroadcaster>) -> Self {
        Self { inner, broadcaster }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn broadcaster(&self) -> &Arc<EventBroadcaster> {
        &self.broadcaster
    }

    fn emit(&self, event: RecordEvent) {
        if self.broadcaster.subscriber_count() == 0 {
            return;
        }
        let event_type = event.event_type;
        let record_id = event.record_id.clone();
        let count = self.broadcaster.send(event);
        debug!(
            event_type = %event_type,
            record_id = %record_id,
            subscribers = count,
            "Emitted ops-log event"
        );
    }

    /// Splits one update into status, soft-delete and plain field events.
    fn emit_update(&self, record: &CachedAclRecord, diff: &RecordDiff) {
        let mut fields = Vec::new();
        for change in &diff.0 {
            match change.field.as_str() {
                "status" => self.emit(RecordEvent::status_changed(
                    CACHED_ACL_KEYWORD,
                    &record.id,
                    change.old.as_str().unwrap_or_default(),
                    change.new.as_str().unwrap_or_default(),
                )),
                "pending_deleted" if record.pending_deleted => self.emit(RecordEvent::new(
                    RecordEventType::PendingDeleted,
                    CACHED_ACL_KEYWORD,
                    &record.id,
                    None,
                )),
                "pending_deleted_at" => {}
                _ => fields.push(change.clone()),
            }
        }
        if !fields.is_empty() {
            let detail = serde_json::to_value(RecordDiff(fields)).ok();
            self.emit(RecordEvent::new(
                RecordEventType::Updated,
                CACHED_ACL_KEYWORD,
                &record.id,
                detail,
            ));
        }
    }
}

#[async_trait]
impl<S: AclStorage> CanonicalAclStorage for EventedStorage<S> {
    async fn insert_canonical_acl(&self, acl: CanonicalAcl) -> Result<CanonicalAcl, StorageError> {
        let acl = self.inner.insert_canonical_acl(acl).await?;
        self.emit(RecordEvent::created(CANONICAL_ACL_KEYWORD, &acl.id));
        Ok(acl)
    }

    async fn get_canonical_acl(&self, id: &str) -> Result<Option<CanonicalAcl>, StorageError> {
        self.inner.get_canonical_acl(id).await
    }

    async fn find_canonical_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<CanonicalAcl>, StorageError> {
        self.inner.find_canonical_by_fingerprint(fingerprint).await
    }

    async fn count_canonical_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<usize, StorageError> {
        self.inner.count_canonical_by_fingerprint(fingerprint).await
    }

    async fn count_canonical_acls(&self) -> Result<usize, StorageError> {
        self.inner.count_canonical_acls().await
    }
}

#[async_trait]
impl<S: AclStorage> CachedAclStorage for EventedStorage<S> {
    async fn insert_cached_acl(
        &self,
        record: CachedAclRecord,
    ) -> Result<CachedAclRecord, StorageError> {
        let record = self.inner.insert_cached_acl(record).await?;
        self.emit(RecordEvent::created(CACHED_ACL_KEYWORD, &record.id));
        Ok(record)
    }

    async fn get_cached_acl(&self, id: &str) -> Result<Option<CachedAclRecord>, StorageError> {
        self.inner.get_cached_acl(id).await
    }

    async fn find_cached_acls(
        &self,
        filter: &CachedAclFilter,
    ) -> Result<Vec<CachedAclRecord>, StorageError> {
        self.inner.find_cached_acls(filter).await
    }

    async fn count_cached_acls(&self, filter: &CachedAclFilter) -> Result<usize, StorageError> {
        self.inner.count_cached_acls(filter).await
    }

    async fn update_cached_acl_with_lock(
        &self,
        id: &str,
        mutate: RecordMutation<'_>,
    ) -> Result<(CachedAclRecord, RecordDiff), StorageError> {
        let (record, diff) = self.inner.update_cached_acl_with_lock(id, mutate).await?;
        self.emit_update(&record, &diff);
        Ok((record, diff))
    }

    async fn cached_acl_name_exists(
        &self,
        project_id: &str,
        name: &str,
    ) -> Result<bool, StorageError> {
        self.inner.cached_acl_name_exists(project_id, name).await
    }
}

#[async_trait]
impl<S: AclStorage> CatalogStorage for EventedStorage<S> {
    async fn insert_provider(&self, provider: CloudProvider) -> Result<CloudProvider, StorageError> {
        self.inner.insert_provider(provider).await
    }

    async fn get_provider(&self, id: &str) -> Result<Option<CloudProvider>, StorageError> {
        self.inner.get_provider(id).await
    }

    async fn insert_region(&self, region: CloudRegion) -> Result<CloudRegion, StorageError> {
        self.inner.insert_region(region).await
    }

    async fn get_region(&self, id: &str) -> Result<Option<CloudRegion>, StorageError> {
        self.inner.get_region(id).await
    }

    async fn insert_listener(
        &self,
        listener: LoadbalancerListener,
    ) -> Result<LoadbalancerListener, StorageError> {
        self.inner.insert_listener(listener).await
    }

    async fn get_listener(&self, id: &str) -> Result<Option<LoadbalancerListener>, StorageError> {
        self.inner.get_listener(id).await
    }

    async fn find_listener_by_external_id(
        &self,
        provider_id: &str,
        external_id: &str,
    ) -> Result<Option<LoadbalancerListener>, StorageError> {
        self.inner
            .find_listener_by_external_id(provider_id, external_id)
            .await
    }

    async fn count_listeners_referencing(
        &self,
        cached_acl_id: &str,
    ) -> Result<usize, StorageError> {
        self.inner.count_listeners_referencing(cached_acl_id).await
    }

    async fn mark_listener_pending_deleted(&self, id: &str) -> Result<(), StorageError> {
        self.inner.mark_listener_pending_deleted(id).await
    }
}

impl<S: AclStorage> AclStorage for EventedStorage<S> {
    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}
