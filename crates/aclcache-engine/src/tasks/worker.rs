//! Task worker: realizes lifecycle tasks against the cloud endpoint.
//!
//! Each task runs under the object lock of its record. On success the record
//! moves to the kind's success status, on failure to its failed status.

use std::sync::Arc;

use aclcache_core::CacheStatus;
use aclcache_storage::{
    AclStorage, CACHED_ACL_KEYWORD, CANONICAL_ACL_KEYWORD, CachedAclRecord, CachedAclStorage,
    CanonicalAclStorage, CatalogStorage, CloudProvider, CloudRegion, DynStorage, StorageError,
};
use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::{TaskError, TaskKind, TaskRequest};
use crate::cloud::{DynCloudDriver, RemoteAclRequest};
use crate::error::Result;
use crate::lockman::LockManager;

pub struct TaskWorker {
    storage: DynStorage,
    driver: DynCloudDriver,
    locks: LockManager,
}

impl TaskWorker {
    pub fn new(storage: DynStorage, driver: DynCloudDriver, locks: LockManager) -> Self {
        Self {
            storage,
            driver,
            locks,
        }
    }

    /// Runs `workers` consumer loops until every dispatcher is dropped.
    pub fn spawn(self, receiver: mpsc::Receiver<TaskRequest>, workers: usize) -> JoinHandle<()> {
        let worker = Arc::new(self);
        let receiver = Arc::new(Mutex::new(receiver));
        tokio::spawn(async move {
            let mut loops = JoinSet::new();
            for slot in 0..workers.max(1) {
                let worker = worker.clone();
                let receiver = receiver.clone();
                loops.spawn(async move {
                    loop {
                        let next = receiver.lock().await.recv().await;
                        let Some(task) = next else { break };
                        let _ = worker.execute(&task).await;
                    }
                    debug!(worker = slot, "Task worker stopped");
                });
            }
            while loops.join_next().await.is_some() {}
        })
    }

    /// Executes every task already queued and returns how many ran.
    pub async fn drain(&self, receiver: &mut mpsc::Receiver<TaskRequest>) -> usize {
        let mut ran = 0;
        while let Ok(task) = receiver.try_recv() {
            let _ = self.execute(&task).await;
            ran += 1;
        }
        ran
    }

    /// Executes one task and returns the record's resulting status.
    ///
    /// Every failure is logged. Failures of the task body also leave the record
    /// in the kind's failed status.
    pub async fn execute(&self, task: &TaskRequest) -> Result<CacheStatus> {
        let _guard = self
            .locks
            .lock_object(CACHED_ACL_KEYWORD, &task.record_id)
            .await;

        let record = match self.load_record(&task.record_id).await {
            Ok(record) => record,
            Err(err) => {
                warn!(
                    task = %task.kind,
                    task_id = %task.task_id,
                    record_id = %task.record_id,
                    error = %err,
                    "Task record could not be loaded"
                );
                return Err(err);
            }
        };

        let outcome = match task.kind {
            TaskKind::Create => self.run_create(&record).await,
            TaskKind::Sync => self.run_sync(&record).await,
            TaskKind::Delete => self.run_delete(&record, task.params.purge).await,
        };

        match outcome {
            Ok(status) => {
                info!(
                    task = %task.kind,
                    task_id = %task.task_id,
                    record_id = %record.id,
                    status = %status,
                    "Task completed"
                );
                Ok(status)
            }
            Err(err) => {
                warn!(
                    task = %task.kind,
                    task_id = %task.task_id,
                    record_id = %record.id,
                    error = %err,
                    "Task failed"
                );
                self.mark_failed(&record.id, task.kind).await;
                Err(err)
            }
        }
    }

    async fn run_create(&self, record: &CachedAclRecord) -> Result<CacheStatus> {
        ensure_live(record)?;
        let external_id = if record.external_id.is_empty() {
            let (provider, region) = self.load_scope(record).await?;
            let request = self.build_request(record).await?;
            self.driver.create_acl(&provider, &region, &request).await?
        } else {
            record.external_id.clone()
        };

        let (updated, _) = self
            .storage
            .update_cached_acl_with_lock(
                &record.id,
                Box::new(move |r| {
                    r.external_id = external_id;
                    advance(r, TaskKind::Create.in_progress_status(), TaskKind::Create.success_status())
                }),
            )
            .await?;
        Ok(updated.status)
    }

    async fn run_sync(&self, record: &CachedAclRecord) -> Result<CacheStatus> {
        ensure_live(record)?;
        if record.external_id.is_empty() {
            return Err(TaskError::invalid_record(&record.id, "not yet created remotely").into());
        }
        let (provider, region) = self.load_scope(record).await?;
        let request = self.build_request(record).await?;
        self.driver
            .update_acl(&provider, &region, &record.external_id, &request)
            .await?;

        self.finish(&record.id, TaskKind::Sync).await
    }

    async fn run_delete(&self, record: &CachedAclRecord, purge: bool) -> Result<CacheStatus> {
        if record.status == CacheStatus::Deleted {
            return Ok(CacheStatus::Deleted);
        }
        if !purge && !record.external_id.is_empty() {
            let (provider, region) = self.load_scope(record).await?;
            match self
                .driver
                .delete_acl(&provider, &region, &record.external_id)
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    debug!(record_id = %record.id, "Remote acl already gone");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let (updated, _) = self
            .storage
            .update_cached_acl_with_lock(
                &record.id,
                Box::new(|r| {
                    r.mark_pending_deleted();
                    advance(r, TaskKind::Delete.in_progress_status(), TaskKind::Delete.success_status())
                }),
            )
            .await?;
        Ok(updated.status)
    }

    async fn finish(&self, id: &str, kind: TaskKind) -> Result<CacheStatus> {
        let (updated, _) = self
            .storage
            .update_cached_acl_with_lock(
                id,
                Box::new(move |r| advance(r, kind.in_progress_status(), kind.success_status())),
            )
            .await?;
        Ok(updated.status)
    }

    async fn mark_failed(&self, id: &str, kind: TaskKind) {
        let result = self
            .storage
            .update_cached_acl_with_lock(
                id,
                Box::new(move |r| advance(r, kind.in_progress_status(), kind.failed_status())),
            )
            .await;
        if let Err(e) = result {
            warn!(record_id = %id, task = %kind, error = %e, "Failed to record task failure");
        }
    }

    async fn load_record(&self, id: &str) -> Result<CachedAclRecord> {
        Ok(self
            .storage
            .get_cached_acl(id)
            .await?
            .ok_or_else(|| StorageError::not_found(CACHED_ACL_KEYWORD, id))?)
    }

    async fn load_scope(
        &self,
        record: &CachedAclRecord,
    ) -> Result<(CloudProvider, CloudRegion)> {
        let provider = self
            .storage
            .get_provider(&record.provider_id)
            .await?
            .ok_or_else(|| StorageError::not_found("cloudprovider", &record.provider_id))?;
        let region = self
            .storage
            .get_region(&record.region_id)
            .await?
            .ok_or_else(|| StorageError::not_found("cloudregion", &record.region_id))?;
        Ok((provider, region))
    }

    async fn build_request(&self, record: &CachedAclRecord) -> Result<RemoteAclRequest> {
        let canonical = self
            .storage
            .get_canonical_acl(&record.canonical_acl_id)
            .await?
            .ok_or_else(|| StorageError::not_found(CANONICAL_ACL_KEYWORD, &record.canonical_acl_id))?;
        let listener_external_id = match &record.listener_id {
            Some(id) => self.storage.get_listener(id).await?.map(|l| l.external_id),
            None => None,
        };
        Ok(RemoteAclRequest {
            name: record.name.clone(),
            entries: canonical.entries().clone(),
            listener_external_id,
        })
    }
}

impl std::fmt::Debug for TaskWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskWorker")
            .field("backend", &self.storage.backend_name())
            .finish()
    }
}

fn ensure_live(record: &CachedAclRecord) -> Result<()> {
    if record.pending_deleted {
        return Err(TaskError::invalid_record(&record.id, "record is pending deleted").into());
    }
    Ok(())
}

/// Moves through `through` (unless already there) and on to `to`.
fn advance(
    record: &mut CachedAclRecord,
    through: CacheStatus,
    to: CacheStatus,
) -> std::result::Result<(), StorageError> {
    if record.status == to {
        return Ok(());
    }
    if record.status != through {
        record.set_status(through)?;
    }
    record.set_status(to)?;
    Ok(())
}
