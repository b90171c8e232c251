//! Lifecycle tasks for cached ACL records.
//!
//! The reconciler and the record manager publish a [`TaskRequest`] through
//! the [`TaskDispatcher`]; a [`TaskWorker`] consumes it out of band and owns
//! the resulting status transitions.

pub mod dispatcher;
pub mod worker;

use aclcache_core::{CacheStatus, generate_id};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::auth::UserCredential;

pub use dispatcher::TaskDispatcher;
pub use worker::TaskWorker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Create,
    Sync,
    Delete,
}

impl TaskKind {
    pub fn task_name(&self) -> &'static str {
        match self {
            Self::Create => "LoadbalancerAclCreateTask",
            Self::Sync => "LoadbalancerAclSyncTask",
            Self::Delete => "LoadbalancerAclDeleteTask",
        }
    }

    /// Status the record passes through while the task runs.
    pub fn in_progress_status(&self) -> CacheStatus {
        match self {
            Self::Create => CacheStatus::Creating,
            Self::Sync => CacheStatus::SyncConf,
            Self::Delete => CacheStatus::Deleting,
        }
    }

    pub fn success_status(&self) -> CacheStatus {
        match self {
            Self::Create | Self::Sync => CacheStatus::Running,
            Self::Delete => CacheStatus::Deleted,
        }
    }

    pub fn failed_status(&self) -> CacheStatus {
        match self {
            Self::Create => CacheStatus::CreateFailed,
            Self::Sync => CacheStatus::SyncConfFailed,
            Self::Delete => CacheStatus::DeleteFailed,
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.task_name())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskParams {
    /// Delete only: finalize locally without calling the cloud endpoint.
    #[serde(default)]
    pub purge: bool,
}

impl TaskParams {
    pub fn purge() -> Self {
        Self { purge: true }
    }
}

/// Work item carried from the dispatcher to the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task_id: String,
    pub kind: TaskKind,
    pub record_id: String,
    pub credential: UserCredential,
    #[serde(default)]
    pub params: TaskParams,
    #[serde(with = "time::serde::rfc3339")]
    pub submitted_at: OffsetDateTime,
}

impl TaskRequest {
    pub fn new(
        kind: TaskKind,
        record_id: impl Into<String>,
        credential: UserCredential,
        params: TaskParams,
    ) -> Self {
        Self {
            task_id: generate_id(),
            kind,
            record_id: record_id.into(),
            credential,
            params,
            submitted_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn handle(&self) -> TaskHandle {
        TaskHandle {
            task_id: self.task_id.clone(),
            kind: self.kind,
            record_id: self.record_id.clone(),
        }
    }
}

/// Returned to the submitter; the task itself is not awaited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskHandle {
    pub task_id: String,
    pub kind: TaskKind,
    pub record_id: String,
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Task queue is closed")]
    Closed,

    #[error("Cannot run task on record {record_id}: {reason}")]
    InvalidRecord { record_id: String, reason: String },
}

impl TaskError {
    pub fn invalid_record(record_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            record_id: record_id.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_statuses_are_lifecycle_edges() {
        for kind in [TaskKind::Create, TaskKind::Sync, TaskKind::Delete] {
            let through = kind.in_progress_status();
            assert!(through.can_transition_to(kind.success_status()), "{kind}");
            assert!(through.can_transition_to(kind.failed_status()), "{kind}");
        }
    }

    #[test]
    fn test_request_handle() {
        let req = TaskRequest::new(
            TaskKind::Delete,
            "rec-1",
            UserCredential::new("u", "p"),
            TaskParams::purge(),
        );
        let handle = req.handle();
        assert_eq!(handle.task_id, req.task_id);
        assert_eq!(handle.kind, TaskKind::Delete);
        assert!(req.params.purge);
    }
}
