//! Bounded task queue in front of the worker.

use aclcache_storage::CachedAclRecord;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error};

use super::{TaskError, TaskHandle, TaskKind, TaskParams, TaskRequest};
use crate::auth::UserCredential;

/// Publishes task requests without waiting on the worker.
///
/// Submission never blocks; a full queue is reported as
/// [`TaskError::QueueFull`].
#[derive(Debug, Clone)]
pub struct TaskDispatcher {
    sender: mpsc::Sender<TaskRequest>,
    capacity: usize,
}

impl TaskDispatcher {
    /// Creates a dispatcher and the receiving end for the worker.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TaskRequest>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                capacity: capacity.max(1),
            },
            receiver,
        )
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dispatch(
        &self,
        kind: TaskKind,
        record: &CachedAclRecord,
        credential: &UserCredential,
        params: TaskParams,
    ) -> Result<TaskHandle, TaskError> {
        if record.id.is_empty() {
            return Err(TaskError::invalid_record("", "record has no id"));
        }
        let request = TaskRequest::new(kind, &record.id, credential.clone(), params);
        let handle = request.handle();
        match self.sender.try_send(request) {
            Ok(()) => {
                debug!(
                    task = %kind,
                    task_id = %handle.task_id,
                    record_id = %record.id,
                    "Task dispatched"
                );
                Ok(handle)
            }
            Err(TrySendError::Full(_)) => Err(TaskError::QueueFull {
                capacity: self.capacity,
            }),
            Err(TrySendError::Closed(_)) => Err(TaskError::Closed),
        }
    }

    /// Like [`dispatch`](Self::dispatch) but logs failures instead of returning them.
    pub fn dispatch_logged(
        &self,
        kind: TaskKind,
        record: &CachedAclRecord,
        credential: &UserCredential,
        params: TaskParams,
    ) -> Option<TaskHandle> {
        match self.dispatch(kind, record, credential, params) {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!(task = %kind, record_id = %record.id, error = %e, "Failed to dispatch task");
                None
            }
        }
    }
}
