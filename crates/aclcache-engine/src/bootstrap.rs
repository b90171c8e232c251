//! Wiring of storage, locks, dispatcher, worker and manager.

use std::sync::Arc;

use aclcache_storage::DynStorage;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::auth::{Authorizer, DefaultAuthorizer};
use crate::cloud::DynCloudDriver;
use crate::config::AppConfig;
use crate::lockman::LockManager;
use crate::manager::CachedAclManager;
use crate::tasks::{TaskDispatcher, TaskRequest, TaskWorker};

/// An assembled engine whose worker has not been started yet.
///
/// Tests drive `worker` against `tasks` by hand; the binary calls
/// [`start`](Self::start).
pub struct AclCache {
    pub manager: Arc<CachedAclManager>,
    pub worker: TaskWorker,
    pub tasks: mpsc::Receiver<TaskRequest>,
    workers: usize,
}

impl AclCache {
    pub fn assemble(storage: DynStorage, driver: DynCloudDriver, config: &AppConfig) -> Self {
        Self::assemble_with_authorizer(storage, driver, config, Arc::new(DefaultAuthorizer))
    }

    pub fn assemble_with_authorizer(
        storage: DynStorage,
        driver: DynCloudDriver,
        config: &AppConfig,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        let locks = LockManager::new();
        let (dispatcher, tasks) = TaskDispatcher::channel(config.tasks.queue_capacity);
        let worker = TaskWorker::new(storage.clone(), driver.clone(), locks.clone());
        let manager = CachedAclManager::new(
            storage,
            locks,
            dispatcher,
            driver,
            authorizer,
            &config.sync,
        );
        Self {
            manager: Arc::new(manager),
            worker,
            tasks,
            workers: config.tasks.workers,
        }
    }

    /// Spawns the worker loops. They stop once the manager is dropped.
    pub fn start(self) -> (Arc<CachedAclManager>, JoinHandle<()>) {
        info!(workers = self.workers, "Starting task workers");
        let handle = self.worker.spawn(self.tasks, self.workers);
        (self.manager, handle)
    }
}
