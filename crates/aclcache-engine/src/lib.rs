//! # aclcache-engine
//!
//! Keeps a local cache of cloud load balancer ACL bindings in sync with what
//! the cloud endpoint reports.
//!
//! - [`canonical`]: content-addressed, deduplicated ACL definitions
//! - [`differ`]: keyed local/remote partition
//! - [`resolver`]: idempotent get-or-create of cached records
//! - [`reconciler`]: one sync pass per (provider, region)
//! - [`tasks`]: lifecycle task queue and worker
//! - [`lockman`]: class and object locks
//! - [`manager`]: authorized record-level operations

pub mod auth;
pub mod bootstrap;
pub mod canonical;
pub mod cloud;
pub mod config;
pub mod differ;
pub mod error;
pub mod lockman;
pub mod manager;
pub mod naming;
pub mod observability;
pub mod reconciler;
pub mod resolver;
pub mod sync_result;
pub mod tasks;

pub use auth::{Action, Authorizer, DefaultAuthorizer, UserCredential};
pub use bootstrap::AclCache;
pub use canonical::CanonicalAclStore;
pub use cloud::{CloudAclDriver, DriverError, DynCloudDriver, RemoteAclDescriptor, StaticCloudDriver};
pub use config::AppConfig;
pub use error::{Result, SyncError};
pub use lockman::{ClassLockGuard, LockManager, ObjectLockGuard};
pub use manager::{CachedAclCreateInput, CachedAclManager, CachedAclUpdateInput};
pub use reconciler::AclReconciler;
pub use resolver::CacheResolver;
pub use sync_result::{ItemError, SyncOp, SyncResult};
pub use tasks::{TaskDispatcher, TaskError, TaskHandle, TaskKind, TaskParams, TaskRequest, TaskWorker};
