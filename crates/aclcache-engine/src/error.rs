use aclcache_core::CoreError;
use aclcache_storage::StorageError;
use thiserror::Error;

use crate::cloud::DriverError;
use crate::differ::DiffError;
use crate::tasks::TaskError;

/// Errors surfaced by the resolver, the reconciler and the record manager.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Class lock for project {held} cannot cover project {wanted}")]
    LockScope { held: String, wanted: String },
}

impl SyncError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_not_found())
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_duplicate())
    }

    pub fn is_resource_busy(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_resource_busy())
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden(_))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
