//! # aclcache-storage
//!
//! Persistence boundary for the ACL cache.
//!
//! This crate defines the row types and the traits every storage backend must
//! implement. It contains no backend itself; see `aclcache-db-memory`.
//!
//! ## Overview
//!
//! - [`CanonicalAclStorage`]: content-addressed ACL definitions, unique by fingerprint
//! - [`CachedAclStorage`]: per-scope bindings, with an update-with-lock primitive
//! - [`CatalogStorage`]: providers, regions and listeners the cache refers to
//!
//! [`AclStorage`] bundles all three and is what the engine holds.
//!
//! ## Example
//!
//! ```ignore
//! use aclcache_storage::{CachedAclFilter, DynStorage, StorageError};
//!
//! async fn live_in_region(
//!     storage: &DynStorage,
//!     region_id: &str,
//! ) -> Result<usize, StorageError> {
//!     let filter = CachedAclFilter::new().region(region_id);
//!     storage.count_cached_acls(&filter).await
//! }
//! ```

mod error;
pub mod evented;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use evented::EventedStorage;
pub use traits::{AclStorage, CachedAclStorage, CanonicalAclStorage, CatalogStorage, RecordMutation};
pub use types::{
    CACHED_ACL_KEYWORD, CANONICAL_ACL_KEYWORD, CachedAclFilter, CachedAclRecord, CanonicalAcl,
    CloudProvider, CloudRegion, FieldChange, LoadbalancerListener, RecordDiff,
};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shared storage trait object.
pub type DynStorage = std::sync::Arc<dyn AclStorage>;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{ErrorCategory, StorageError};
    pub use crate::traits::{
        AclStorage, CachedAclStorage, CanonicalAclStorage, CatalogStorage, RecordMutation,
    };
    pub use crate::types::{
        CachedAclFilter, CachedAclRecord, CanonicalAcl, CloudProvider, CloudRegion,
        LoadbalancerListener, RecordDiff,
    };
    pub use crate::{DynStorage, StorageResult};
}
