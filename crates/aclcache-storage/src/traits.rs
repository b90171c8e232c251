//! Storage traits for the ACL cache persistence layer.
//!
//! Backends implement the three table traits and then [`AclStorage`], which
//! is the single trait object the engine holds.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::types::{
    CachedAclFilter, CachedAclRecord, CanonicalAcl, CloudProvider, CloudRegion,
    LoadbalancerListener, RecordDiff,
};

/// Mutation applied to a single record under the backend's row lock.
///
/// Returning an error leaves the stored row untouched.
pub type RecordMutation<'a> =
    Box<dyn FnOnce(&mut CachedAclRecord) -> Result<(), StorageError> + Send + 'a>;

/// Content-addressed canonical ACL table.
#[async_trait]
pub trait CanonicalAclStorage: Send + Sync {
    /// Inserts a canonical ACL.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if a row with the same fingerprint
    /// is already stored. The check and the insert are atomic.
    async fn insert_canonical_acl(&self, acl: CanonicalAcl) -> Result<CanonicalAcl, StorageError>;

    /// Reads a canonical ACL by id. Returns `None` when absent.
    async fn get_canonical_acl(&self, id: &str) -> Result<Option<CanonicalAcl>, StorageError>;

    /// Looks up the row owning `fingerprint`.
    async fn find_canonical_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<CanonicalAcl>, StorageError>;

    /// Number of rows carrying `fingerprint` (0 or 1 under the invariant).
    async fn count_canonical_by_fingerprint(&self, fingerprint: &str)
    -> Result<usize, StorageError>;

    /// Total number of canonical ACL rows.
    async fn count_canonical_acls(&self) -> Result<usize, StorageError>;
}

/// Cached ACL record table.
#[async_trait]
pub trait CachedAclStorage: Send + Sync {
    /// Inserts a new record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if the id is taken.
    async fn insert_cached_acl(
        &self,
        record: CachedAclRecord,
    ) -> Result<CachedAclRecord, StorageError>;

    /// Reads a record by id, including pending-deleted rows.
    async fn get_cached_acl(&self, id: &str) -> Result<Option<CachedAclRecord>, StorageError>;

    /// Returns every record matching `filter`, oldest first.
    async fn find_cached_acls(
        &self,
        filter: &CachedAclFilter,
    ) -> Result<Vec<CachedAclRecord>, StorageError>;

    async fn count_cached_acls(&self, filter: &CachedAclFilter) -> Result<usize, StorageError>;

    /// Applies `mutate` to the current version of the row atomically and
    /// returns the new version plus the field diff.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the row does not exist, or the
    /// error returned by `mutate`.
    async fn update_cached_acl_with_lock(
        &self,
        id: &str,
        mutate: RecordMutation<'_>,
    ) -> Result<(CachedAclRecord, RecordDiff), StorageError>;

    /// Whether a live record named `name` exists in `project_id`.
    async fn cached_acl_name_exists(&self, project_id: &str, name: &str)
    -> Result<bool, StorageError>;
}

/// Providers, regions and listeners referenced by cached records.
#[async_trait]
pub trait CatalogStorage: Send + Sync {
    async fn insert_provider(&self, provider: CloudProvider) -> Result<CloudProvider, StorageError>;

    async fn get_provider(&self, id: &str) -> Result<Option<CloudProvider>, StorageError>;

    async fn insert_region(&self, region: CloudRegion) -> Result<CloudRegion, StorageError>;

    async fn get_region(&self, id: &str) -> Result<Option<CloudRegion>, StorageError>;

    async fn insert_listener(
        &self,
        listener: LoadbalancerListener,
    ) -> Result<LoadbalancerListener, StorageError>;

    async fn get_listener(&self, id: &str) -> Result<Option<LoadbalancerListener>, StorageError>;

    /// Finds a live listener of `provider_id` by its cloud-assigned id.
    async fn find_listener_by_external_id(
        &self,
        provider_id: &str,
        external_id: &str,
    ) -> Result<Option<LoadbalancerListener>, StorageError>;

    /// Number of live listeners whose `acl_id` points at `cached_acl_id`.
    async fn count_listeners_referencing(&self, cached_acl_id: &str)
    -> Result<usize, StorageError>;

    /// Soft-deletes a listener, releasing its ACL reference.
    async fn mark_listener_pending_deleted(&self, id: &str) -> Result<(), StorageError>;
}

/// Everything the ACL cache engine needs from a backend.
pub trait AclStorage: CanonicalAclStorage + CachedAclStorage + CatalogStorage {
    /// Name of the backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}
