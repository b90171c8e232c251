//! In-memory storage backend for aclcache.
//!
//! This crate implements every `aclcache-storage` trait on papaya lock-free
//! hash maps. Reads never block; writes go through a single mutation lane so
//! unique-key inserts and `update_cached_acl_with_lock` are atomic.
//!
//! # Example
//!
//! ```ignore
//! use aclcache_db_memory::InMemoryStorage;
//! use aclcache_storage::CachedAclStorage;
//!
//! let storage = InMemoryStorage::new();
//! let inserted = storage.insert_cached_acl(record).await?;
//! ```

pub mod factory;
pub mod storage;

pub use aclcache_storage::{AclStorage, DynStorage, StorageError};
pub use factory::{StorageBackend, StorageConfig, StorageOptions, create_storage};
pub use storage::{FaultOp, InMemoryStorage};

/// Creates a new shared in-memory storage instance without an ops log.
pub fn create_memory_storage() -> DynStorage {
    std::sync::Arc::new(InMemoryStorage::new())
}
