use std::sync::Arc;

use aclcache_core::events::EventBroadcaster;
use aclcache_storage::{DynStorage, EventedStorage};
use serde::{Deserialize, Serialize};

use crate::InMemoryStorage;

/// Supported storage backend types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// In-memory storage implemented on top of papaya::HashMap
    #[default]
    Memory,
}

/// Storage-specific configuration options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageOptions {
    /// Initial capacity of the cached record table.
    #[serde(default)]
    pub preallocate_items: Option<usize>,
}

/// Factory configuration to construct a storage instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub options: StorageOptions,
}

/// Create a storage instance based on the provided configuration.
///
/// When a broadcaster is given, the backend is wrapped in [`EventedStorage`]
/// so every write lands in the ops log.
pub fn create_storage(
    config: &StorageConfig,
    broadcaster: Option<Arc<EventBroadcaster>>,
) -> DynStorage {
    match config.backend {
        StorageBackend::Memory => {
            let storage = InMemoryStorage::with_options(config.options.clone());
            match broadcaster {
                Some(b) => Arc::new(EventedStorage::new(storage, b)),
                None => Arc::new(storage),
            }
        }
    }
}
