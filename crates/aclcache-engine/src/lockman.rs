//! Class and object locks.
//!
//! Class locks are keyed by (keyword, owning project) and serialize every
//! record-creating operation inside one project. Object locks are keyed by
//! (keyword, record id) and serialize mutation of a single record.
//!
//! Both are scoped: the guard releases on drop, on every exit path. Locks are
//! not reentrant. Code that already holds a class lock passes `&ClassLockGuard`
//! down instead of acquiring it again.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LockKey {
    Class { keyword: &'static str, project_id: String },
    Object { keyword: &'static str, id: String },
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class { keyword, project_id } => write!(f, "class:{keyword}:{project_id}"),
            Self::Object { keyword, id } => write!(f, "object:{keyword}:{id}"),
        }
    }
}

type LockTable = DashMap<LockKey, Arc<Mutex<()>>>;

/// Process-scoped lock provider. Cheap to clone; clones share the table.
#[derive(Clone, Default)]
pub struct LockManager {
    locks: Arc<LockTable>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until the class lock for `project_id` is held.
    pub async fn lock_class(&self, keyword: &'static str, project_id: &str) -> ClassLockGuard {
        let key = LockKey::Class {
            keyword,
            project_id: project_id.to_string(),
        };
        ClassLockGuard {
            keyword,
            project_id: project_id.to_string(),
            _held: self.acquire(key).await,
        }
    }

    /// Blocks until the object lock for record `id` is held.
    pub async fn lock_object(&self, keyword: &'static str, id: &str) -> ObjectLockGuard {
        let key = LockKey::Object {
            keyword,
            id: id.to_string(),
        };
        ObjectLockGuard {
            id: id.to_string(),
            _held: self.acquire(key).await,
        }
    }

    /// Number of lock slots currently allocated (held or waited on).
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    async fn acquire(&self, key: LockKey) -> HeldLock {
        let slot = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        debug!(lock = %key, "Waiting for lock");
        let guard = slot.lock_owned().await;
        debug!(lock = %key, "Lock acquired");
        HeldLock {
            key,
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager")
            .field("active_locks", &self.locks.len())
            .finish()
    }
}

struct HeldLock {
    key: LockKey,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockTable>,
}

impl Drop for HeldLock {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Slot goes away once nobody else holds or waits on it.
        self.locks
            .remove_if(&self.key, |_, slot| Arc::strong_count(slot) == 1);
        debug!(lock = %self.key, "Lock released");
    }
}

/// Proof that the class lock of one project is held.
pub struct ClassLockGuard {
    keyword: &'static str,
    project_id: String,
    _held: HeldLock,
}

impl ClassLockGuard {
    pub fn keyword(&self) -> &'static str {
        self.keyword
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn covers(&self, keyword: &str, project_id: &str) -> bool {
        self.keyword == keyword && self.project_id == project_id
    }
}

impl fmt::Debug for ClassLockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassLockGuard")
            .field("keyword", &self.keyword)
            .field("project_id", &self.project_id)
            .finish()
    }
}

/// Proof that the object lock of one record is held.
pub struct ObjectLockGuard {
    id: String,
    _held: HeldLock,
}

impl ObjectLockGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Debug for ObjectLockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectLockGuard").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const KW: &str = "cachedloadbalanceracl";

    #[tokio::test]
    async fn test_release_on_drop_frees_slot() {
        let locks = LockManager::new();
        {
            let guard = locks.lock_class(KW, "p1").await;
            assert!(guard.covers(KW, "p1"));
            assert!(!guard.covers(KW, "p2"));
            assert_eq!(locks.active_locks(), 1);
        }
        assert_eq!(locks.active_locks(), 0);
    }

    #[tokio::test]
    async fn test_class_and_object_keys_are_independent() {
        let locks = LockManager::new();
        let _class = locks.lock_class(KW, "same").await;
        let object = tokio::time::timeout(Duration::from_millis(200), locks.lock_object(KW, "same"))
            .await;
        assert!(object.is_ok());
    }

    #[tokio::test]
    async fn test_distinct_projects_do_not_block() {
        let locks = LockManager::new();
        let _p1 = locks.lock_class(KW, "p1").await;
        let p2 = tokio::time::timeout(Duration::from_millis(200), locks.lock_class(KW, "p2")).await;
        assert!(p2.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_project_is_serialized() {
        let locks = LockManager::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock_class(KW, "p1").await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.active_locks(), 0);
    }

    #[tokio::test]
    async fn test_released_on_error_path() {
        async fn failing(locks: &LockManager) -> Result<(), &'static str> {
            let _guard = locks.lock_object(KW, "r1").await;
            Err("boom")
        }

        let locks = LockManager::new();
        assert!(failing(&locks).await.is_err());
        let again = tokio::time::timeout(Duration::from_millis(200), locks.lock_object(KW, "r1")).await;
        assert!(again.is_ok());
    }
}
