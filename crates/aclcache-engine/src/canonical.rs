//! Content-addressed store of canonical ACLs.

use aclcache_core::AclEntries;
use aclcache_storage::{
    CANONICAL_ACL_KEYWORD, CanonicalAcl, CanonicalAclStorage, DynStorage, StorageError,
};
use tracing::debug;

use crate::auth::UserCredential;
use crate::error::Result;

/// Resolves entry sets to canonical rows, inserting on first sight.
///
/// Existing rows are returned unchanged; content never mutates through here.
#[derive(Clone)]
pub struct CanonicalAclStore {
    storage: DynStorage,
}

impl CanonicalAclStore {
    pub fn new(storage: DynStorage) -> Self {
        Self { storage }
    }

    /// Returns the canonical row for `entries`, creating it if absent.
    ///
    /// `name` and `owner` are only used when a new row is inserted.
    pub async fn resolve(
        &self,
        entries: &AclEntries,
        name: &str,
        owner: &UserCredential,
    ) -> Result<CanonicalAcl> {
        let fingerprint = entries.normalized().fingerprint();
        if let Some(existing) = self
            .storage
            .find_canonical_by_fingerprint(&fingerprint)
            .await?
        {
            return Ok(existing);
        }

        let mut acl = CanonicalAcl::new(name, entries, &owner.project_id);
        acl.domain_id = owner.domain_id.clone();
        match self.storage.insert_canonical_acl(acl).await {
            Ok(created) => {
                debug!(canonical_id = %created.id, fingerprint = %fingerprint, "Canonical acl created");
                Ok(created)
            }
            // Lost an insert race; the winner's row is the answer.
            Err(e) if e.is_already_exists() => self
                .storage
                .find_canonical_by_fingerprint(&fingerprint)
                .await?
                .ok_or_else(|| StorageError::not_found(CANONICAL_ACL_KEYWORD, fingerprint).into()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, id: &str) -> Result<CanonicalAcl> {
        self.storage
            .get_canonical_acl(id)
            .await?
            .ok_or_else(|| StorageError::not_found(CANONICAL_ACL_KEYWORD, id).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aclcache_core::AclEntry;
    use aclcache_db_memory::{FaultOp, InMemoryStorage};
    use aclcache_storage::CanonicalAclStorage;
    use std::sync::Arc;

    fn entries(list: &[(&str, &str)]) -> AclEntries {
        list.iter().map(|(c, m)| AclEntry::new(*c, *m)).collect()
    }

    #[tokio::test]
    async fn test_resolve_is_order_independent() {
        let storage: DynStorage = Arc::new(InMemoryStorage::new());
        let store = CanonicalAclStore::new(storage.clone());
        let owner = UserCredential::new("u", "p1");

        let a = store
            .resolve(&entries(&[("10.0.0.0/8", "a"), ("192.168.0.0/16", "b")]), "first", &owner)
            .await
            .unwrap();
        let b = store
            .resolve(&entries(&[("192.168.0.0/16", "b"), ("10.0.0.0/8", "a")]), "second", &owner)
            .await
            .unwrap();

        assert_eq!(a.id, b.id);
        assert_eq!(b.name, "first");
        assert_eq!(storage.count_canonical_acls().await.unwrap(), 1);
        assert_eq!(store.get(&a.id).await.unwrap().fingerprint(), a.fingerprint());
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let memory = InMemoryStorage::new();
        memory.fail_next(FaultOp::InsertCanonicalAcl, 1);
        let storage: DynStorage = Arc::new(memory);
        let store = CanonicalAclStore::new(storage.clone());

        let err = store
            .resolve(&entries(&[("10.0.0.0/8", "")]), "x", &UserCredential::new("u", "p1"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("injected fault"));
        assert_eq!(storage.count_canonical_acls().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = CanonicalAclStore::new(Arc::new(InMemoryStorage::new()));
        assert!(store.get("missing").await.unwrap_err().is_not_found());
    }
}
