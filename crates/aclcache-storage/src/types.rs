//! Row types for the ACL cache persistence layer.

use std::collections::BTreeMap;

use aclcache_core::{AclEntries, CacheStatus, CoreError, ProviderKind, generate_id};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// Keyword used for canonical ACL rows in errors and events.
pub const CANONICAL_ACL_KEYWORD: &str = "loadbalanceracl";

/// Keyword used for cached ACL records in errors and events.
pub const CACHED_ACL_KEYWORD: &str = "cachedloadbalanceracl";

/// A deduplicated, content-addressed ACL definition.
///
/// The fingerprint is fixed at construction; new content means a new row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalAcl {
    pub id: String,
    fingerprint: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    entries: AclEntries,
    pub project_id: String,
    #[serde(default)]
    pub domain_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl CanonicalAcl {
    /// Builds a row from an entry list, storing the normalized form.
    #[must_use]
    pub fn new(name: impl Into<String>, entries: &AclEntries, project_id: impl Into<String>) -> Self {
        let normalized = entries.normalized();
        Self {
            id: generate_id(),
            fingerprint: normalized.fingerprint(),
            name: name.into(),
            description: None,
            entries: normalized,
            project_id: project_id.into(),
            domain_id: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn entries(&self) -> &AclEntries {
        &self.entries
    }
}

/// Binding of a canonical ACL to a provider account, region and optionally a listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedAclRecord {
    pub id: String,
    /// Identifier assigned by the cloud endpoint; empty until first synced.
    #[serde(default)]
    pub external_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub provider_id: String,
    pub region_id: String,
    pub canonical_acl_id: String,
    /// Only set for providers that bind ACLs per listener.
    #[serde(default)]
    pub listener_id: Option<String>,
    pub status: CacheStatus,
    #[serde(default)]
    pub pending_deleted: bool,
    pub project_id: String,
    #[serde(default)]
    pub domain_id: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub pending_deleted_at: Option<OffsetDateTime>,
}

impl CachedAclRecord {
    /// A fresh record in `Creating` status.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        provider_id: impl Into<String>,
        region_id: impl Into<String>,
        canonical_acl_id: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: generate_id(),
            external_id: String::new(),
            name: name.into(),
            description: None,
            provider_id: provider_id.into(),
            region_id: region_id.into(),
            canonical_acl_id: canonical_acl_id.into(),
            listener_id: None,
            status: CacheStatus::Creating,
            pending_deleted: false,
            project_id: project_id.into(),
            domain_id: None,
            metadata: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            pending_deleted_at: None,
        }
    }

    #[must_use]
    pub fn with_listener(mut self, listener_id: Option<String>) -> Self {
        self.listener_id = listener_id.filter(|l| !l.is_empty());
        self
    }

    #[must_use]
    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = external_id.into();
        self
    }

    pub fn is_live(&self) -> bool {
        !self.pending_deleted
    }

    /// Moves to `next` if the lifecycle allows it; returns the previous status.
    pub fn set_status(&mut self, next: CacheStatus) -> Result<CacheStatus, CoreError> {
        let prev = self.status;
        self.status = prev.transition(next)?;
        Ok(prev)
    }

    /// Soft delete. The row stays for audit history.
    pub fn mark_pending_deleted(&mut self) {
        if !self.pending_deleted {
            self.pending_deleted = true;
            self.pending_deleted_at = Some(OffsetDateTime::now_utc());
        }
    }
}

/// A cloud provider account. Its project owns every record created through it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudProvider {
    pub id: String,
    pub name: String,
    pub kind: ProviderKind,
    pub project_id: String,
    #[serde(default)]
    pub domain_id: Option<String>,
}

impl CloudProvider {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ProviderKind, project_id: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            name: name.into(),
            kind,
            project_id: project_id.into(),
            domain_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudRegion {
    pub id: String,
    pub external_id: String,
    pub name: String,
}

impl CloudRegion {
    #[must_use]
    pub fn new(name: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            external_id: external_id.into(),
            name: name.into(),
        }
    }
}

/// A load balancer listener. `acl_id` points at a cached ACL record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadbalancerListener {
    pub id: String,
    pub external_id: String,
    pub name: String,
    pub provider_id: String,
    pub region_id: String,
    #[serde(default)]
    pub acl_id: Option<String>,
    pub project_id: String,
    #[serde(default)]
    pub pending_deleted: bool,
}

impl LoadbalancerListener {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        external_id: impl Into<String>,
        provider: &CloudProvider,
        region_id: impl Into<String>,
    ) -> Self {
        Self {
            id: generate_id(),
            external_id: external_id.into(),
            name: name.into(),
            provider_id: provider.id.clone(),
            region_id: region_id.into(),
            acl_id: None,
            project_id: provider.project_id.clone(),
            pending_deleted: false,
        }
    }

    #[must_use]
    pub fn with_acl(mut self, acl_id: impl Into<String>) -> Self {
        self.acl_id = Some(acl_id.into());
        self
    }
}

/// Query over cached records. Pending-deleted rows are skipped unless asked for.
#[derive(Debug, Clone, Default)]
pub struct CachedAclFilter {
    pub region_id: Option<String>,
    pub provider_id: Option<String>,
    pub canonical_acl_id: Option<String>,
    pub listener_id: Option<String>,
    pub project_id: Option<String>,
    pub name: Option<String>,
    pub external_id: Option<String>,
    pub include_pending_deleted: bool,
}

impl CachedAclFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn region(mut self, id: impl Into<String>) -> Self {
        self.region_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn provider(mut self, id: impl Into<String>) -> Self {
        self.provider_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn canonical_acl(mut self, id: impl Into<String>) -> Self {
        self.canonical_acl_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn listener(mut self, id: impl Into<String>) -> Self {
        self.listener_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn project(mut self, id: impl Into<String>) -> Self {
        self.project_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn external_id(mut self, id: impl Into<String>) -> Self {
        self.external_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_pending_deleted(mut self) -> Self {
        self.include_pending_deleted = true;
        self
    }

    pub fn matches(&self, record: &CachedAclRecord) -> bool {
        fn eq(want: &Option<String>, have: &str) -> bool {
            want.as_deref().is_none_or(|w| w == have)
        }
        (self.include_pending_deleted || !record.pending_deleted)
            && eq(&self.region_id, &record.region_id)
            && eq(&self.provider_id, &record.provider_id)
            && eq(&self.canonical_acl_id, &record.canonical_acl_id)
            && eq(&self.project_id, &record.project_id)
            && eq(&self.name, &record.name)
            && eq(&self.external_id, &record.external_id)
            && eq(&self.listener_id, record.listener_id.as_deref().unwrap_or(""))
    }
}

/// One changed field between two versions of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub old: Value,
    pub new: Value,
}

/// Field-level diff produced by an update, used for the ops log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordDiff(pub Vec<FieldChange>);

impl RecordDiff {
    /// Compares the serialized forms, ignoring `updated_at`.
    pub fn between(before: &CachedAclRecord, after: &CachedAclRecord) -> Self {
        let (Ok(Value::Object(old)), Ok(Value::Object(new))) =
            (serde_json::to_value(before), serde_json::to_value(after))
        else {
            return Self::default();
        };
        let changes = new
            .into_iter()
            .filter(|(field, _)| field != "updated_at")
            .filter_map(|(field, new_value)| {
                let old_value = old.get(&field).cloned().unwrap_or(Value::Null);
                (old_value != new_value).then(|| FieldChange {
                    field,
                    old: old_value,
                    new: new_value,
                })
            })
            .collect();
        Self(changes)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn touches(&self, field: &str) -> bool {
        self.0.iter().any(|c| c.field == field)
    }
}
