//! ACL entry values and the content fingerprint used for deduplication.
//!
//! An ACL is an unordered set of `(cidr, comment)` pairs. Two entry lists that
//! contain the same pairs in any order describe the same ACL and therefore
//! share a fingerprint.

use std::collections::HashSet;
use std::str::FromStr;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CoreError, Result};

/// Longest comment accepted on a single entry.
pub const MAX_COMMENT_LEN: usize = 128;

/// A single ACL rule. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AclEntry {
    pub cidr: String,
    #[serde(default)]
    pub comment: String,
}

impl AclEntry {
    pub fn new(cidr: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            cidr: cidr.into(),
            comment: comment.into(),
        }
    }

    /// Checks CIDR syntax and comment length.
    pub fn validate(&self) -> Result<()> {
        let cidr = self.cidr.trim();
        if cidr.is_empty() {
            return Err(CoreError::invalid_acl_entry("empty cidr"));
        }
        IpNetwork::from_str(cidr)
            .map_err(|e| CoreError::invalid_acl_entry(format!("invalid cidr {cidr}: {e}")))?;
        if self.comment.chars().count() > MAX_COMMENT_LEN {
            return Err(CoreError::invalid_acl_entry(format!(
                "comment for {cidr} longer than {MAX_COMMENT_LEN} characters"
            )));
        }
        Ok(())
    }
}

/// An ordered list of ACL entries as observed or submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AclEntries(Vec<AclEntry>);

impl AclEntries {
    pub fn new(entries: Vec<AclEntry>) -> Self {
        Self(entries)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AclEntry> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[AclEntry] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<AclEntry> {
        self.0
    }

    /// Canonical form: whitespace-trimmed, sorted by cidr then comment, exact
    /// duplicates collapsed.
    pub fn normalized(&self) -> Self {
        let mut entries: Vec<AclEntry> = self
            .0
            .iter()
            .map(|e| AclEntry::new(e.cidr.trim(), e.comment.trim()))
            .collect();
        entries.sort();
        entries.dedup();
        Self(entries)
    }

    /// Deterministic content hash over the normalized entry set.
    ///
    /// Each field is length-prefixed so that no two distinct sets can
    /// serialize to the same byte stream.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for entry in self.normalized().iter() {
            for field in [&entry.cidr, &entry.comment] {
                hasher.update((field.len() as u64).to_be_bytes());
                hasher.update(field.as_bytes());
            }
        }
        format!("sha256:{}", hex::encode(hasher.finalize()))
    }

    /// Validates every entry and rejects an empty set or a CIDR listed twice.
    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(CoreError::invalid_acl_entry("acl must contain at least one entry"));
        }
        let mut seen = HashSet::new();
        for entry in &self.0 {
            entry.validate()?;
            if !seen.insert(entry.cidr.trim()) {
                return Err(CoreError::invalid_acl_entry(format!(
                    "duplicate cidr {}",
                    entry.cidr.trim()
                )));
            }
        }
        Ok(())
    }
}

impl From<Vec<AclEntry>> for AclEntries {
    fn from(entries: Vec<AclEntry>) -> Self {
        Self(entries)
    }
}

impl FromIterator<AclEntry> for AclEntries {
    fn from_iter<I: IntoIterator<Item = AclEntry>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a AclEntries {
    type Item = &'a AclEntry;
    type IntoIter = std::slice::Iter<'a, AclEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(pairs: &[(&str, &str)]) -> AclEntries {
        pairs.iter().map(|(c, m)| AclEntry::new(*c, *m)).collect()
    }

    #[test]
    fn test_fingerprint_is_order_independent() {
        let a = entries(&[("10.0.0.0/8", "office"), ("192.168.1.0/24", "lab")]);
        let b = entries(&[("192.168.1.0/24", "lab"), ("10.0.0.0/8", "office")]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert!(a.fingerprint().starts_with("sha256:"));
    }

    #[test]
    fn test_fingerprint_distinguishes_comment() {
        let a = entries(&[("10.0.0.0/8", "office")]);
        let b = entries(&[("10.0.0.0/8", "home")]);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_field_boundaries() {
        // "10.0.0.1" + "/32x" must not collide with "10.0.0.1/32" + "x"
        let a = entries(&[("10.0.0.1", "/32x")]);
        let b = entries(&[("10.0.0.1/32", "x")]);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_normalized_collapses_duplicates_and_whitespace() {
        let a = entries(&[(" 10.0.0.0/8", "x "), ("10.0.0.0/8", "x")]);
        let n = a.normalized();
        assert_eq!(n.len(), 1);
        assert_eq!(n.as_slice()[0], AclEntry::new("10.0.0.0/8", "x"));
    }

    #[test]
    fn test_validate_accepts_ip_and_cidr() {
        let a = entries(&[("10.0.0.1", ""), ("2001:db8::/32", "v6")]);
        assert!(a.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        assert!(AclEntries::default().validate().is_err());
        assert!(entries(&[("10.0.0.0/33", "")]).validate().is_err());
        assert!(entries(&[("not-an-ip", "")]).validate().is_err());
        assert!(
            entries(&[("10.0.0.0/8", "a"), ("10.0.0.0/8", "b")])
                .validate()
                .is_err()
        );
        let long = "c".repeat(MAX_COMMENT_LEN + 1);
        assert!(entries(&[("10.0.0.0/8", long.as_str())]).validate().is_err());
    }
}
