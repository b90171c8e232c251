//! Keyed partition of a local collection against a remote one.
//!
//! Local items are matched to remote items by `local.external_key() ==
//! remote.global_key()`. The output is a complete, non-overlapping partition:
//! every local item lands in `removed` or in one `common` pair, every remote
//! item lands in `added` or in one `common` pair. Cost is O(n + m).

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use thiserror::Error;

/// Local side of a comparison: the identifier the remote endpoint assigned.
pub trait ExternalKeyed {
    fn external_key(&self) -> &str;
}

/// Remote side of a comparison: the endpoint's own global identifier.
pub trait GlobalKeyed {
    fn global_key(&self) -> &str;
}

/// A key appeared twice on the same side, so the partition is ambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiffError {
    #[error("duplicate local key {0}")]
    DuplicateLocal(String),

    #[error("duplicate remote key {0}")]
    DuplicateRemote(String),
}

#[derive(Debug)]
pub struct SetDiff<L, R> {
    /// Local items without a remote match, in local order.
    pub removed: Vec<L>,
    /// Matched pairs, in local order.
    pub common: Vec<(L, R)>,
    /// Remote items without a local match, in remote order.
    pub added: Vec<R>,
}

impl<L, R> SetDiff<L, R> {
    pub fn is_unchanged(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// Partitions `local` against `remote`.
///
/// # Errors
///
/// Returns [`DiffError`] when either side repeats a key.
pub fn partition<L, R>(local: Vec<L>, remote: Vec<R>) -> Result<SetDiff<L, R>, DiffError>
where
    L: ExternalKeyed,
    R: GlobalKeyed,
{
    let mut remote_slots: Vec<Option<R>> = Vec::with_capacity(remote.len());
    let mut by_key: HashMap<String, usize> = HashMap::with_capacity(remote.len());
    for item in remote {
        match by_key.entry(item.global_key().to_string()) {
            Entry::Occupied(e) => return Err(DiffError::DuplicateRemote(e.key().clone())),
            Entry::Vacant(e) => {
                e.insert(remote_slots.len());
            }
        }
        remote_slots.push(Some(item));
    }

    let mut seen_local: HashSet<String> = HashSet::with_capacity(local.len());
    let mut removed = Vec::new();
    let mut common = Vec::new();
    for item in local {
        let key = item.external_key().to_string();
        if !seen_local.insert(key.clone()) {
            return Err(DiffError::DuplicateLocal(key));
        }
        match by_key.get(&key).and_then(|&i| remote_slots[i].take()) {
            Some(matched) => common.push((item, matched)),
            None => removed.push(item),
        }
    }

    let added = remote_slots.into_iter().flatten().collect();
    Ok(SetDiff {
        removed,
        common,
        added,
    })
}
