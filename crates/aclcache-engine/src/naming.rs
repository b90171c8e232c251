//! Unique record names within an owning project.

use aclcache_core::short_suffix;
use aclcache_storage::{CachedAclStorage, DynStorage};

use crate::error::Result;

const FALLBACK_NAME: &str = "acl";

/// Picks a name not used by any live record of `project_id`.
///
/// Tries `base`, then `base-1` up to `base-{suffix_limit}`, then a random
/// suffix. Callers hold the project's class lock so the answer stays valid
/// until their insert.
pub async fn generate_name(
    storage: &DynStorage,
    project_id: &str,
    base: &str,
    suffix_limit: u32,
) -> Result<String> {
    let base = match base.trim() {
        "" => FALLBACK_NAME,
        trimmed => trimmed,
    };
    if !storage.cached_acl_name_exists(project_id, base).await? {
        return Ok(base.to_string());
    }
    for n in 1..=suffix_limit {
        let candidate = format!("{base}-{n}");
        if !storage.cached_acl_name_exists(project_id, &candidate).await? {
            return Ok(candidate);
        }
    }
    Ok(format!("{base}-{}", short_suffix()))
}
