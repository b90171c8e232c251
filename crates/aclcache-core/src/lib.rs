pub mod acl;
pub mod error;
pub mod events;
pub mod id;
pub mod provider;
pub mod status;

pub use acl::{AclEntries, AclEntry, MAX_COMMENT_LEN};
pub use error::{CoreError, ErrorCategory, Result};
pub use id::{generate_id, short_suffix, validate_id};
pub use provider::{AclBinding, ProviderKind};
pub use status::CacheStatus;

/// Current UTC timestamp.
pub fn now_utc() -> time::OffsetDateTime {
    time::OffsetDateTime::now_utc()
}
