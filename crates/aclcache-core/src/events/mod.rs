//! Operation log for cached ACL records.
//!
//! Every change the storage layer makes to a cached record is published as a
//! [`RecordEvent`] on an [`EventBroadcaster`]. Subscribers (audit sinks, tests,
//! metrics) receive events after the change has been persisted.
//!
//! ```text
//! storage write ──► EventedStorage ──► EventBroadcaster ──► subscribers
//! ```

pub mod broadcaster;
pub mod types;

pub use broadcaster::EventBroadcaster;
pub use types::{RecordEvent, RecordEventType};
