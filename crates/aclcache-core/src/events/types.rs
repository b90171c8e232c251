//! Event types for the record operation log.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Kind of change applied to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordEventType {
    /// Row inserted
    Created,
    /// Mutable fields changed; detail carries the diff
    Updated,
    /// Lifecycle status moved
    StatusChanged,
    /// Row marked pending-deleted
    PendingDeleted,
}

impl RecordEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordEventType::Created => "created",
            RecordEventType::Updated => "updated",
            RecordEventType::StatusChanged => "status_changed",
            RecordEventType::PendingDeleted => "pending_deleted",
        }
    }
}

impl std::fmt::Display for RecordEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single ops-log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordEvent {
    pub event_type: RecordEventType,
    /// Keyword of the record kind, e.g. `cachedloadbalanceracl`
    pub keyword: String,
    pub record_id: String,
    /// Free-form detail: the diff for updates, the new status for transitions
    pub detail: Option<serde_json::Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl RecordEvent {
    pub fn new(
        event_type: RecordEventType,
        keyword: impl Into<String>,
        record_id: impl Into<String>,
        detail: Option<serde_json::Value>,
    ) -> Self {
        Self {
            event_type,
            keyword: keyword.into(),
            record_id: record_id.into(),
            detail,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn created(keyword: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self::new(RecordEventType::Created, keyword, record_id, None)
    }

    pub fn status_changed(
        keyword: impl Into<String>,
        record_id: impl Into<String>,
        from: &str,
        to: &str,
    ) -> Self {
        Self::new(
            RecordEventType::StatusChanged,
            keyword,
            record_id,
            Some(serde_json::json!({ "from": from, "to": to })),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_changed_detail() {
        let ev = RecordEvent::status_changed("cachedloadbalanceracl", "r1", "creating", "running");
        assert_eq!(ev.event_type, RecordEventType::StatusChanged);
        let detail = ev.detail.unwrap();
        assert_eq!(detail["from"], "creating");
        assert_eq!(detail["to"], "running");
    }

    #[test]
    fn test_event_serializes_snake_case() {
        let ev = RecordEvent::created("cachedloadbalanceracl", "r1");
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["event_type"], "created");
        assert_eq!(RecordEventType::PendingDeleted.to_string(), "pending_deleted");
    }
}
