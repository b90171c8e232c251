//! Aggregate outcome of one reconciliation pass.

use std::fmt;

use serde::Serialize;

/// Which branch of a pass an item went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOp {
    Add,
    Update,
    Delete,
}

impl SyncOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// First error recorded for a failed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
    pub op: SyncOp,
    /// Record id for delete/update, remote global id for add.
    pub item: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub added: usize,
    pub add_errors: usize,
    pub updated: usize,
    pub update_errors: usize,
    pub deleted: usize,
    pub delete_errors: usize,
    pub errors: Vec<ItemError>,
}

impl SyncResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self) {
        self.added += 1;
    }

    pub fn update(&mut self) {
        self.updated += 1;
    }

    pub fn delete(&mut self) {
        self.deleted += 1;
    }

    pub fn add_error(&mut self, item: impl Into<String>, err: &dyn fmt::Display) {
        self.add_errors += 1;
        self.push_error(SyncOp::Add, item.into(), err);
    }

    pub fn update_error(&mut self, item: impl Into<String>, err: &dyn fmt::Display) {
        self.update_errors += 1;
        self.push_error(SyncOp::Update, item.into(), err);
    }

    pub fn delete_error(&mut self, item: impl Into<String>, err: &dyn fmt::Display) {
        self.delete_errors += 1;
        self.push_error(SyncOp::Delete, item.into(), err);
    }

    pub fn error_count(&self) -> usize {
        self.add_errors + self.update_errors + self.delete_errors
    }

    pub fn is_ok(&self) -> bool {
        self.error_count() == 0
    }

    /// The recorded error for `item`, if it failed.
    pub fn error_for(&self, item: &str) -> Option<&ItemError> {
        self.errors.iter().find(|e| e.item == item)
    }

    fn push_error(&mut self, op: SyncOp, item: String, err: &dyn fmt::Display) {
        if self.errors.iter().any(|e| e.item == item) {
            return;
        }
        self.errors.push(ItemError {
            op,
            item,
            message: err.to_string(),
        });
    }
}

impl fmt::Display for SyncResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "removed {} failed {} updated {} failed {} added {} failed {}",
            self.deleted,
            self.delete_errors,
            self.updated,
            self.update_errors,
            self.added,
            self.add_errors
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_display() {
        let mut r = SyncResult::new();
        r.add();
        r.add();
        r.update();
        r.delete_error("rec-1", &"still referenced");
        assert_eq!(r.added, 2);
        assert_eq!(r.error_count(), 1);
        assert!(!r.is_ok());
        assert_eq!(
            r.to_string(),
            "removed 0 failed 1 updated 1 failed 0 added 2 failed 0"
        );
    }

    #[test]
    fn test_keeps_first_error_per_item() {
        let mut r = SyncResult::new();
        r.update_error("rec-1", &"first");
        r.update_error("rec-1", &"second");
        assert_eq!(r.update_errors, 2);
        assert_eq!(r.errors.len(), 1);
        assert_eq!(r.error_for("rec-1").unwrap().message, "first");
        assert_eq!(r.error_for("rec-1").unwrap().op, SyncOp::Update);
        assert!(r.error_for("rec-2").is_none());
    }
}
