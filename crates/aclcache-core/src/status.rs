use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Lifecycle status of a cached ACL record.
///
/// ```text
/// Creating --ok--> Running --update--> SyncConf --ok--> Running
///    |                |                    |
///    v                +------ delete ------+--> Deleting --ok--> Deleted
/// CreateFailed                                     |
///                                                  v
///                                             DeleteFailed
/// any (except Deleted) --remote gone, still referenced--> Unknown
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    #[default]
    Creating,
    Running,
    SyncConf,
    Deleting,
    Deleted,
    Unknown,
    CreateFailed,
    SyncConfFailed,
    DeleteFailed,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Running => "running",
            Self::SyncConf => "sync_conf",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
            Self::Unknown => "unknown",
            Self::CreateFailed => "create_failed",
            Self::SyncConfFailed => "sync_conf_failed",
            Self::DeleteFailed => "delete_failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Deleted)
    }

    /// Whether `self -> next` is an edge of the lifecycle graph.
    /// Re-entering the current state is always allowed for non-terminal states.
    pub fn can_transition_to(&self, next: CacheStatus) -> bool {
        use CacheStatus::*;
        if self.is_terminal() {
            return false;
        }
        if *self == next || next == Unknown {
            return true;
        }
        match (self, next) {
            (Creating, Running | CreateFailed | Deleting) => true,
            (Running, SyncConf | Deleting) => true,
            (SyncConf, Running | SyncConfFailed | Deleting) => true,
            (Deleting, Deleted | DeleteFailed) => true,
            (CreateFailed, Creating | Deleting) => true,
            (SyncConfFailed, SyncConf | Deleting) => true,
            (DeleteFailed, Deleting) => true,
            (Unknown, Running | SyncConf | Deleting) => true,
            _ => false,
        }
    }

    /// Returns `next` if the transition is legal.
    pub fn transition(self, next: CacheStatus) -> Result<CacheStatus, CoreError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::invalid_transition(self, next))
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "creating" => Self::Creating,
            "running" => Self::Running,
            "sync_conf" => Self::SyncConf,
            "deleting" => Self::Deleting,
            "deleted" => Self::Deleted,
            "unknown" => Self::Unknown,
            "create_failed" => Self::CreateFailed,
            "sync_conf_failed" => Self::SyncConfFailed,
            "delete_failed" => Self::DeleteFailed,
            other => return Err(CoreError::UnknownStatus(other.to_string())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let s = CacheStatus::default();
        assert_eq!(s, CacheStatus::Creating);
        let s = s.transition(CacheStatus::Running).unwrap();
        let s = s.transition(CacheStatus::SyncConf).unwrap();
        let s = s.transition(CacheStatus::Running).unwrap();
        let s = s.transition(CacheStatus::Deleting).unwrap();
        let s = s.transition(CacheStatus::Deleted).unwrap();
        assert!(s.is_terminal());
    }

    #[test]
    fn test_deleted_is_terminal() {
        for next in [
            CacheStatus::Running,
            CacheStatus::Unknown,
            CacheStatus::Deleting,
        ] {
            assert!(!CacheStatus::Deleted.can_transition_to(next));
        }
    }

    #[test]
    fn test_unknown_reachable_from_any_live_state() {
        for s in [
            CacheStatus::Creating,
            CacheStatus::Running,
            CacheStatus::SyncConf,
            CacheStatus::Deleting,
            CacheStatus::DeleteFailed,
        ] {
            assert!(s.can_transition_to(CacheStatus::Unknown), "{s}");
        }
    }

    #[test]
    fn test_illegal_edges() {
        assert!(CacheStatus::Creating.transition(CacheStatus::SyncConf).is_err());
        assert!(CacheStatus::Running.transition(CacheStatus::Deleted).is_err());
        assert!(CacheStatus::Deleting.transition(CacheStatus::Running).is_err());
    }

    #[test]
    fn test_round_trip_str() {
        for s in [
            CacheStatus::Creating,
            CacheStatus::SyncConf,
            CacheStatus::SyncConfFailed,
            CacheStatus::Unknown,
        ] {
            assert_eq!(s.as_str().parse::<CacheStatus>().unwrap(), s);
        }
        assert!("enabled".parse::<CacheStatus>().is_err());
    }
}
