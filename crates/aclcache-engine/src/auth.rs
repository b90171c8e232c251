//! Authorization touchpoint for record-level operations.
//!
//! Every mutating record operation asks an [`Authorizer`] before it touches
//! storage. The default policy lets owners and admins mutate, reserves purge
//! for admins and denies direct status changes to everyone.

use serde::{Deserialize, Serialize};

/// Caller identity carried through operations and into lifecycle tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredential {
    pub user_id: String,
    pub project_id: String,
    #[serde(default)]
    pub domain_id: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

impl UserCredential {
    pub fn new(user_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            project_id: project_id.into(),
            domain_id: None,
            is_admin: false,
        }
    }

    pub fn admin(user_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            is_admin: true,
            ..Self::new(user_id, project_id)
        }
    }

    pub fn owns(&self, project_id: &str) -> bool {
        self.project_id == project_id
    }
}

/// Record-level actions subject to authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Patch,
    Delete,
    Purge,
    PerformStatus,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Patch => "patch",
            Self::Delete => "delete",
            Self::Purge => "purge",
            Self::PerformStatus => "perform_status",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Allow/deny predicate evaluated before any mutation.
pub trait Authorizer: Send + Sync {
    fn allow(&self, cred: &UserCredential, action: Action, owner_project_id: &str) -> bool;
}

/// Owner-or-admin policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAuthorizer;

impl Authorizer for DefaultAuthorizer {
    fn allow(&self, cred: &UserCredential, action: Action, owner_project_id: &str) -> bool {
        match action {
            Action::PerformStatus => false,
            Action::Purge => cred.is_admin,
            Action::Create | Action::Patch | Action::Delete => {
                cred.is_admin || cred.owns(owner_project_id)
            }
        }
    }
}
