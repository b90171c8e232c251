use thiserror::Error;

/// Core error types for aclcache value handling
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid ACL entry: {message}")]
    InvalidAclEntry { message: String },

    #[error("Invalid ID: {0}")]
    InvalidId(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Unknown cloud provider: {0}")]
    UnknownProvider(String),

    #[error("Unknown status: {0}")]
    UnknownStatus(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    /// Create a new InvalidAclEntry error
    pub fn invalid_acl_entry(message: impl Into<String>) -> Self {
        Self::InvalidAclEntry {
            message: message.into(),
        }
    }

    /// Create a new InvalidId error
    pub fn invalid_id(id: impl Into<String>) -> Self {
        Self::InvalidId(id.into())
    }

    /// Create a new InvalidStatusTransition error
    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidStatusTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Create a new Configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Check if this error was caused by caller input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidAclEntry { .. }
                | Self::InvalidId(_)
                | Self::UnknownProvider(_)
                | Self::UnknownStatus(_)
                | Self::JsonError(_)
        )
    }

    /// Get error category for logging/monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidAclEntry { .. }
            | Self::InvalidId(_)
            | Self::UnknownProvider(_)
            | Self::UnknownStatus(_) => ErrorCategory::Validation,
            Self::InvalidStatusTransition { .. } => ErrorCategory::State,
            Self::JsonError(_) => ErrorCategory::Serialization,
            Self::Configuration(_) => ErrorCategory::Configuration,
        }
    }
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    State,
    Serialization,
    Configuration,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::State => write!(f, "state"),
            Self::Serialization => write!(f, "serialization"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_acl_entry_error() {
        let err = CoreError::invalid_acl_entry("bad cidr 10.0.0.0/33");
        assert_eq!(err.to_string(), "Invalid ACL entry: bad cidr 10.0.0.0/33");
        assert!(err.is_client_error());
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_transition_error() {
        let err = CoreError::invalid_transition("deleted", "running");
        assert_eq!(
            err.to_string(),
            "Invalid status transition from deleted to running"
        );
        assert!(!err.is_client_error());
        assert_eq!(err.category(), ErrorCategory::State);
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err: serde_json::Error =
            serde_json::from_str::<serde_json::Value>("{ nope").unwrap_err();
        let core_err: CoreError = json_err.into();
        assert!(matches!(core_err, CoreError::JsonError(_)));
        assert_eq!(core_err.category(), ErrorCategory::Serialization);
    }

    #[test]
    fn test_error_categories_display() {
        assert_eq!(ErrorCategory::Validation.to_string(), "validation");
        assert_eq!(ErrorCategory::State.to_string(), "state");
        assert_eq!(ErrorCategory::Serialization.to_string(), "serialization");
        assert_eq!(ErrorCategory::Configuration.to_string(), "configuration");
    }
}
