//! Storage error types for the ACL cache persistence layer.

use std::fmt;

use aclcache_core::CoreError;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested row was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Keyword of the row kind.
        kind: String,
        /// Identifier that missed.
        id: String,
    },

    /// More than one live row matches a key that should be unique.
    #[error("Duplicate {kind} found for {key}")]
    Duplicate {
        /// Keyword of the row kind.
        kind: String,
        /// Human-readable rendering of the uniqueness key.
        key: String,
    },

    /// Attempted to insert a row whose identity is already taken.
    #[error("{kind} already exists: {id}")]
    AlreadyExists {
        /// Keyword of the row kind.
        kind: String,
        /// The id or unique key that collided.
        id: String,
    },

    /// The row is still referenced and cannot be removed.
    #[error("Resource busy: {message}")]
    ResourceBusy {
        /// Description of the blocking reference.
        message: String,
    },

    /// The row data is invalid.
    #[error("Invalid resource: {message}")]
    InvalidResource {
        /// Description of why the row is invalid.
        message: String,
    },

    /// A value-level rule was violated while mutating a row.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Failed to reach the storage backend.
    #[error("Connection error: {message}")]
    ConnectionError {
        /// Description of the connection error.
        message: String,
    },

    /// An internal storage error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Creates a new `Duplicate` error.
    #[must_use]
    pub fn duplicate(kind: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Duplicate {
            kind: kind.into(),
            key: key.into(),
        }
    }

    /// Creates a new `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Creates a new `ResourceBusy` error.
    #[must_use]
    pub fn resource_busy(message: impl Into<String>) -> Self {
        Self::ResourceBusy {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidResource` error.
    #[must_use]
    pub fn invalid_resource(message: impl Into<String>) -> Self {
        Self::InvalidResource {
            message: message.into(),
        }
    }

    /// Creates a new `ConnectionError` error.
    #[must_use]
    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::ConnectionError {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }

    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    #[must_use]
    pub fn is_resource_busy(&self) -> bool {
        matches!(self, Self::ResourceBusy { .. })
    }

    /// Transient errors abort only the current item of a sync pass.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionError { .. } | Self::Internal { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Duplicate { .. } => ErrorCategory::Integrity,
            Self::AlreadyExists { .. } => ErrorCategory::Conflict,
            Self::ResourceBusy { .. } => ErrorCategory::Conflict,
            Self::InvalidResource { .. } | Self::Core(_) => ErrorCategory::Validation,
            Self::ConnectionError { .. } => ErrorCategory::Infrastructure,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Row not found.
    NotFound,
    /// Uniqueness invariant broken in stored data.
    Integrity,
    /// Conflict (existence or live reference).
    Conflict,
    /// Validation error.
    Validation,
    /// Infrastructure/connection error.
    Infrastructure,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Integrity => write!(f, "integrity"),
            Self::Conflict => write!(f, "conflict"),
            Self::Validation => write!(f, "validation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
