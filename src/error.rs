//! Error types for zonectl
//!
//! Error taxonomy covering coordination, locking, scheduling and
//! configuration failures.

use thiserror::Error;

/// Primary error type for all zonectl operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ZoneCtlError {
    // ========== Coordination Errors ==========

    /// Transient failure reported by the coordination backend
    #[error("Coordination error: {message}")]
    Coordination { message: String },

    /// Could not reach the coordination backend
    #[error("Connection to {endpoint} failed: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// Group has not been created on the backend
    #[error("Group {group} does not exist")]
    GroupNotCreated { group: String },

    /// Group was already created by another member
    #[error("Group {group} already exists")]
    GroupAlreadyExists { group: String },

    /// Member is not part of the group
    #[error("Member {member} has not joined group {group}")]
    MemberNotJoined { group: String, member: String },

    /// Backend URL scheme has no driver
    #[error("Unsupported coordination backend: {url}")]
    UnsupportedBackend { url: String },

    // ========== Locking Errors ==========

    /// Release of a lock this handle does not hold
    #[error("Lock {name} is not held")]
    LockNotHeld { name: String },

    /// No zone id could be derived for a synchronized operation
    #[error("Failed to determine zone id for synchronized operation {operation}")]
    ResourceIdUnresolved { operation: String },

    // ========== Scheduler Errors ==========

    /// Pool lookup in storage failed
    #[error("Pool not found: {pool_id}")]
    PoolNotFound { pool_id: String },

    /// Transient storage failure
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Policy check denied the request
    #[error("Forbidden by policy rule {rule}")]
    Forbidden { rule: String },

    /// No pool survived scheduling
    #[error("There are no pools that matched your request")]
    NoValidPoolFound,

    /// Scheduling ended with more than one pool
    #[error("Multiple pools found ({count}), the filter chain must narrow to one")]
    MultiplePoolsFound { count: usize },

    /// Scheduler constructed with an empty chain
    #[error("There are no scheduling filters configured")]
    NoFiltersConfigured,

    /// Filter name not known to the registry
    #[error("Unknown scheduler filter: {name}")]
    UnknownFilter { name: String },

    // ========== Configuration / Runtime Errors ==========

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Shutdown in progress
    #[error("Shutdown in progress")]
    ShutdownInProgress,

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ZoneCtlError {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ZoneCtlError::Coordination { .. } | ZoneCtlError::ConnectionFailed { .. }
        )
    }

    /// Returns true for group-structure errors that are never retried
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ZoneCtlError::GroupNotCreated { .. } | ZoneCtlError::GroupAlreadyExists { .. }
        )
    }
}

impl From<config::ConfigError> for ZoneCtlError {
    fn from(err: config::ConfigError) -> Self {
        ZoneCtlError::Config(err.to_string())
    }
}

/// Result type alias for zonectl operations
pub type Result<T> = std::result::Result<T, ZoneCtlError>;
