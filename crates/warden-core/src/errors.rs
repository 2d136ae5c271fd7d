//! Unified error type for Warden operations
//!
//! One enum covers the whole taxonomy so callers can match on intent
//! (missing entity, invalid input, denied access, boundary violation,
//! conflicting state) without unwrapping nested error chains. Every
//! message names the offending entity so responses stay actionable.

use crate::rules::MissingPermission;
use serde::{Deserialize, Serialize};

/// Unified error type for all Warden operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum WardenError {
    /// Referenced role, policy, request, or privilege does not exist
    #[error("Not found: {message}")]
    NotFound {
        /// Error message naming the missing entity
        message: String,
    },

    /// Malformed or inconsistent input, rejected before any mutation
    #[error("Bad request: {message}")]
    BadRequest {
        /// Error message describing the invalid input
        message: String,
    },

    /// The actor is not allowed to perform the operation
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Error message describing the denied access
        message: String,
    },

    /// A grantor attempted to grant more access than it holds
    #[error("Permission boundary exceeded: {message}")]
    PermissionBoundary {
        /// Error message naming the grant that failed
        message: String,
        /// The specific permissions the grantor is missing
        missing_permissions: Vec<MissingPermission>,
    },

    /// A duplicate active request or grant already exists
    #[error("Conflict: {message}")]
    Conflict {
        /// Error message naming the conflicting entity
        message: String,
    },

    /// Persistence collaborator failure
    #[error("Storage error: {message}")]
    Storage {
        /// Error message describing the storage failure
        message: String,
    },

    /// Invariant violation inside Warden itself
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal fault
        message: String,
    },
}

impl WardenError {
    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create a forbidden error
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Create a permission boundary error carrying the missing permissions
    pub fn permission_boundary(
        message: impl Into<String>,
        missing_permissions: Vec<MissingPermission>,
    ) -> Self {
        Self::PermissionBoundary {
            message: message.into(),
            missing_permissions,
        }
    }

    /// Create a conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Result alias used across all Warden crates
pub type Result<T> = std::result::Result<T, WardenError>;
