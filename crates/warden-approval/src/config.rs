//! Workflow configuration

use chrono::Duration;
use warden_core::{Result, WardenError};

/// Tunables for the approval workflow
#[derive(Debug, Clone)]
pub struct ApprovalConfig {
    /// Prefix for the slugs of materialized privileges
    pub privilege_slug_prefix: String,
    /// Upper bound on how long a temporary grant may run, if any
    pub max_temporary_range: Option<Duration>,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            privilege_slug_prefix: "requested-privilege".to_string(),
            max_temporary_range: None,
        }
    }
}

impl ApprovalConfig {
    /// Validate field constraints, naming the offending field
    pub fn validate(&self) -> Result<()> {
        if self.privilege_slug_prefix.trim().is_empty() {
            return Err(WardenError::bad_request(
                "field 'privilege_slug_prefix' must not be empty",
            ));
        }
        if let Some(max) = self.max_temporary_range {
            if max <= Duration::zero() {
                return Err(WardenError::bad_request(
                    "field 'max_temporary_range' must be positive",
                ));
            }
        }
        Ok(())
    }
}
