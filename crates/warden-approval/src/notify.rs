//! Best-effort notification of approvers
//!
//! Dispatch happens after the workflow's own writes commit, is attempted
//! at most once, and a failure is logged and swallowed. It must never
//! fail or roll back the workflow.

use async_trait::async_trait;
use warden_core::ids::{ProjectId, RequestId, UserId};
use warden_core::rules::Verb;
use warden_core::Result;

/// Context handed to the notification collaborator when a request is
/// created
#[derive(Debug, Clone, PartialEq)]
pub struct RequestNotification {
    pub request_id: RequestId,
    pub project_id: ProjectId,
    pub requested_by_user_id: UserId,
    pub environment: String,
    pub secret_path: String,
    pub access: Vec<Verb>,
    pub is_temporary: bool,
    pub temporary_range: Option<String>,
}

/// Notification collaborator; delivery is out of scope for this core
#[async_trait]
pub trait ApprovalNotifier: Send + Sync {
    async fn notify_request_created(
        &self,
        recipients: &[UserId],
        context: &RequestNotification,
    ) -> Result<()>;
}

/// Notifier that drops every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl ApprovalNotifier for NoopNotifier {
    async fn notify_request_created(
        &self,
        _recipients: &[UserId],
        _context: &RequestNotification,
    ) -> Result<()> {
        Ok(())
    }
}
