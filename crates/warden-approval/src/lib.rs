//! Quorum-based access approval workflow for Warden
//!
//! Scopes whose owner opted into human review force privilege expansion
//! through this workflow: a request resolves to the single governing
//! policy by path specificity, collects reviews from the policy's
//! approvers, and on reaching quorum materializes an additional privilege
//! for the requester. Everything runs as stateless, request-scoped calls
//! coordinated through the shared store; the review critical section is a
//! single serialized transaction.

pub mod config;
pub mod notify;
pub mod policy;
pub mod workflow;

pub use config::ApprovalConfig;
pub use notify::{ApprovalNotifier, NoopNotifier, RequestNotification};
pub use policy::{ApprovalPolicyService, CreatePolicyInput, UpdatePolicyInput};
pub use workflow::{
    normalize_secret_path, verify_requested_permissions, AccessRequestService,
    CreateRequestInput, RequestFilters, RequestedScope, ReviewRequestInput,
};
