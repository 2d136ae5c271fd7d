//! Access approval policies
//!
//! Policy CRUD with approver verification, and resolution of the single
//! governing policy for a secret path by specificity: an exact literal
//! path outranks a glob, which outranks an environment-wide policy; ties
//! fall to the earliest-created policy. Soft-deleting a policy cascades
//! to its requests.

use crate::workflow::normalize_secret_path;
use std::sync::Arc;
use tracing::{debug, warn};
use warden_core::ids::{OrgId, PolicyId, ProjectId, UserId};
use warden_core::rules::{compile_glob, has_glob_meta, SubjectTag, Verb};
use warden_core::time::now;
use warden_core::{Result, WardenError};
use warden_permission::{PermissionService, SubjectAttrs};
use warden_store::records::{ApproverRef, BypasserRef, EnforcementLevel, PolicyRecord};
use warden_store::traits::{GroupStore, PolicyStore, PrivilegeStore, RequestStore};

/// Fields for a new approval policy
#[derive(Debug, Clone)]
pub struct CreatePolicyInput {
    pub project_id: ProjectId,
    pub org_id: OrgId,
    pub env_id: warden_core::ids::EnvironmentId,
    pub env_slug: String,
    /// Empty for an environment-wide policy; literal or glob otherwise
    pub secret_path: String,
    pub approvals_required: u32,
    pub enforcement_level: EnforcementLevel,
    pub allow_self_approvals: bool,
    pub approvers: Vec<ApproverRef>,
    pub bypassers: Vec<BypasserRef>,
}

/// Partial update of an existing policy; `None` keeps the stored value
#[derive(Debug, Clone, Default)]
pub struct UpdatePolicyInput {
    pub secret_path: Option<String>,
    pub approvals_required: Option<u32>,
    pub enforcement_level: Option<EnforcementLevel>,
    pub allow_self_approvals: Option<bool>,
    pub approvers: Option<Vec<ApproverRef>>,
    pub bypassers: Option<Vec<BypasserRef>>,
}

/// Policy CRUD and resolution
pub struct ApprovalPolicyService {
    policies: Arc<dyn PolicyStore>,
    requests: Arc<dyn RequestStore>,
    privileges: Arc<dyn PrivilegeStore>,
    groups: Arc<dyn GroupStore>,
    permissions: Arc<PermissionService>,
}

impl ApprovalPolicyService {
    pub fn new(
        policies: Arc<dyn PolicyStore>,
        requests: Arc<dyn RequestStore>,
        privileges: Arc<dyn PrivilegeStore>,
        groups: Arc<dyn GroupStore>,
        permissions: Arc<PermissionService>,
    ) -> Self {
        Self {
            policies,
            requests,
            privileges,
            groups,
            permissions,
        }
    }

    /// Create a policy after validating its shape and verifying that every
    /// named user approver can actually reach the scope it governs.
    pub async fn create_policy(&self, input: CreatePolicyInput) -> Result<PolicyRecord> {
        if input.env_slug.trim().is_empty() {
            return Err(WardenError::bad_request(
                "policy environment slug must not be empty",
            ));
        }
        let secret_path = normalize_secret_path(&input.secret_path);
        validate_policy_shape(input.approvals_required, &input.approvers, &secret_path)?;

        let policy = PolicyRecord {
            id: PolicyId::new(),
            project_id: input.project_id,
            env_id: input.env_id,
            env_slug: input.env_slug,
            secret_path,
            approvals_required: input.approvals_required,
            enforcement_level: input.enforcement_level,
            allow_self_approvals: input.allow_self_approvals,
            approvers: input.approvers,
            bypassers: input.bypassers,
            created_at: now(),
            deleted_at: None,
        };
        self.verify_listed_approvers(&policy, input.org_id).await?;

        let created = self.policies.create_policy(policy).await?;
        debug!(policy = %created.id, env = %created.env_slug, "created approval policy");
        Ok(created)
    }

    /// Apply a partial update, re-running shape validation and approver
    /// verification on the resulting row.
    pub async fn update_policy(
        &self,
        policy_id: PolicyId,
        org_id: OrgId,
        input: UpdatePolicyInput,
    ) -> Result<PolicyRecord> {
        let mut policy = self.require_policy(policy_id).await?;
        if let Some(secret_path) = input.secret_path {
            policy.secret_path = normalize_secret_path(&secret_path);
        }
        if let Some(approvals_required) = input.approvals_required {
            policy.approvals_required = approvals_required;
        }
        if let Some(enforcement_level) = input.enforcement_level {
            policy.enforcement_level = enforcement_level;
        }
        if let Some(allow_self_approvals) = input.allow_self_approvals {
            policy.allow_self_approvals = allow_self_approvals;
        }
        if let Some(approvers) = input.approvers {
            policy.approvers = approvers;
        }
        if let Some(bypassers) = input.bypassers {
            policy.bypassers = bypassers;
        }

        validate_policy_shape(policy.approvals_required, &policy.approvers, &policy.secret_path)?;
        self.verify_listed_approvers(&policy, org_id).await?;
        self.policies.update_policy(policy).await
    }

    /// Soft-delete a policy and cascade: every still-pending request under
    /// it is rejected, and privileges already granted under its requests
    /// are removed.
    pub async fn delete_policy(&self, policy_id: PolicyId) -> Result<PolicyRecord> {
        let deleted = self.policies.soft_delete_policy(policy_id, now()).await?;
        let requests = self.requests.find_requests_by_policy(policy_id).await?;
        for request in requests {
            if request.status.is_pending() {
                self.requests
                    .set_request_status(request.id, warden_store::records::RequestStatus::Rejected)
                    .await?;
            }
            if let Some(privilege_id) = request.privilege_id {
                match self.privileges.delete_privilege(privilege_id).await {
                    Ok(()) => {}
                    Err(WardenError::NotFound { .. }) => {}
                    Err(err) => return Err(err),
                }
                self.requests.clear_privilege_link(request.id).await?;
            }
        }
        debug!(policy = %policy_id, "soft-deleted approval policy and cascaded");
        Ok(deleted)
    }

    /// Non-deleted policies of a project
    pub async fn list_policies(&self, project_id: ProjectId) -> Result<Vec<PolicyRecord>> {
        self.policies.list_policies(project_id).await
    }

    /// Fetch one policy or fail `NotFound`
    pub async fn require_policy(&self, policy_id: PolicyId) -> Result<PolicyRecord> {
        self.policies
            .find_policy(policy_id)
            .await?
            .filter(|policy| !policy.is_deleted())
            .ok_or_else(|| WardenError::not_found(format!("approval policy {policy_id}")))
    }

    /// Select the single policy governing (environment, path), or `None`
    /// when no policy matches and no approval is required.
    pub async fn resolve_policy(
        &self,
        project_id: ProjectId,
        env_slug: &str,
        secret_path: &str,
    ) -> Result<Option<PolicyRecord>> {
        let candidates = self
            .policies
            .find_policies_for_env(project_id, env_slug)
            .await?;
        let path = normalize_secret_path(secret_path);
        let mut best: Option<(u8, PolicyRecord)> = None;
        for policy in candidates {
            let Some(score) = policy_match_score(&policy.secret_path, &path) else {
                continue;
            };
            let better = match &best {
                None => true,
                Some((best_score, best_policy)) => {
                    score > *best_score
                        || (score == *best_score && policy.created_at < best_policy.created_at)
                }
            };
            if better {
                best = Some((score, policy));
            }
        }
        Ok(best.map(|(_, policy)| policy))
    }

    /// Definition-time verification: every named user approver must hold
    /// create access on secrets in the governed scope, and every group
    /// reference must resolve.
    async fn verify_listed_approvers(&self, policy: &PolicyRecord, org_id: OrgId) -> Result<()> {
        for group_id in policy.approver_group_ids() {
            if !self.groups.group_exists(group_id).await? {
                return Err(WardenError::bad_request(format!(
                    "approver group {group_id} does not exist"
                )));
            }
        }
        for user_id in policy.approver_user_ids() {
            if !approver_has_scope_access(&self.permissions, user_id, org_id, policy).await? {
                return Err(WardenError::bad_request(format!(
                    "named approver {user_id} lacks access to {}/{} in project {}",
                    policy.env_slug,
                    display_path(&policy.secret_path),
                    policy.project_id
                )));
            }
        }
        Ok(())
    }
}

/// Score a policy path against a request path: exact literal = 2,
/// matching glob = 1, environment-wide = 0, no match = `None`.
fn policy_match_score(policy_path: &str, request_path: &str) -> Option<u8> {
    if policy_path.is_empty() {
        return Some(0);
    }
    if !has_glob_meta(policy_path) {
        return (policy_path == request_path).then_some(2);
    }
    match glob::Pattern::new(policy_path) {
        Ok(pattern) if pattern.matches(request_path) => Some(1),
        Ok(_) => None,
        Err(err) => {
            warn!(pattern = policy_path, %err, "skipping policy with invalid glob path");
            None
        }
    }
}

/// Shape invariants shared by create and update
fn validate_policy_shape(
    approvals_required: u32,
    approvers: &[ApproverRef],
    secret_path: &str,
) -> Result<()> {
    if approvals_required == 0 {
        return Err(WardenError::bad_request(
            "a policy must require at least one approval",
        ));
    }
    if approvers.is_empty() {
        return Err(WardenError::bad_request(
            "a policy must list at least one approver",
        ));
    }
    let user_only = approvers
        .iter()
        .all(|approver| matches!(approver, ApproverRef::User { .. }));
    if user_only && approvals_required as usize > approvers.len() {
        return Err(WardenError::bad_request(format!(
            "policy requires {approvals_required} approvals but lists only {} approvers",
            approvers.len()
        )));
    }
    if !secret_path.is_empty() && has_glob_meta(secret_path) {
        compile_glob(secret_path)?;
    }
    Ok(())
}

/// Whether the user's effective permission reaches the policy's scope.
///
/// Shared by definition-time verification (failure is `BadRequest`) and
/// review-time re-verification (failure is `Forbidden`).
pub(crate) async fn approver_has_scope_access(
    permissions: &PermissionService,
    user_id: UserId,
    org_id: OrgId,
    policy: &PolicyRecord,
) -> Result<bool> {
    let resolved = permissions
        .get_user_project_ability(user_id, org_id, policy.project_id)
        .await;
    let permission = match resolved {
        Ok(permission) => permission,
        Err(WardenError::Forbidden { .. }) => return Ok(false),
        Err(err) => return Err(err),
    };
    let attrs = SubjectAttrs::secret(policy.env_slug.clone(), display_path(&policy.secret_path));
    Ok(permission.ability.can(Verb::Create, SubjectTag::Secrets, &attrs))
}

pub(crate) fn display_path(secret_path: &str) -> String {
    if secret_path.is_empty() {
        "/".to_string()
    } else {
        secret_path.to_string()
    }
}
