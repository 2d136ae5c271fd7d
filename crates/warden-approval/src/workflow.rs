//! Access approval request state machine
//!
//! Lifecycle: `Requested → UnderReview → {Granted, Rejected}`. Creation
//! validates the requested scope and suppresses duplicates; review runs
//! eligibility and re-verification up front, then performs the review
//! insert, quorum recount, and conditional grant materialization inside
//! one serialized transaction. The unique request→privilege link guards
//! against double materialization even if two reviewers race.

use crate::config::ApprovalConfig;
use crate::notify::{ApprovalNotifier, RequestNotification};
use crate::policy::{approver_has_scope_access, display_path, ApprovalPolicyService};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;
use warden_core::ids::{PrivilegeId, ProjectId, RequestId, ReviewId, UserId};
use warden_core::principal::Actor;
use warden_core::rules::{validate_rule_set, Condition, RuleSet, SubjectTag, Verb};
use warden_core::rules::{FIELD_ENVIRONMENT, FIELD_SECRET_PATH};
use warden_core::time::{now, parse_temporary_range};
use warden_core::{Result, WardenError};
use warden_permission::{PermissionService, ResolveOptions};
use warden_store::records::{
    PolicyRecord, PrivilegeRecord, RequestRecord, RequestStatus, ReviewRecord, ReviewStatus,
};
use warden_store::traits::{GroupStore, PrivilegeStore, RequestStore};

/// Canonicalize a secret path: no trailing slash except for the root
pub fn normalize_secret_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let mut path = trimmed.to_string();
    while path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    path
}

/// The scope one access request asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedScope {
    pub env_slug: String,
    pub secret_path: String,
    pub access: Vec<Verb>,
}

/// Fields for a new access request
#[derive(Debug, Clone)]
pub struct CreateRequestInput {
    pub actor: Actor,
    pub options: ResolveOptions,
    pub project_id: ProjectId,
    pub permissions: RuleSet,
    pub is_temporary: bool,
    pub temporary_range: Option<String>,
}

/// One reviewer's verdict on a request
#[derive(Debug, Clone)]
pub struct ReviewRequestInput {
    pub actor: Actor,
    pub options: ResolveOptions,
    pub request_id: RequestId,
    pub status: ReviewStatus,
}

/// Optional narrowing of a request listing
#[derive(Debug, Clone, Default)]
pub struct RequestFilters {
    pub requested_by: Option<UserId>,
    pub env_slug: Option<String>,
}

/// The approval request workflow
pub struct AccessRequestService {
    policy_service: Arc<ApprovalPolicyService>,
    requests: Arc<dyn RequestStore>,
    privileges: Arc<dyn PrivilegeStore>,
    groups: Arc<dyn GroupStore>,
    permissions: Arc<PermissionService>,
    notifier: Arc<dyn ApprovalNotifier>,
    config: ApprovalConfig,
}

impl AccessRequestService {
    pub fn new(
        policy_service: Arc<ApprovalPolicyService>,
        requests: Arc<dyn RequestStore>,
        privileges: Arc<dyn PrivilegeStore>,
        groups: Arc<dyn GroupStore>,
        permissions: Arc<PermissionService>,
        notifier: Arc<dyn ApprovalNotifier>,
        config: ApprovalConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            policy_service,
            requests,
            privileges,
            groups,
            permissions,
            notifier,
            config,
        })
    }

    /// Create an access request for the governing policy of the requested
    /// scope. Any project member may request; duplicates of a still-live
    /// request or an active materialized grant are refused.
    pub async fn create_request(&self, input: CreateRequestInput) -> Result<RequestRecord> {
        let requester = input.actor.user_id().ok_or_else(|| {
            WardenError::bad_request("access requests can only be created by users")
        })?;
        let membership = self
            .permissions
            .get_project_permission(&input.actor, input.project_id, &input.options)
            .await?
            .membership;

        let scope = verify_requested_permissions(&input.permissions)?;
        if input.is_temporary {
            let range = input.temporary_range.as_deref().ok_or_else(|| {
                WardenError::bad_request("temporary access requests must carry a temporary range")
            })?;
            let duration = parse_temporary_range(range)?;
            if let Some(max) = self.config.max_temporary_range {
                if duration > max {
                    return Err(WardenError::bad_request(format!(
                        "temporary range '{range}' exceeds the configured maximum"
                    )));
                }
            }
        }

        let policy = self
            .policy_service
            .resolve_policy(input.project_id, &scope.env_slug, &scope.secret_path)
            .await?
            .ok_or_else(|| {
                WardenError::not_found(format!(
                    "no access approval policy covers {}/{} in project {}",
                    scope.env_slug,
                    display_path(&scope.secret_path),
                    input.project_id
                ))
            })?;

        self.reject_duplicates(&policy, requester, &input).await?;

        let request = self
            .requests
            .create_request(RequestRecord {
                id: RequestId::new(),
                policy_id: policy.id,
                requested_by_user_id: requester,
                permissions: input.permissions.clone(),
                is_temporary: input.is_temporary,
                temporary_range: input.temporary_range.clone(),
                membership,
                privilege_id: None,
                status: RequestStatus::Requested,
                created_at: now(),
            })
            .await?;
        debug!(request = %request.id, policy = %policy.id, "created access request");

        // Best-effort, at most once; a delivery failure never surfaces as
        // a workflow failure.
        let recipients = self.notification_recipients(&policy).await?;
        let notification = RequestNotification {
            request_id: request.id,
            project_id: input.project_id,
            requested_by_user_id: requester,
            environment: scope.env_slug.clone(),
            secret_path: scope.secret_path.clone(),
            access: scope.access.clone(),
            is_temporary: input.is_temporary,
            temporary_range: input.temporary_range.clone(),
        };
        if let Err(err) = self
            .notifier
            .notify_request_created(&recipients, &notification)
            .await
        {
            warn!(request = %request.id, %err, "approver notification failed");
        }

        Ok(request)
    }

    /// Submit one reviewer's verdict. On the quorum-reaching approval the
    /// request transitions to `Granted` and its privilege is materialized,
    /// all within a single serialized transaction.
    pub async fn review_request(&self, input: ReviewRequestInput) -> Result<RequestRecord> {
        let reviewer = input.actor.user_id().ok_or_else(|| {
            WardenError::bad_request("access requests can only be reviewed by users")
        })?;
        if input.status == ReviewStatus::Pending {
            return Err(WardenError::bad_request(
                "a review must be either approved or rejected",
            ));
        }

        let request = self
            .requests
            .find_request(input.request_id)
            .await?
            .ok_or_else(|| {
                WardenError::not_found(format!("approval request {}", input.request_id))
            })?;
        let policy = self.policy_service.require_policy(request.policy_id).await?;

        let permission = self
            .permissions
            .get_project_permission(&input.actor, policy.project_id, &input.options)
            .await?;

        if reviewer == request.requested_by_user_id && !policy.allow_self_approvals {
            return Err(WardenError::forbidden(format!(
                "requester {reviewer} may not review their own request under this policy"
            )));
        }
        let eligible = self.is_listed_approver(&policy, reviewer).await?
            || permission.has_role("admin")
            || self.is_org_admin(&input.actor, &input.options).await?;
        if !eligible {
            return Err(WardenError::forbidden(format!(
                "user {reviewer} is not an approver for request {}",
                request.id
            )));
        }
        if !approver_has_scope_access(&self.permissions, reviewer, input.actor.org_id(), &policy)
            .await?
        {
            return Err(WardenError::forbidden(format!(
                "approver {reviewer} no longer has access to {}/{}",
                policy.env_slug,
                display_path(&policy.secret_path)
            )));
        }

        let mut tx = self.requests.request_transaction(request.id).await?;
        let outcome = async {
            let fresh = tx.request().await?;
            let reviews = tx.reviews().await?;
            if fresh.status == RequestStatus::Rejected
                || reviews
                    .iter()
                    .any(|review| review.status == ReviewStatus::Rejected)
            {
                return Err(WardenError::bad_request(format!(
                    "request {} has already been rejected by another reviewer",
                    fresh.id
                )));
            }

            tx.insert_review(ReviewRecord {
                id: ReviewId::new(),
                request_id: fresh.id,
                reviewer_user_id: reviewer,
                status: input.status,
                created_at: now(),
            })
            .await?;

            if input.status == ReviewStatus::Rejected {
                tx.set_status(RequestStatus::Rejected).await?;
                return Ok(());
            }

            let approvals = reviews
                .iter()
                .filter(|review| review.status == ReviewStatus::Approved)
                .count() as u32
                + 1;
            if approvals == policy.approvals_required {
                let privilege_id = self.materialize_privilege(&mut tx, &fresh).await?;
                tx.link_privilege(privilege_id).await?;
                tx.set_status(RequestStatus::Granted).await?;
                debug!(request = %fresh.id, privilege = %privilege_id, "request granted");
            } else if fresh.status == RequestStatus::Requested {
                tx.set_status(RequestStatus::UnderReview).await?;
            }
            Ok(())
        }
        .await;

        match outcome {
            Ok(()) => tx.commit().await?,
            // Dropping the transaction discards the staged review and any
            // staged grant: all-or-nothing.
            Err(err) => return Err(err),
        }

        self.requests
            .find_request(input.request_id)
            .await?
            .ok_or_else(|| {
                WardenError::internal(format!(
                    "request {} vanished after review",
                    input.request_id
                ))
            })
    }

    /// Revoke the materialized privilege of a granted request. Only a
    /// listed approver may revoke, and only once a privilege exists; the
    /// request row and its review history stay behind.
    pub async fn delete_request(
        &self,
        actor: &Actor,
        options: &ResolveOptions,
        request_id: RequestId,
    ) -> Result<RequestRecord> {
        let caller = actor.user_id().ok_or_else(|| {
            WardenError::bad_request("access requests can only be revoked by users")
        })?;
        let request = self
            .requests
            .find_request(request_id)
            .await?
            .ok_or_else(|| WardenError::not_found(format!("approval request {request_id}")))?;
        let policy = self.policy_service.require_policy(request.policy_id).await?;

        // Membership and cross-org validation for the caller.
        self.permissions
            .get_project_permission(actor, policy.project_id, options)
            .await?;
        if !self.is_listed_approver(&policy, caller).await? {
            return Err(WardenError::forbidden(format!(
                "user {caller} is not a listed approver on policy {}",
                policy.id
            )));
        }

        let privilege_id = request.privilege_id.ok_or_else(|| {
            WardenError::bad_request(format!(
                "request {request_id} carries no materialized privilege to revoke"
            ))
        })?;
        match self.privileges.delete_privilege(privilege_id).await {
            Ok(()) => {}
            Err(WardenError::NotFound { .. }) => {}
            Err(err) => return Err(err),
        }
        self.requests.clear_privilege_link(request_id).await?;
        debug!(request = %request_id, privilege = %privilege_id, "revoked materialized privilege");

        self.requests
            .find_request(request_id)
            .await?
            .ok_or_else(|| WardenError::not_found(format!("approval request {request_id}")))
    }

    /// Requests across a project's live policies, newest first
    pub async fn list_requests(
        &self,
        actor: &Actor,
        options: &ResolveOptions,
        project_id: ProjectId,
        filters: &RequestFilters,
    ) -> Result<Vec<RequestRecord>> {
        self.permissions
            .get_project_permission(actor, project_id, options)
            .await?;
        let policies = self.policy_service.list_policies(project_id).await?;
        let mut requests = Vec::new();
        for policy in &policies {
            let mut matching = self.requests.find_requests_by_policy(policy.id).await?;
            if let Some(env_slug) = &filters.env_slug {
                if &policy.env_slug != env_slug {
                    continue;
                }
            }
            if let Some(requested_by) = filters.requested_by {
                matching.retain(|request| request.requested_by_user_id == requested_by);
            }
            requests.extend(matching);
        }
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    /// Count of requests still awaiting a decision in the project
    pub async fn pending_count(
        &self,
        actor: &Actor,
        options: &ResolveOptions,
        project_id: ProjectId,
    ) -> Result<usize> {
        let requests = self
            .list_requests(actor, options, project_id, &RequestFilters::default())
            .await?;
        Ok(requests
            .iter()
            .filter(|request| request.status.is_pending())
            .count())
    }

    /// Duplicate suppression: an identical non-rejected pending request,
    /// or an active materialized privilege for the same tuple, blocks a
    /// new request.
    async fn reject_duplicates(
        &self,
        policy: &PolicyRecord,
        requester: UserId,
        input: &CreateRequestInput,
    ) -> Result<()> {
        let duplicates = self
            .requests
            .find_duplicate_requests(policy.id, requester, &input.permissions, input.is_temporary)
            .await?;
        let current = now();
        for duplicate in duplicates {
            if let Some(privilege_id) = duplicate.privilege_id {
                let privilege = self.privileges.find_privilege(privilege_id).await?;
                if let Some(privilege) = privilege {
                    if !privilege.is_temporary || !privilege.is_expired(current) {
                        return Err(WardenError::conflict(format!(
                            "an active privilege with the same criteria already exists (request {})",
                            duplicate.id
                        )));
                    }
                }
            } else {
                let reviews = self.requests.find_reviews(duplicate.id).await?;
                let rejected = reviews
                    .iter()
                    .any(|review| review.status == ReviewStatus::Rejected);
                if !rejected {
                    return Err(WardenError::conflict(format!(
                        "a pending access request with the same criteria already exists (request {})",
                        duplicate.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Whether the actor holds the admin role at org scope
    async fn is_org_admin(&self, actor: &Actor, options: &ResolveOptions) -> Result<bool> {
        match self.permissions.get_org_permission(actor, options).await {
            Ok(permission) => Ok(permission.has_role("admin")),
            Err(WardenError::Forbidden { .. } | WardenError::BadRequest { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Whether the user is a listed approver, directly or via a group
    async fn is_listed_approver(&self, policy: &PolicyRecord, user_id: UserId) -> Result<bool> {
        if policy.is_user_approver(user_id) {
            return Ok(true);
        }
        for group_id in policy.approver_group_ids() {
            if self.groups.user_in_group(group_id, user_id).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Everyone who should hear about a new request under the policy
    async fn notification_recipients(&self, policy: &PolicyRecord) -> Result<Vec<UserId>> {
        let mut recipients = policy.approver_user_ids();
        for group_id in policy.approver_group_ids() {
            recipients.extend(self.groups.group_member_user_ids(group_id).await?);
        }
        recipients.sort();
        recipients.dedup();
        Ok(recipients)
    }

    /// Materialize the granted privilege inside the review transaction:
    /// permanent when the request is not temporary, otherwise running from
    /// now for the parsed range. A temporary request with no range at
    /// grant time aborts the transaction.
    async fn materialize_privilege(
        &self,
        tx: &mut Box<dyn warden_store::traits::RequestTransaction>,
        request: &RequestRecord,
    ) -> Result<PrivilegeId> {
        let slug = format!(
            "{}-{}",
            self.config.privilege_slug_prefix,
            slug_suffix()
        );
        let privilege = if request.is_temporary {
            let range = request.temporary_range.as_deref().ok_or_else(|| {
                WardenError::bad_request(format!(
                    "temporary request {} has no temporary range at grant time",
                    request.id
                ))
            })?;
            let duration = parse_temporary_range(range)?;
            let start = now();
            PrivilegeRecord {
                id: PrivilegeId::new(),
                membership: request.membership,
                slug,
                permissions: request.permissions.clone(),
                is_temporary: true,
                temporary_range: Some(range.to_string()),
                temporary_access_start_time: Some(start),
                temporary_access_end_time: Some(start + duration),
            }
        } else {
            PrivilegeRecord {
                id: PrivilegeId::new(),
                membership: request.membership,
                slug,
                permissions: request.permissions.clone(),
                is_temporary: false,
                temporary_range: None,
                temporary_access_start_time: None,
                temporary_access_end_time: None,
            }
        };
        let created = tx.create_privilege(privilege).await?;
        Ok(created.id)
    }
}

/// Validate the requested permission set and extract its single scope.
///
/// A request targets exactly the secrets subject, non-inverted, with one
/// environment and one secret path across all of its rules.
pub fn verify_requested_permissions(permissions: &RuleSet) -> Result<RequestedScope> {
    validate_rule_set(permissions)?;
    if permissions.is_empty() {
        return Err(WardenError::bad_request(
            "an access request must ask for at least one permission",
        ));
    }

    let mut env_slug: Option<String> = None;
    let mut secret_path: Option<String> = None;
    let mut access: Vec<Verb> = Vec::new();

    for rule in permissions {
        if rule.subject != SubjectTag::Secrets {
            return Err(WardenError::bad_request(format!(
                "access requests may only target secrets, not '{}'",
                rule.subject
            )));
        }
        if rule.inverted {
            return Err(WardenError::bad_request(
                "access requests may not contain inverted rules",
            ));
        }
        for verb in &rule.actions {
            if !access.contains(verb) {
                access.push(*verb);
            }
        }

        let conditions = rule.conditions.as_ref().ok_or_else(|| {
            WardenError::bad_request(
                "access request rules must scope an environment and secret path",
            )
        })?;

        let env = match conditions.get(FIELD_ENVIRONMENT) {
            Some(Condition::Eq(value)) => value.clone(),
            Some(_) => {
                return Err(WardenError::bad_request(
                    "access requests must pin the environment with an equality condition",
                ))
            }
            None => {
                return Err(WardenError::bad_request(
                    "access request rules must name an environment",
                ))
            }
        };
        match &env_slug {
            Some(existing) if *existing != env => {
                return Err(WardenError::bad_request(
                    "access requests must target a single environment",
                ))
            }
            _ => env_slug = Some(env),
        }

        let path = match conditions.get(FIELD_SECRET_PATH) {
            Some(Condition::Eq(value)) | Some(Condition::Glob(value)) => {
                normalize_secret_path(value)
            }
            Some(_) => {
                return Err(WardenError::bad_request(
                    "access requests must scope the secret path by equality or glob",
                ))
            }
            None => "/".to_string(),
        };
        match &secret_path {
            Some(existing) if *existing != path => {
                return Err(WardenError::bad_request(
                    "access requests must target a single secret path",
                ))
            }
            _ => secret_path = Some(path),
        }
    }

    Ok(RequestedScope {
        env_slug: env_slug
            .ok_or_else(|| WardenError::bad_request("access request names no environment"))?,
        secret_path: secret_path.unwrap_or_else(|| "/".to_string()),
        access,
    })
}

fn slug_suffix() -> String {
    let simple = Uuid::new_v4().simple().to_string();
    simple[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use warden_core::rules::{ConditionSet, Rule};

    fn secrets_request(env: &str, path: Condition, verbs: &[Verb]) -> RuleSet {
        let mut conditions = ConditionSet::new();
        conditions.insert(FIELD_ENVIRONMENT.into(), Condition::Eq(env.into()));
        conditions.insert(FIELD_SECRET_PATH.into(), path);
        RuleSet(vec![
            Rule::allow(verbs.iter().copied(), SubjectTag::Secrets).with_conditions(conditions)
        ])
    }

    #[test]
    fn extracts_the_single_scope() {
        let scope = verify_requested_permissions(&secrets_request(
            "prod",
            Condition::Eq("/db/creds/".into()),
            &[Verb::Read, Verb::Edit],
        ))
        .unwrap();
        assert_eq!(scope.env_slug, "prod");
        assert_eq!(scope.secret_path, "/db/creds");
        assert_eq!(scope.access, vec![Verb::Read, Verb::Edit]);
    }

    #[test]
    fn rejects_non_secrets_subjects_and_inverted_rules() {
        let rules = RuleSet(vec![Rule::allow([Verb::Read], SubjectTag::Member)]);
        assert_matches!(
            verify_requested_permissions(&rules),
            Err(WardenError::BadRequest { message }) if message.contains("secrets")
        );

        let mut conditions = ConditionSet::new();
        conditions.insert(FIELD_ENVIRONMENT.into(), Condition::Eq("prod".into()));
        let rules = RuleSet(vec![Rule::allow([Verb::Read], SubjectTag::Secrets)
            .with_conditions(conditions)
            .inverted()]);
        assert_matches!(
            verify_requested_permissions(&rules),
            Err(WardenError::BadRequest { message }) if message.contains("inverted")
        );
    }

    #[test]
    fn rejects_mixed_environments() {
        let mut first = secrets_request("prod", Condition::Eq("/db".into()), &[Verb::Read]);
        let second = secrets_request("dev", Condition::Eq("/db".into()), &[Verb::Edit]);
        first.0.extend(second.0);
        assert_matches!(
            verify_requested_permissions(&first),
            Err(WardenError::BadRequest { message }) if message.contains("single environment")
        );
    }

    #[test]
    fn normalizes_paths() {
        assert_eq!(normalize_secret_path("/db/creds/"), "/db/creds");
        assert_eq!(normalize_secret_path("/"), "/");
        assert_eq!(normalize_secret_path(""), "");
        assert_eq!(normalize_secret_path("  /app  "), "/app");
    }
}
