//! Row records of the persistence contract
//!
//! These mirror the relational rows the surrounding service layer owns.
//! Temporary grants carry their full temporal window; expired rows are
//! filtered at resolution time, never deleted by this library.

use serde::{Deserialize, Serialize};
use warden_core::ids::{
    EnvironmentId, GroupId, GroupMembershipId, IdentityId, MembershipId, OrgId, PolicyId,
    PrivilegeId, ProjectId, RequestId, ReviewId, RoleId, UserId,
};
use warden_core::principal::AuthMethod;
use warden_core::rules::RuleSet;
use warden_core::time::{is_expired, Timestamp};

/// Organization row, carrying the tenant-wide auth policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrgRecord {
    pub id: OrgId,
    /// Auth method the org mandates for its members, if any
    pub required_auth_method: Option<AuthMethod>,
    /// Explicit escape hatch from the mandated auth method
    pub bypass_org_auth: bool,
}

/// User group row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: GroupId,
    pub org_id: OrgId,
    pub name: String,
}

/// Custom project role row storing a serialized rule set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub id: RoleId,
    pub project_id: ProjectId,
    pub slug: String,
    pub name: String,
    pub permissions: RuleSet,
}

/// One role attached to a membership, possibly time-boxed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleAssignment {
    /// Built-in slug (`admin`, `member`, `viewer`, `no-access`) or the
    /// slug of a custom role
    pub role_slug: String,
    /// Set when the slug refers to a custom role row
    pub custom_role_id: Option<RoleId>,
    /// Custom role rules joined in by the store; `None` for built-ins
    pub permissions: Option<RuleSet>,
    pub is_temporary: bool,
    pub temporary_range: Option<String>,
    pub temporary_access_start_time: Option<Timestamp>,
    pub temporary_access_end_time: Option<Timestamp>,
}

impl RoleAssignment {
    /// A permanent assignment of the given role slug
    pub fn permanent(role_slug: impl Into<String>) -> Self {
        Self {
            role_slug: role_slug.into(),
            custom_role_id: None,
            permissions: None,
            is_temporary: false,
            temporary_range: None,
            temporary_access_start_time: None,
            temporary_access_end_time: None,
        }
    }

    /// Whether the assignment has lapsed at `now`
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.is_temporary && is_expired(self.temporary_access_end_time, now)
    }
}

/// Org-scope membership of a user, with joined role assignments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrgMembershipRecord {
    pub id: MembershipId,
    pub org_id: OrgId,
    pub user_id: UserId,
    pub username: String,
    pub metadata: Vec<(String, String)>,
    pub roles: Vec<RoleAssignment>,
}

/// Direct project membership of a user, with joined role assignments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipRecord {
    pub id: MembershipId,
    pub project_id: ProjectId,
    pub org_id: OrgId,
    pub user_id: UserId,
    pub username: String,
    /// Metadata attached to the user, exposed to condition templates
    pub metadata: Vec<(String, String)>,
    pub roles: Vec<RoleAssignment>,
}

/// Project membership of a machine identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityMembershipRecord {
    pub id: MembershipId,
    pub project_id: ProjectId,
    pub org_id: OrgId,
    pub identity_id: IdentityId,
    pub name: String,
    pub metadata: Vec<(String, String)>,
    pub roles: Vec<RoleAssignment>,
}

/// Project membership of a group, with the group's role assignments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupProjectMembershipRecord {
    pub id: GroupMembershipId,
    pub project_id: ProjectId,
    pub org_id: OrgId,
    pub group_id: GroupId,
    pub roles: Vec<RoleAssignment>,
}

/// The single membership an additional privilege attaches to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MembershipRef {
    /// A direct project membership
    Project(MembershipId),
    /// A group's project membership
    Group(GroupMembershipId),
}

/// Additional privilege row: a standalone rule set attached to a
/// membership, independent of any role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivilegeRecord {
    pub id: PrivilegeId,
    pub membership: MembershipRef,
    /// Unique per membership
    pub slug: String,
    pub permissions: RuleSet,
    pub is_temporary: bool,
    pub temporary_range: Option<String>,
    pub temporary_access_start_time: Option<Timestamp>,
    pub temporary_access_end_time: Option<Timestamp>,
}

impl PrivilegeRecord {
    /// Whether the privilege has lapsed at `now`
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.is_temporary && is_expired(self.temporary_access_end_time, now)
    }
}

/// A principal listed as an approver on a policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApproverRef {
    User { id: UserId, step: Option<u32> },
    Group { id: GroupId, step: Option<u32> },
}

/// A principal allowed to bypass a soft-enforced policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BypasserRef {
    User(UserId),
    Group(GroupId),
}

/// How strictly a policy is enforced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforcementLevel {
    Hard,
    Soft,
}

/// Access approval policy row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub id: PolicyId,
    pub project_id: ProjectId,
    pub env_id: EnvironmentId,
    pub env_slug: String,
    /// Empty string means the policy covers the whole environment
    pub secret_path: String,
    pub approvals_required: u32,
    pub enforcement_level: EnforcementLevel,
    pub allow_self_approvals: bool,
    pub approvers: Vec<ApproverRef>,
    pub bypassers: Vec<BypasserRef>,
    pub created_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

impl PolicyRecord {
    /// Whether the policy has been soft-deleted
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Users listed directly as approvers
    pub fn approver_user_ids(&self) -> Vec<UserId> {
        self.approvers
            .iter()
            .filter_map(|approver| match approver {
                ApproverRef::User { id, .. } => Some(*id),
                ApproverRef::Group { .. } => None,
            })
            .collect()
    }

    /// Groups listed as approvers
    pub fn approver_group_ids(&self) -> Vec<GroupId> {
        self.approvers
            .iter()
            .filter_map(|approver| match approver {
                ApproverRef::Group { id, .. } => Some(*id),
                ApproverRef::User { .. } => None,
            })
            .collect()
    }

    /// Whether the user is listed directly as an approver
    pub fn is_user_approver(&self, user_id: UserId) -> bool {
        self.approver_user_ids().contains(&user_id)
    }
}

/// Lifecycle state of an approval request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestStatus {
    Requested,
    UnderReview,
    Granted,
    Rejected,
}

impl RequestStatus {
    /// Whether the request still awaits a decision
    pub fn is_pending(&self) -> bool {
        matches!(self, RequestStatus::Requested | RequestStatus::UnderReview)
    }
}

/// Access approval request row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: RequestId,
    pub policy_id: PolicyId,
    pub requested_by_user_id: UserId,
    pub permissions: RuleSet,
    pub is_temporary: bool,
    pub temporary_range: Option<String>,
    /// Exactly one membership the grant will attach to
    pub membership: MembershipRef,
    /// Set once the request has been granted and materialized
    pub privilege_id: Option<PrivilegeId>,
    pub status: RequestStatus,
    pub created_at: Timestamp,
}

/// Verdict of a single reviewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

/// Reviewer row; at most one per (request, reviewer)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: ReviewId,
    pub request_id: RequestId,
    pub reviewer_user_id: UserId,
    pub status: ReviewStatus,
    pub created_at: Timestamp,
}
