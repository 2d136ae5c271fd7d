//! Async store traits: the persistence contract
//!
//! Contract-only, no SQL dialect. The surrounding service layer provides
//! the real relational implementation; [`crate::memory::MemoryStore`]
//! provides an in-process one for tests and embedding. All traits are
//! object-safe so services hold `Arc<dyn …>`.

use crate::records::{
    GroupProjectMembershipRecord, IdentityMembershipRecord, MembershipRecord, MembershipRef,
    OrgMembershipRecord, OrgRecord, PolicyRecord, PrivilegeRecord, RequestRecord, RequestStatus,
    ReviewRecord,
};
use async_trait::async_trait;
use warden_core::ids::{
    GroupId, IdentityId, MembershipId, OrgId, PolicyId, PrivilegeId, ProjectId, RequestId, UserId,
};
use warden_core::rules::RuleSet;
use warden_core::time::Timestamp;
use warden_core::Result;

/// Organization lookups
#[async_trait]
pub trait OrgStore: Send + Sync {
    async fn find_org(&self, org_id: OrgId) -> Result<Option<OrgRecord>>;
}

/// Group rosters
#[async_trait]
pub trait GroupStore: Send + Sync {
    /// Whether the group exists at all
    async fn group_exists(&self, group_id: GroupId) -> Result<bool>;

    /// All user ids that belong to the group
    async fn group_member_user_ids(&self, group_id: GroupId) -> Result<Vec<UserId>>;

    /// Whether the user belongs to the group
    async fn user_in_group(&self, group_id: GroupId, user_id: UserId) -> Result<bool>;
}

/// Membership rows with their joined role assignments
#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn find_org_membership(
        &self,
        org_id: OrgId,
        user_id: UserId,
    ) -> Result<Option<OrgMembershipRecord>>;

    async fn find_user_membership(
        &self,
        project_id: ProjectId,
        user_id: UserId,
    ) -> Result<Option<MembershipRecord>>;

    async fn find_identity_membership(
        &self,
        project_id: ProjectId,
        identity_id: IdentityId,
    ) -> Result<Option<IdentityMembershipRecord>>;

    /// Group project memberships whose group contains the user
    async fn find_group_memberships_for_user(
        &self,
        project_id: ProjectId,
        user_id: UserId,
    ) -> Result<Vec<GroupProjectMembershipRecord>>;

    async fn find_membership_by_id(
        &self,
        membership_id: MembershipId,
    ) -> Result<Option<MembershipRecord>>;
}

/// Additional privilege rows
#[async_trait]
pub trait PrivilegeStore: Send + Sync {
    async fn find_privilege(&self, privilege_id: PrivilegeId)
        -> Result<Option<PrivilegeRecord>>;

    /// All privileges attached to one membership
    async fn find_privileges(&self, membership: MembershipRef) -> Result<Vec<PrivilegeRecord>>;

    /// Insert a privilege; the slug is unique per membership
    async fn create_privilege(&self, privilege: PrivilegeRecord) -> Result<PrivilegeRecord>;

    async fn delete_privilege(&self, privilege_id: PrivilegeId) -> Result<()>;
}

/// Access approval policy rows
#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn create_policy(&self, policy: PolicyRecord) -> Result<PolicyRecord>;

    /// Replace an existing policy row
    async fn update_policy(&self, policy: PolicyRecord) -> Result<PolicyRecord>;

    async fn find_policy(&self, policy_id: PolicyId) -> Result<Option<PolicyRecord>>;

    /// Non-deleted policies for one project environment
    async fn find_policies_for_env(
        &self,
        project_id: ProjectId,
        env_slug: &str,
    ) -> Result<Vec<PolicyRecord>>;

    /// Non-deleted policies for a project
    async fn list_policies(&self, project_id: ProjectId) -> Result<Vec<PolicyRecord>>;

    async fn soft_delete_policy(
        &self,
        policy_id: PolicyId,
        deleted_at: Timestamp,
    ) -> Result<PolicyRecord>;
}

/// Access approval request rows and their reviews
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn create_request(&self, request: RequestRecord) -> Result<RequestRecord>;

    async fn find_request(&self, request_id: RequestId) -> Result<Option<RequestRecord>>;

    async fn find_requests_by_policy(&self, policy_id: PolicyId) -> Result<Vec<RequestRecord>>;

    /// Requests matching the duplicate-suppression tuple
    async fn find_duplicate_requests(
        &self,
        policy_id: PolicyId,
        requested_by_user_id: UserId,
        permissions: &RuleSet,
        is_temporary: bool,
    ) -> Result<Vec<RequestRecord>>;

    async fn find_reviews(&self, request_id: RequestId) -> Result<Vec<ReviewRecord>>;

    async fn set_request_status(
        &self,
        request_id: RequestId,
        status: RequestStatus,
    ) -> Result<()>;

    /// Detach a revoked privilege from its request, keeping the row
    async fn clear_privilege_link(&self, request_id: RequestId) -> Result<()>;

    /// Open the serialized critical section for one request's reviews.
    ///
    /// Review insert, quorum recount, and conditional grant materialization
    /// must all happen through the returned transaction; concurrent
    /// transactions on the same request are strictly ordered.
    async fn request_transaction(
        &self,
        request_id: RequestId,
    ) -> Result<Box<dyn RequestTransaction>>;
}

/// Serialized transaction scope over one approval request.
///
/// Writes are staged and applied atomically on [`commit`]; dropping the
/// transaction without committing discards every staged write.
///
/// [`commit`]: RequestTransaction::commit
#[async_trait]
pub trait RequestTransaction: Send {
    /// The request row as seen inside the transaction
    async fn request(&self) -> Result<RequestRecord>;

    /// Review rows as seen inside the transaction, staged inserts included
    async fn reviews(&self) -> Result<Vec<ReviewRecord>>;

    /// Stage a review insert; fails with `Conflict` if the reviewer
    /// already has a review on this request
    async fn insert_review(&mut self, review: ReviewRecord) -> Result<ReviewRecord>;

    /// Stage a privilege insert
    async fn create_privilege(&mut self, privilege: PrivilegeRecord) -> Result<PrivilegeRecord>;

    /// Stage linking the request to its materialized privilege; fails with
    /// `Conflict` if a link already exists (double-materialization guard)
    async fn link_privilege(&mut self, privilege_id: PrivilegeId) -> Result<()>;

    /// Stage a status transition
    async fn set_status(&mut self, status: RequestStatus) -> Result<()>;

    /// Apply every staged write atomically
    async fn commit(self: Box<Self>) -> Result<()>;
}
