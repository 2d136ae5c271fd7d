//! In-process store used by tests and embedders
//!
//! A single state struct behind an async mutex. The request transaction
//! holds the lock for the whole critical section and stages its writes,
//! so concurrent reviewers of one request are strictly ordered and a
//! failed review leaves no partial rows behind.

use crate::records::{
    GroupProjectMembershipRecord, GroupRecord, IdentityMembershipRecord, MembershipRecord,
    MembershipRef, OrgMembershipRecord, OrgRecord, PolicyRecord, PrivilegeRecord, RequestRecord,
    RequestStatus, ReviewRecord, RoleRecord,
};
use crate::traits::{
    GroupStore, MembershipStore, OrgStore, PolicyStore, PrivilegeStore, RequestStore,
    RequestTransaction,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use warden_core::ids::{
    GroupId, IdentityId, MembershipId, OrgId, PolicyId, PrivilegeId, ProjectId, RequestId, UserId,
};
use warden_core::rules::RuleSet;
use warden_core::time::Timestamp;
use warden_core::{Result, WardenError};

#[derive(Debug, Default)]
struct MemoryState {
    orgs: HashMap<OrgId, OrgRecord>,
    groups: HashMap<GroupId, GroupRecord>,
    group_members: HashMap<GroupId, Vec<UserId>>,
    org_memberships: Vec<OrgMembershipRecord>,
    memberships: Vec<MembershipRecord>,
    identity_memberships: Vec<IdentityMembershipRecord>,
    group_memberships: Vec<GroupProjectMembershipRecord>,
    roles: Vec<RoleRecord>,
    privileges: HashMap<PrivilegeId, PrivilegeRecord>,
    policies: HashMap<PolicyId, PolicyRecord>,
    requests: HashMap<RequestId, RequestRecord>,
    reviews: Vec<ReviewRecord>,
}

impl MemoryState {
    /// Fill in custom-role rule sets on the joined assignments.
    fn join_role_permissions(&self, roles: &mut [crate::records::RoleAssignment]) {
        for assignment in roles {
            if assignment.permissions.is_some() {
                continue;
            }
            if let Some(role_id) = assignment.custom_role_id {
                if let Some(role) = self.roles.iter().find(|role| role.id == role_id) {
                    assignment.permissions = Some(role.permissions.clone());
                }
            }
        }
    }
}

/// In-memory implementation of every store trait
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an organization row
    pub async fn insert_org(&self, org: OrgRecord) {
        self.state.lock().await.orgs.insert(org.id, org);
    }

    /// Seed a group and its member roster
    pub async fn insert_group(&self, group: GroupRecord, members: Vec<UserId>) {
        let mut state = self.state.lock().await;
        state.group_members.insert(group.id, members);
        state.groups.insert(group.id, group);
    }

    /// Seed a custom role row
    pub async fn insert_role(&self, role: RoleRecord) {
        self.state.lock().await.roles.push(role);
    }

    /// Seed an org-scope user membership
    pub async fn insert_org_membership(&self, membership: OrgMembershipRecord) {
        self.state.lock().await.org_memberships.push(membership);
    }

    /// Seed a direct user membership
    pub async fn insert_user_membership(&self, membership: MembershipRecord) {
        self.state.lock().await.memberships.push(membership);
    }

    /// Seed a machine-identity membership
    pub async fn insert_identity_membership(&self, membership: IdentityMembershipRecord) {
        self.state.lock().await.identity_memberships.push(membership);
    }

    /// Seed a group project membership
    pub async fn insert_group_membership(&self, membership: GroupProjectMembershipRecord) {
        self.state.lock().await.group_memberships.push(membership);
    }
}

#[async_trait]
impl OrgStore for MemoryStore {
    async fn find_org(&self, org_id: OrgId) -> Result<Option<OrgRecord>> {
        Ok(self.state.lock().await.orgs.get(&org_id).cloned())
    }
}

#[async_trait]
impl GroupStore for MemoryStore {
    async fn group_exists(&self, group_id: GroupId) -> Result<bool> {
        Ok(self.state.lock().await.groups.contains_key(&group_id))
    }

    async fn group_member_user_ids(&self, group_id: GroupId) -> Result<Vec<UserId>> {
        Ok(self
            .state
            .lock()
            .await
            .group_members
            .get(&group_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn user_in_group(&self, group_id: GroupId, user_id: UserId) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .await
            .group_members
            .get(&group_id)
            .is_some_and(|members| members.contains(&user_id)))
    }
}

#[async_trait]
impl MembershipStore for MemoryStore {
    async fn find_org_membership(
        &self,
        org_id: OrgId,
        user_id: UserId,
    ) -> Result<Option<OrgMembershipRecord>> {
        let state = self.state.lock().await;
        let mut found = state
            .org_memberships
            .iter()
            .find(|m| m.org_id == org_id && m.user_id == user_id)
            .cloned();
        if let Some(membership) = &mut found {
            state.join_role_permissions(&mut membership.roles);
        }
        Ok(found)
    }

    async fn find_user_membership(
        &self,
        project_id: ProjectId,
        user_id: UserId,
    ) -> Result<Option<MembershipRecord>> {
        let state = self.state.lock().await;
        let mut found = state
            .memberships
            .iter()
            .find(|m| m.project_id == project_id && m.user_id == user_id)
            .cloned();
        if let Some(membership) = &mut found {
            state.join_role_permissions(&mut membership.roles);
        }
        Ok(found)
    }

    async fn find_identity_membership(
        &self,
        project_id: ProjectId,
        identity_id: IdentityId,
    ) -> Result<Option<IdentityMembershipRecord>> {
        let state = self.state.lock().await;
        let mut found = state
            .identity_memberships
            .iter()
            .find(|m| m.project_id == project_id && m.identity_id == identity_id)
            .cloned();
        if let Some(membership) = &mut found {
            state.join_role_permissions(&mut membership.roles);
        }
        Ok(found)
    }

    async fn find_group_memberships_for_user(
        &self,
        project_id: ProjectId,
        user_id: UserId,
    ) -> Result<Vec<GroupProjectMembershipRecord>> {
        let state = self.state.lock().await;
        let mut found: Vec<GroupProjectMembershipRecord> = state
            .group_memberships
            .iter()
            .filter(|gm| {
                gm.project_id == project_id
                    && state
                        .group_members
                        .get(&gm.group_id)
                        .is_some_and(|members| members.contains(&user_id))
            })
            .cloned()
            .collect();
        for membership in &mut found {
            state.join_role_permissions(&mut membership.roles);
        }
        Ok(found)
    }

    async fn find_membership_by_id(
        &self,
        membership_id: MembershipId,
    ) -> Result<Option<MembershipRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .memberships
            .iter()
            .find(|m| m.id == membership_id)
            .cloned())
    }
}

#[async_trait]
impl PrivilegeStore for MemoryStore {
    async fn find_privilege(
        &self,
        privilege_id: PrivilegeId,
    ) -> Result<Option<PrivilegeRecord>> {
        Ok(self.state.lock().await.privileges.get(&privilege_id).cloned())
    }

    async fn find_privileges(&self, membership: MembershipRef) -> Result<Vec<PrivilegeRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .privileges
            .values()
            .filter(|privilege| privilege.membership == membership)
            .cloned()
            .collect())
    }

    async fn create_privilege(&self, privilege: PrivilegeRecord) -> Result<PrivilegeRecord> {
        let mut state = self.state.lock().await;
        if state
            .privileges
            .values()
            .any(|existing| existing.membership == privilege.membership && existing.slug == privilege.slug)
        {
            return Err(WardenError::conflict(format!(
                "privilege slug '{}' already exists on membership",
                privilege.slug
            )));
        }
        state.privileges.insert(privilege.id, privilege.clone());
        Ok(privilege)
    }

    async fn delete_privilege(&self, privilege_id: PrivilegeId) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .privileges
            .remove(&privilege_id)
            .map(|_| ())
            .ok_or_else(|| WardenError::not_found(format!("privilege {privilege_id}")))
    }
}

#[async_trait]
impl PolicyStore for MemoryStore {
    async fn create_policy(&self, policy: PolicyRecord) -> Result<PolicyRecord> {
        let mut state = self.state.lock().await;
        state.policies.insert(policy.id, policy.clone());
        Ok(policy)
    }

    async fn update_policy(&self, policy: PolicyRecord) -> Result<PolicyRecord> {
        let mut state = self.state.lock().await;
        if !state.policies.contains_key(&policy.id) {
            return Err(WardenError::not_found(format!("policy {}", policy.id)));
        }
        state.policies.insert(policy.id, policy.clone());
        Ok(policy)
    }

    async fn find_policy(&self, policy_id: PolicyId) -> Result<Option<PolicyRecord>> {
        Ok(self.state.lock().await.policies.get(&policy_id).cloned())
    }

    async fn find_policies_for_env(
        &self,
        project_id: ProjectId,
        env_slug: &str,
    ) -> Result<Vec<PolicyRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .policies
            .values()
            .filter(|policy| {
                policy.project_id == project_id
                    && policy.env_slug == env_slug
                    && !policy.is_deleted()
            })
            .cloned()
            .collect())
    }

    async fn list_policies(&self, project_id: ProjectId) -> Result<Vec<PolicyRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .policies
            .values()
            .filter(|policy| policy.project_id == project_id && !policy.is_deleted())
            .cloned()
            .collect())
    }

    async fn soft_delete_policy(
        &self,
        policy_id: PolicyId,
        deleted_at: Timestamp,
    ) -> Result<PolicyRecord> {
        let mut state = self.state.lock().await;
        let policy = state
            .policies
            .get_mut(&policy_id)
            .ok_or_else(|| WardenError::not_found(format!("policy {policy_id}")))?;
        policy.deleted_at = Some(deleted_at);
        Ok(policy.clone())
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn create_request(&self, request: RequestRecord) -> Result<RequestRecord> {
        let mut state = self.state.lock().await;
        state.requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn find_request(&self, request_id: RequestId) -> Result<Option<RequestRecord>> {
        Ok(self.state.lock().await.requests.get(&request_id).cloned())
    }

    async fn find_requests_by_policy(&self, policy_id: PolicyId) -> Result<Vec<RequestRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .requests
            .values()
            .filter(|request| request.policy_id == policy_id)
            .cloned()
            .collect())
    }

    async fn find_duplicate_requests(
        &self,
        policy_id: PolicyId,
        requested_by_user_id: UserId,
        permissions: &RuleSet,
        is_temporary: bool,
    ) -> Result<Vec<RequestRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .requests
            .values()
            .filter(|request| {
                request.policy_id == policy_id
                    && request.requested_by_user_id == requested_by_user_id
                    && request.permissions == *permissions
                    && request.is_temporary == is_temporary
            })
            .cloned()
            .collect())
    }

    async fn find_reviews(&self, request_id: RequestId) -> Result<Vec<ReviewRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .reviews
            .iter()
            .filter(|review| review.request_id == request_id)
            .cloned()
            .collect())
    }

    async fn set_request_status(
        &self,
        request_id: RequestId,
        status: RequestStatus,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let request = state
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| WardenError::not_found(format!("approval request {request_id}")))?;
        request.status = status;
        Ok(())
    }

    async fn clear_privilege_link(&self, request_id: RequestId) -> Result<()> {
        let mut state = self.state.lock().await;
        let request = state
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| WardenError::not_found(format!("approval request {request_id}")))?;
        request.privilege_id = None;
        Ok(())
    }

    async fn request_transaction(
        &self,
        request_id: RequestId,
    ) -> Result<Box<dyn RequestTransaction>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        if !guard.requests.contains_key(&request_id) {
            return Err(WardenError::not_found(format!(
                "approval request {request_id}"
            )));
        }
        Ok(Box::new(MemoryRequestTransaction {
            guard,
            request_id,
            staged_reviews: Vec::new(),
            staged_privileges: Vec::new(),
            staged_link: None,
            staged_status: None,
        }))
    }
}

/// Lock-holding transaction over one request; writes apply on commit
struct MemoryRequestTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    request_id: RequestId,
    staged_reviews: Vec<ReviewRecord>,
    staged_privileges: Vec<PrivilegeRecord>,
    staged_link: Option<PrivilegeId>,
    staged_status: Option<RequestStatus>,
}

impl MemoryRequestTransaction {
    fn stored_request(&self) -> Result<&RequestRecord> {
        self.guard
            .requests
            .get(&self.request_id)
            .ok_or_else(|| WardenError::not_found(format!("approval request {}", self.request_id)))
    }
}

#[async_trait]
impl RequestTransaction for MemoryRequestTransaction {
    async fn request(&self) -> Result<RequestRecord> {
        let mut request = self.stored_request()?.clone();
        if let Some(link) = self.staged_link {
            request.privilege_id = Some(link);
        }
        if let Some(status) = self.staged_status {
            request.status = status;
        }
        Ok(request)
    }

    async fn reviews(&self) -> Result<Vec<ReviewRecord>> {
        let mut reviews: Vec<ReviewRecord> = self
            .guard
            .reviews
            .iter()
            .filter(|review| review.request_id == self.request_id)
            .cloned()
            .collect();
        reviews.extend(self.staged_reviews.iter().cloned());
        Ok(reviews)
    }

    async fn insert_review(&mut self, review: ReviewRecord) -> Result<ReviewRecord> {
        let duplicate = self
            .reviews()
            .await?
            .iter()
            .any(|existing| existing.reviewer_user_id == review.reviewer_user_id);
        if duplicate {
            return Err(WardenError::conflict(format!(
                "reviewer {} has already reviewed request {}",
                review.reviewer_user_id, self.request_id
            )));
        }
        self.staged_reviews.push(review.clone());
        Ok(review)
    }

    async fn create_privilege(&mut self, privilege: PrivilegeRecord) -> Result<PrivilegeRecord> {
        let slug_taken = self
            .guard
            .privileges
            .values()
            .chain(self.staged_privileges.iter())
            .any(|existing| {
                existing.membership == privilege.membership && existing.slug == privilege.slug
            });
        if slug_taken {
            return Err(WardenError::conflict(format!(
                "privilege slug '{}' already exists on membership",
                privilege.slug
            )));
        }
        self.staged_privileges.push(privilege.clone());
        Ok(privilege)
    }

    async fn link_privilege(&mut self, privilege_id: PrivilegeId) -> Result<()> {
        let already_linked =
            self.staged_link.is_some() || self.stored_request()?.privilege_id.is_some();
        if already_linked {
            return Err(WardenError::conflict(format!(
                "approval request {} already carries a materialized privilege",
                self.request_id
            )));
        }
        self.staged_link = Some(privilege_id);
        Ok(())
    }

    async fn set_status(&mut self, status: RequestStatus) -> Result<()> {
        self.staged_status = Some(status);
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let request_id = self.request_id;
        let staged_privileges = std::mem::take(&mut self.staged_privileges);
        let staged_reviews = std::mem::take(&mut self.staged_reviews);
        let staged_link = self.staged_link.take();
        let staged_status = self.staged_status.take();
        for privilege in staged_privileges {
            self.guard.privileges.insert(privilege.id, privilege);
        }
        self.guard.reviews.extend(staged_reviews);
        let request = self
            .guard
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| WardenError::not_found(format!("approval request {request_id}")))?;
        if let Some(link) = staged_link {
            request.privilege_id = Some(link);
        }
        if let Some(status) = staged_status {
            request.status = status;
        }
        Ok(())
    }
}
