//! Shared fixtures for the approval workflow tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use warden_approval::{
    AccessRequestService, ApprovalConfig, ApprovalNotifier, ApprovalPolicyService,
    CreatePolicyInput, RequestNotification,
};
use warden_core::ids::{EnvironmentId, MembershipId, OrgId, ProjectId, UserId};
use warden_core::principal::Actor;
use warden_core::rules::{Condition, ConditionSet, Rule, RuleSet, SubjectTag, Verb};
use warden_core::rules::{FIELD_ENVIRONMENT, FIELD_SECRET_PATH};
use warden_core::{Result, WardenError};
use warden_permission::PermissionService;
use warden_store::records::{
    ApproverRef, EnforcementLevel, MembershipRecord, OrgRecord, RoleAssignment,
};
use warden_store::MemoryStore;

/// Notifier that records every dispatch
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(Vec<UserId>, RequestNotification)>>,
}

#[async_trait]
impl ApprovalNotifier for RecordingNotifier {
    async fn notify_request_created(
        &self,
        recipients: &[UserId],
        context: &RequestNotification,
    ) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((recipients.to_vec(), context.clone()));
        Ok(())
    }
}

/// Notifier that always fails delivery
#[derive(Default)]
pub struct FailingNotifier;

#[async_trait]
impl ApprovalNotifier for FailingNotifier {
    async fn notify_request_created(
        &self,
        _recipients: &[UserId],
        _context: &RequestNotification,
    ) -> Result<()> {
        Err(WardenError::internal("notification channel down"))
    }
}

/// One wired-up workflow over a fresh in-memory store
pub struct TestEnv {
    pub store: MemoryStore,
    pub permissions: Arc<PermissionService>,
    pub policies: Arc<ApprovalPolicyService>,
    pub requests: Arc<AccessRequestService>,
    pub notifier: Arc<RecordingNotifier>,
    pub org: OrgRecord,
    pub project_id: ProjectId,
    pub env_id: EnvironmentId,
}

impl TestEnv {
    pub async fn new() -> Self {
        let store = MemoryStore::new();
        let org = OrgRecord {
            id: OrgId::new(),
            required_auth_method: None,
            bypass_org_auth: false,
        };
        store.insert_org(org.clone()).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let (permissions, policies, requests) =
            wire(&store, notifier.clone() as Arc<dyn ApprovalNotifier>);
        Self {
            store,
            permissions,
            policies,
            requests,
            notifier,
            org,
            project_id: ProjectId::new(),
            env_id: EnvironmentId::new(),
        }
    }

    /// Seed a user with one permanent role in the test project
    pub async fn seed_member(&self, role: &str) -> UserId {
        let user_id = UserId::new();
        self.store
            .insert_user_membership(MembershipRecord {
                id: MembershipId::new(),
                project_id: self.project_id,
                org_id: self.org.id,
                user_id,
                username: format!("{role}@example.com"),
                metadata: Vec::new(),
                roles: vec![RoleAssignment::permanent(role)],
            })
            .await;
        user_id
    }

    /// Seed a user whose single role assignment is provided verbatim
    pub async fn seed_member_with_assignment(&self, assignment: RoleAssignment) -> UserId {
        let user_id = UserId::new();
        self.store
            .insert_user_membership(MembershipRecord {
                id: MembershipId::new(),
                project_id: self.project_id,
                org_id: self.org.id,
                user_id,
                username: "member@example.com".into(),
                metadata: Vec::new(),
                roles: vec![assignment],
            })
            .await;
        user_id
    }

    pub fn actor(&self, user_id: UserId) -> Actor {
        Actor::User {
            id: user_id,
            org_id: self.org.id,
        }
    }

    /// A user-approver policy input for the test project
    pub fn policy_input(
        &self,
        env_slug: &str,
        secret_path: &str,
        approvals_required: u32,
        approver_users: &[UserId],
    ) -> CreatePolicyInput {
        CreatePolicyInput {
            project_id: self.project_id,
            org_id: self.org.id,
            env_id: self.env_id,
            env_slug: env_slug.to_string(),
            secret_path: secret_path.to_string(),
            approvals_required,
            enforcement_level: EnforcementLevel::Hard,
            allow_self_approvals: false,
            approvers: approver_users
                .iter()
                .map(|id| ApproverRef::User {
                    id: *id,
                    step: None,
                })
                .collect(),
            bypassers: Vec::new(),
        }
    }
}

/// Wire the permission and approval services over one store
pub fn wire(
    store: &MemoryStore,
    notifier: Arc<dyn ApprovalNotifier>,
) -> (
    Arc<PermissionService>,
    Arc<ApprovalPolicyService>,
    Arc<AccessRequestService>,
) {
    let permissions = Arc::new(PermissionService::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
    ));
    let policies = Arc::new(ApprovalPolicyService::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        permissions.clone(),
    ));
    let requests = Arc::new(
        AccessRequestService::new(
            policies.clone(),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            permissions.clone(),
            notifier,
            ApprovalConfig::default(),
        )
        .expect("default workflow config is valid"),
    );
    (permissions, policies, requests)
}

/// A secrets rule set scoped to one environment and path
pub fn secrets_rules(env: &str, path: &str, verbs: &[Verb]) -> RuleSet {
    let mut conditions = ConditionSet::new();
    conditions.insert(FIELD_ENVIRONMENT.into(), Condition::Eq(env.into()));
    conditions.insert(FIELD_SECRET_PATH.into(), Condition::Eq(path.into()));
    RuleSet(vec![
        Rule::allow(verbs.iter().copied(), SubjectTag::Secrets).with_conditions(conditions)
    ])
}
