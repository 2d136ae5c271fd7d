//! Approval policy resolution and validation behavior

mod common;

use assert_matches::assert_matches;
use common::{secrets_rules, TestEnv};
use warden_approval::{CreateRequestInput, ReviewRequestInput, UpdatePolicyInput};
use warden_core::ids::GroupId;
use warden_core::rules::Verb;
use warden_core::WardenError;
use warden_permission::ResolveOptions;
use warden_store::records::{ApproverRef, GroupRecord, RequestStatus, ReviewStatus};

#[tokio::test]
async fn resolve_policy_picks_the_most_specific_match() {
    let env = TestEnv::new().await;
    let approver = env.seed_member("member").await;

    let env_wide = env
        .policies
        .create_policy(env.policy_input("prod", "", 1, &[approver]))
        .await
        .unwrap();
    let glob = env
        .policies
        .create_policy(env.policy_input("prod", "/app/*", 1, &[approver]))
        .await
        .unwrap();
    let exact = env
        .policies
        .create_policy(env.policy_input("prod", "/app/config", 1, &[approver]))
        .await
        .unwrap();

    let resolved = env
        .policies
        .resolve_policy(env.project_id, "prod", "/app/config")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolved.id, exact.id);

    let resolved = env
        .policies
        .resolve_policy(env.project_id, "prod", "/app/other")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolved.id, glob.id);

    let resolved = env
        .policies
        .resolve_policy(env.project_id, "prod", "/web/config")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolved.id, env_wide.id);

    assert!(env
        .policies
        .resolve_policy(env.project_id, "staging", "/app/config")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn resolve_policy_breaks_ties_by_earliest_creation() {
    let env = TestEnv::new().await;
    let approver = env.seed_member("member").await;

    let older = env
        .policies
        .create_policy(env.policy_input("prod", "/app/*", 1, &[approver]))
        .await
        .unwrap();
    let _newer = env
        .policies
        .create_policy(env.policy_input("prod", "/app/c*", 1, &[approver]))
        .await
        .unwrap();

    let resolved = env
        .policies
        .resolve_policy(env.project_id, "prod", "/app/config")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolved.id, older.id);
}

#[tokio::test]
async fn deleted_policies_do_not_govern() {
    let env = TestEnv::new().await;
    let approver = env.seed_member("member").await;

    let policy = env
        .policies
        .create_policy(env.policy_input("prod", "/app/*", 1, &[approver]))
        .await
        .unwrap();
    env.policies.delete_policy(policy.id).await.unwrap();

    assert!(env
        .policies
        .resolve_policy(env.project_id, "prod", "/app/config")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn create_rejects_more_required_approvals_than_user_approvers() {
    let env = TestEnv::new().await;
    let approver = env.seed_member("member").await;

    let result = env
        .policies
        .create_policy(env.policy_input("prod", "/db/*", 2, &[approver]))
        .await;
    assert_matches!(
        result,
        Err(WardenError::BadRequest { message }) if message.contains("approvals")
    );
}

#[tokio::test]
async fn create_rejects_approvers_without_scope_access() {
    let env = TestEnv::new().await;
    // Viewers cannot create secrets, so they cannot approve grants.
    let viewer = env.seed_member("viewer").await;

    let result = env
        .policies
        .create_policy(env.policy_input("prod", "/db/*", 1, &[viewer]))
        .await;
    assert_matches!(
        result,
        Err(WardenError::BadRequest { message }) if message.contains("lacks access")
    );
}

#[tokio::test]
async fn create_rejects_unknown_approver_groups() {
    let env = TestEnv::new().await;
    let mut input = env.policy_input("prod", "/db/*", 1, &[]);
    input.approvers = vec![ApproverRef::Group {
        id: GroupId::new(),
        step: None,
    }];
    let result = env.policies.create_policy(input).await;
    assert_matches!(
        result,
        Err(WardenError::BadRequest { message }) if message.contains("does not exist")
    );
}

#[tokio::test]
async fn update_reverifies_the_new_approver_list() {
    let env = TestEnv::new().await;
    let approver = env.seed_member("member").await;
    let viewer = env.seed_member("viewer").await;

    let policy = env
        .policies
        .create_policy(env.policy_input("prod", "/db/*", 1, &[approver]))
        .await
        .unwrap();

    let result = env
        .policies
        .update_policy(
            policy.id,
            env.org.id,
            UpdatePolicyInput {
                approvers: Some(vec![ApproverRef::User {
                    id: viewer,
                    step: None,
                }]),
                ..UpdatePolicyInput::default()
            },
        )
        .await;
    assert_matches!(
        result,
        Err(WardenError::BadRequest { message }) if message.contains("lacks access")
    );

    let updated = env
        .policies
        .update_policy(
            policy.id,
            env.org.id,
            UpdatePolicyInput {
                allow_self_approvals: Some(true),
                ..UpdatePolicyInput::default()
            },
        )
        .await
        .unwrap();
    assert!(updated.allow_self_approvals);
}

#[tokio::test]
async fn group_approvers_expand_for_review_and_notification() {
    let env = TestEnv::new().await;
    let group_id = GroupId::new();
    let group_member = env.seed_member("member").await;
    let requester = env.seed_member("viewer").await;
    env.store
        .insert_group(
            GroupRecord {
                id: group_id,
                org_id: env.org.id,
                name: "oncall".into(),
            },
            vec![group_member],
        )
        .await;

    let mut input = env.policy_input("prod", "/db/*", 1, &[]);
    input.approvers = vec![ApproverRef::Group {
        id: group_id,
        step: None,
    }];
    env.policies.create_policy(input).await.unwrap();

    let request = env
        .requests
        .create_request(CreateRequestInput {
            actor: env.actor(requester),
            options: ResolveOptions::default(),
            project_id: env.project_id,
            permissions: secrets_rules("prod", "/db/creds", &[Verb::Read]),
            is_temporary: false,
            temporary_range: None,
        })
        .await
        .unwrap();

    // Group members are notified.
    let sent = env.notifier.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, vec![group_member]);

    // And may review via their group listing.
    let granted = env
        .requests
        .review_request(ReviewRequestInput {
            actor: env.actor(group_member),
            options: ResolveOptions::default(),
            request_id: request.id,
            status: ReviewStatus::Approved,
        })
        .await
        .unwrap();
    assert_eq!(granted.status, RequestStatus::Granted);
}
