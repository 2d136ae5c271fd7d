//! Role and privilege resolution
//!
//! Loads a principal's applicable role and privilege rows for a project,
//! filters lapsed temporary grants, enforces the org's SSO mandate, and
//! re-validates membership org ids against the caller-declared org so a
//! token replayed across tenants resolves to nothing.

use crate::builder::build_ability;
use crate::evaluate::Ability;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use warden_core::ids::{IdentityId, OrgId, ProjectId, UserId};
use warden_core::principal::{Actor, AuthMethod, TemplateContext};
use warden_core::rules::{validate_rule_set, RuleSet};
use warden_core::time::{now, Timestamp};
use warden_core::{Result, WardenError};
use warden_store::records::{MembershipRef, PrivilegeRecord, RoleAssignment};
use warden_store::traits::{MembershipStore, OrgStore, PrivilegeStore};

/// Explicit per-call context threaded through resolution.
///
/// Replaces ambient request-scoped state: auth claims feed the condition
/// template dictionary, and `assumed_privilege` substitutes for the
/// principal's stored additional privileges when present.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    pub auth_method: Option<AuthMethod>,
    pub auth_claims: HashMap<String, String>,
    pub assumed_privilege: Option<RuleSet>,
}

impl ResolveOptions {
    /// Options for a session authenticated with the given method
    pub fn with_auth_method(auth_method: AuthMethod) -> Self {
        Self {
            auth_method: Some(auth_method),
            ..Self::default()
        }
    }
}

/// The scope a permission resolution targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionScope {
    /// The actor's declared organization
    Org,
    /// One project within the organization
    Project(ProjectId),
}

/// A principal's resolved permission at org scope
#[derive(Debug, Clone)]
pub struct OrgPermission {
    /// The composed, interpolated ability
    pub ability: Ability,
    /// The org membership the principal acts through
    pub membership_id: warden_core::ids::MembershipId,
    /// Slugs of all live role assignments
    pub role_slugs: Vec<String>,
}

impl OrgPermission {
    /// Whether any live assignment carries the role slug
    pub fn has_role(&self, slug: &str) -> bool {
        self.role_slugs.iter().any(|role| role == slug)
    }
}

/// A principal's resolved permission within one project
#[derive(Debug, Clone)]
pub struct ProjectPermission {
    /// The composed, interpolated ability, reusable across the request
    pub ability: Ability,
    /// The membership the principal acts through
    pub membership: MembershipRef,
    /// Slugs of all live role assignments
    pub role_slugs: Vec<String>,
}

impl ProjectPermission {
    /// Whether any live assignment carries the role slug
    pub fn has_role(&self, slug: &str) -> bool {
        self.role_slugs.iter().any(|role| role == slug)
    }
}

/// Store-backed resolver for effective permissions
pub struct PermissionService {
    orgs: Arc<dyn OrgStore>,
    memberships: Arc<dyn MembershipStore>,
    privileges: Arc<dyn PrivilegeStore>,
}

impl PermissionService {
    pub fn new(
        orgs: Arc<dyn OrgStore>,
        memberships: Arc<dyn MembershipStore>,
        privileges: Arc<dyn PrivilegeStore>,
    ) -> Self {
        Self {
            orgs,
            memberships,
            privileges,
        }
    }

    /// Resolve the actor's effective permission for a project.
    ///
    /// Fails `Forbidden` when the actor holds no live membership, when the
    /// org mandates an auth method the session did not use, or when any
    /// resolved row belongs to a different org than the actor declared.
    pub async fn get_project_permission(
        &self,
        actor: &Actor,
        project_id: ProjectId,
        options: &ResolveOptions,
    ) -> Result<ProjectPermission> {
        self.enforce_org_auth(actor, options).await?;
        match actor {
            Actor::User { id, .. } => {
                self.resolve_user(*id, actor, project_id, options).await
            }
            Actor::Identity { id, .. } => {
                self.resolve_identity(*id, actor, project_id, options).await
            }
            Actor::ServiceToken { id, .. } => Err(WardenError::bad_request(format!(
                "service token {id} resolves through its token scopes, not project membership"
            ))),
        }
    }

    /// Resolve the actor's effective permission for either scope.
    pub async fn get_effective_permission(
        &self,
        actor: &Actor,
        scope: PermissionScope,
        options: &ResolveOptions,
    ) -> Result<Ability> {
        match scope {
            PermissionScope::Org => Ok(self.get_org_permission(actor, options).await?.ability),
            PermissionScope::Project(project_id) => Ok(self
                .get_project_permission(actor, project_id, options)
                .await?
                .ability),
        }
    }

    /// Resolve the actor's org-scope permission: org membership roles
    /// only, with the same SSO and expiry rules as project resolution.
    /// Org scope carries no group inheritance or additional privileges.
    pub async fn get_org_permission(
        &self,
        actor: &Actor,
        options: &ResolveOptions,
    ) -> Result<OrgPermission> {
        self.enforce_org_auth(actor, options).await?;
        let user_id = actor.user_id().ok_or_else(|| {
            WardenError::bad_request("org-scope permissions resolve for users only")
        })?;
        let membership = self
            .memberships
            .find_org_membership(actor.org_id(), user_id)
            .await?
            .ok_or_else(|| {
                WardenError::forbidden(format!(
                    "user {user_id} is not a member of org {}",
                    actor.org_id()
                ))
            })?;

        let context = TemplateContext {
            id: Some(user_id.uuid().to_string()),
            username: Some(membership.username.clone()),
            metadata: membership.metadata.iter().cloned().collect(),
            auth: options.auth_claims.clone(),
        };
        let current = now();
        let role_slugs = live_role_slugs(&membership.roles, &[], current);
        let ability = build_ability(&membership.roles, &[], &[], &context, current)?;
        Ok(OrgPermission {
            ability,
            membership_id: membership.id,
            role_slugs,
        })
    }

    /// Resolve a user's ability outside any authenticated session, for
    /// approver-eligibility checks. The org SSO mandate does not apply;
    /// cross-org validation still does.
    pub async fn get_user_project_ability(
        &self,
        user_id: UserId,
        org_id: OrgId,
        project_id: ProjectId,
    ) -> Result<ProjectPermission> {
        let probe = Actor::User {
            id: user_id,
            org_id,
        };
        self.resolve_user(user_id, &probe, project_id, &ResolveOptions::default())
            .await
    }

    async fn enforce_org_auth(&self, actor: &Actor, options: &ResolveOptions) -> Result<()> {
        let org = self
            .orgs
            .find_org(actor.org_id())
            .await?
            .ok_or_else(|| WardenError::not_found(format!("org {}", actor.org_id())))?;
        let Some(required) = org.required_auth_method else {
            return Ok(());
        };
        if org.bypass_org_auth {
            return Ok(());
        }
        if options.auth_method != Some(required) {
            return Err(WardenError::forbidden(format!(
                "org {} mandates {} authentication",
                org.id,
                required.as_str()
            )));
        }
        Ok(())
    }

    async fn resolve_user(
        &self,
        user_id: UserId,
        actor: &Actor,
        project_id: ProjectId,
        options: &ResolveOptions,
    ) -> Result<ProjectPermission> {
        let membership = self
            .memberships
            .find_user_membership(project_id, user_id)
            .await?;
        let group_memberships = self
            .memberships
            .find_group_memberships_for_user(project_id, user_id)
            .await?;

        if membership.is_none() && group_memberships.is_empty() {
            return Err(WardenError::forbidden(format!(
                "user {user_id} is not a member of project {project_id}"
            )));
        }
        if let Some(membership) = &membership {
            if membership.org_id != actor.org_id() {
                return Err(WardenError::forbidden(format!(
                    "membership {} belongs to a different org than the caller declared",
                    membership.id
                )));
            }
        }
        for group_membership in &group_memberships {
            if group_membership.org_id != actor.org_id() {
                return Err(WardenError::forbidden(format!(
                    "group membership {} belongs to a different org than the caller declared",
                    group_membership.id
                )));
            }
        }

        let membership_ref = membership
            .as_ref()
            .map(|m| MembershipRef::Project(m.id))
            .or_else(|| {
                group_memberships
                    .first()
                    .map(|gm| MembershipRef::Group(gm.id))
            })
            .ok_or_else(|| WardenError::internal("membership resolution lost its rows"))?;

        let context = TemplateContext {
            id: Some(user_id.uuid().to_string()),
            username: membership.as_ref().map(|m| m.username.clone()),
            metadata: membership
                .as_ref()
                .map(|m| m.metadata.iter().cloned().collect())
                .unwrap_or_default(),
            auth: options.auth_claims.clone(),
        };

        let direct_roles: Vec<RoleAssignment> = membership
            .as_ref()
            .map(|m| m.roles.clone())
            .unwrap_or_default();
        let group_roles: Vec<RoleAssignment> = group_memberships
            .iter()
            .flat_map(|gm| gm.roles.iter().cloned())
            .collect();

        let mut membership_refs = Vec::new();
        if let Some(membership) = &membership {
            membership_refs.push(MembershipRef::Project(membership.id));
        }
        membership_refs.extend(
            group_memberships
                .iter()
                .map(|gm| MembershipRef::Group(gm.id)),
        );

        self.compose(
            direct_roles,
            group_roles,
            membership_refs,
            membership_ref,
            context,
            options,
        )
        .await
    }

    async fn resolve_identity(
        &self,
        identity_id: IdentityId,
        actor: &Actor,
        project_id: ProjectId,
        options: &ResolveOptions,
    ) -> Result<ProjectPermission> {
        let membership = self
            .memberships
            .find_identity_membership(project_id, identity_id)
            .await?
            .ok_or_else(|| {
                WardenError::forbidden(format!(
                    "identity {identity_id} is not a member of project {project_id}"
                ))
            })?;
        if membership.org_id != actor.org_id() {
            return Err(WardenError::forbidden(format!(
                "membership {} belongs to a different org than the caller declared",
                membership.id
            )));
        }

        let context = TemplateContext {
            id: Some(identity_id.uuid().to_string()),
            username: Some(membership.name.clone()),
            metadata: membership.metadata.iter().cloned().collect(),
            auth: options.auth_claims.clone(),
        };

        // Machine identities never inherit group roles.
        self.compose(
            membership.roles.clone(),
            Vec::new(),
            vec![MembershipRef::Project(membership.id)],
            MembershipRef::Project(membership.id),
            context,
            options,
        )
        .await
    }

    async fn compose(
        &self,
        direct_roles: Vec<RoleAssignment>,
        group_roles: Vec<RoleAssignment>,
        privilege_sources: Vec<MembershipRef>,
        membership: MembershipRef,
        context: TemplateContext,
        options: &ResolveOptions,
    ) -> Result<ProjectPermission> {
        let current = now();

        let privileges: Vec<PrivilegeRecord> = match &options.assumed_privilege {
            Some(rules) => {
                validate_rule_set(rules)?;
                vec![assumed_privilege_record(membership, rules.clone())]
            }
            None => {
                let mut collected = Vec::new();
                for source in privilege_sources {
                    collected.extend(self.privileges.find_privileges(source).await?);
                }
                collected
            }
        };

        let role_slugs = live_role_slugs(&direct_roles, &group_roles, current);
        let ability =
            build_ability(&direct_roles, &group_roles, &privileges, &context, current)?;
        debug!(
            roles = role_slugs.len(),
            privileges = privileges.len(),
            "resolved project permission"
        );
        Ok(ProjectPermission {
            ability,
            membership,
            role_slugs,
        })
    }
}

fn live_role_slugs(
    direct: &[RoleAssignment],
    group: &[RoleAssignment],
    now: Timestamp,
) -> Vec<String> {
    let mut slugs: Vec<String> = direct
        .iter()
        .chain(group.iter())
        .filter(|assignment| !assignment.is_expired(now))
        .map(|assignment| assignment.role_slug.clone())
        .collect();
    slugs.sort();
    slugs.dedup();
    slugs
}

fn assumed_privilege_record(membership: MembershipRef, rules: RuleSet) -> PrivilegeRecord {
    PrivilegeRecord {
        id: warden_core::ids::PrivilegeId::new(),
        membership,
        slug: "assumed-privilege".to_string(),
        permissions: rules,
        is_temporary: false,
        temporary_range: None,
        temporary_access_start_time: None,
        temporary_access_end_time: None,
    }
}
