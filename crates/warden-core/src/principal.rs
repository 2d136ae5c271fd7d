//! Principals and the identity template context
//!
//! A principal is a human user, a machine identity, or a service token.
//! The template context is the precomputed dictionary that identity-derived
//! condition tokens resolve against during ability composition.

use crate::ids::{IdentityId, OrgId, ServiceTokenId, UserId};
use crate::template;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of actor behind a permission-gated call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActorType {
    User,
    Identity,
    ServiceToken,
}

/// An authenticated principal together with its declared organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Actor {
    /// A human user
    User { id: UserId, org_id: OrgId },
    /// A machine identity
    Identity { id: IdentityId, org_id: OrgId },
    /// A scoped service token
    ServiceToken { id: ServiceTokenId, org_id: OrgId },
}

impl Actor {
    /// The organization the caller claims to act within
    pub fn org_id(&self) -> OrgId {
        match self {
            Actor::User { org_id, .. }
            | Actor::Identity { org_id, .. }
            | Actor::ServiceToken { org_id, .. } => *org_id,
        }
    }

    /// The actor kind
    pub fn actor_type(&self) -> ActorType {
        match self {
            Actor::User { .. } => ActorType::User,
            Actor::Identity { .. } => ActorType::Identity,
            Actor::ServiceToken { .. } => ActorType::ServiceToken,
        }
    }

    /// The user id, when the actor is a human user
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Actor::User { id, .. } => Some(*id),
            _ => None,
        }
    }
}

/// Authentication method the actor used for the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMethod {
    Password,
    Saml,
    Oidc,
    Ldap,
    Token,
}

impl AuthMethod {
    /// Canonical wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Password => "password",
            AuthMethod::Saml => "saml",
            AuthMethod::Oidc => "oidc",
            AuthMethod::Ldap => "ldap",
            AuthMethod::Token => "token",
        }
    }
}

/// Precomputed dictionary for identity-derived condition tokens
///
/// Built once per resolution and reused for every rule in the composed
/// ability. Keys absent from the dictionary stay unresolved, which the
/// evaluator treats as matching nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateContext {
    /// The principal's id, if any
    pub id: Option<String>,
    /// The principal's username or machine-identity name
    pub username: Option<String>,
    /// Principal metadata key-value pairs
    pub metadata: HashMap<String, String>,
    /// Claims from the current auth session
    pub auth: HashMap<String, String>,
}

impl TemplateContext {
    /// Context for a human user
    pub fn for_user(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id: Some(id.uuid().to_string()),
            username: Some(username.into()),
            ..Self::default()
        }
    }

    /// Context for a machine identity
    pub fn for_identity(id: IdentityId, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.uuid().to_string()),
            username: Some(name.into()),
            ..Self::default()
        }
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Add an auth-session claim
    pub fn with_auth_claim(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.auth.insert(key.into(), value.into());
        self
    }

    /// Resolve a template token against the dictionary
    pub fn resolve(&self, token: &str) -> Option<String> {
        if token == template::TOKEN_IDENTITY_ID {
            return self.id.clone();
        }
        if token == template::TOKEN_IDENTITY_USERNAME {
            return self.username.clone();
        }
        if let Some(key) = token.strip_prefix(template::TOKEN_METADATA_PREFIX) {
            return self.metadata.get(key).cloned();
        }
        if let Some(key) = token.strip_prefix(template::TOKEN_AUTH_PREFIX) {
            return self.auth.get(key).cloned();
        }
        None
    }
}
