//! Core types for the Warden access-control engine
//!
//! This crate holds the shared vocabulary of the platform: identifiers,
//! the unified error type, timestamps and temporary ranges, the
//! permission rule model with its wire format, and principal types.
//! It performs no I/O; the store, permission, and approval crates build
//! on top of it.

pub mod errors;
pub mod ids;
pub mod principal;
pub mod rules;
pub mod template;
pub mod time;

pub use errors::{Result, WardenError};
pub use ids::{
    EnvironmentId, GroupId, GroupMembershipId, IdentityId, MembershipId, OrgId, PolicyId,
    PrivilegeId, ProjectId, RequestId, ReviewId, RoleId, ServiceTokenId, UserId,
};
pub use principal::{Actor, ActorType, AuthMethod, TemplateContext};
pub use rules::{
    schema_allows, schema_verbs, validate_rule_set, Condition, ConditionSet, MissingPermission,
    Rule, RuleSet, SubjectTag, Verb, FIELD_ENVIRONMENT, FIELD_SECRET_PATH, SUBJECT_SCHEMA,
};
pub use time::{is_expired, now, parse_temporary_range, Timestamp};
