//! Built-in role presets
//!
//! Built-in roles expand to fixed canonical rule tables over the subject
//! schema; custom roles unpack their stored rule set verbatim. A custom
//! role row with no stored rules is a data-integrity fault and resolves
//! to `NotFound` rather than silently granting everything or nothing.

use warden_core::rules::{Rule, RuleSet, SubjectTag, Verb, SUBJECT_SCHEMA};
use warden_core::{Result, WardenError};
use warden_store::records::RoleAssignment;

/// The four built-in project roles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinRole {
    Admin,
    Member,
    Viewer,
    NoAccess,
}

impl BuiltinRole {
    /// Parse a built-in slug
    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug {
            "admin" => Some(BuiltinRole::Admin),
            "member" => Some(BuiltinRole::Member),
            "viewer" => Some(BuiltinRole::Viewer),
            "no-access" => Some(BuiltinRole::NoAccess),
            _ => None,
        }
    }

    /// Canonical slug
    pub fn slug(&self) -> &'static str {
        match self {
            BuiltinRole::Admin => "admin",
            BuiltinRole::Member => "member",
            BuiltinRole::Viewer => "viewer",
            BuiltinRole::NoAccess => "no-access",
        }
    }
}

/// Subjects members hold full schema access on; everything else is
/// read-only for them
const MEMBER_FULL_SUBJECTS: &[SubjectTag] = &[
    SubjectTag::Secrets,
    SubjectTag::SecretFolders,
    SubjectTag::SecretImports,
    SubjectTag::Identity,
    SubjectTag::Integrations,
    SubjectTag::Webhooks,
    SubjectTag::Settings,
    SubjectTag::Environments,
    SubjectTag::Tags,
];

/// Expand a built-in role into its canonical rule table
pub fn builtin_role_rules(role: BuiltinRole) -> RuleSet {
    let mut rules = RuleSet::new();
    match role {
        BuiltinRole::Admin => {
            for (subject, verbs) in SUBJECT_SCHEMA {
                rules.push(Rule::allow(verbs.iter().copied(), *subject));
            }
        }
        BuiltinRole::Member => {
            for (subject, verbs) in SUBJECT_SCHEMA {
                if MEMBER_FULL_SUBJECTS.contains(subject) {
                    rules.push(Rule::allow(verbs.iter().copied(), *subject));
                } else if verbs.contains(&Verb::Read) {
                    rules.push(Rule::allow([Verb::Read], *subject));
                }
            }
        }
        BuiltinRole::Viewer => {
            for (subject, verbs) in SUBJECT_SCHEMA {
                if verbs.contains(&Verb::Read) {
                    rules.push(Rule::allow([Verb::Read], *subject));
                }
            }
        }
        BuiltinRole::NoAccess => {}
    }
    rules
}

/// Expand one role assignment into its rule set.
///
/// Built-in slugs use the canonical tables; custom roles use the rule set
/// the store joined onto the assignment.
pub fn assignment_rules(assignment: &RoleAssignment) -> Result<RuleSet> {
    if let Some(builtin) = BuiltinRole::from_slug(&assignment.role_slug) {
        return Ok(builtin_role_rules(builtin));
    }
    match &assignment.permissions {
        Some(rules) if !rules.is_empty() => Ok(rules.clone()),
        Some(_) => Err(WardenError::not_found(format!(
            "custom role '{}' has no stored rules",
            assignment.role_slug
        ))),
        None if assignment.custom_role_id.is_some() => Err(WardenError::not_found(format!(
            "custom role '{}' has no stored rules",
            assignment.role_slug
        ))),
        None => Err(WardenError::not_found(format!(
            "role '{}' does not exist",
            assignment.role_slug
        ))),
    }
}
