//! Permission rule model and wire format
//!
//! A rule is a tagged tuple `(actions, subject, conditions?, inverted)`.
//! Evaluation is a pure function over an ordered list of rules; there is
//! no runtime class hierarchy. Rule sets serialize as a JSON array of
//! these tuples and must round-trip losslessly: the serialized form is
//! the storage contract for custom roles and additional privileges.

use crate::errors::{Result, WardenError};
use crate::template;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Action verb a rule grants or denies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Read,
    Create,
    Edit,
    Delete,
}

impl Verb {
    /// Canonical wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Read => "read",
            Verb::Create => "create",
            Verb::Edit => "edit",
            Verb::Delete => "delete",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subject a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubjectTag {
    Secrets,
    SecretFolders,
    SecretImports,
    SecretRollback,
    SecretApproval,
    Member,
    Groups,
    Role,
    Identity,
    Integrations,
    Webhooks,
    ServiceTokens,
    Settings,
    Environments,
    Tags,
    AuditLogs,
    IpAllowlist,
    Project,
    Kms,
    Cmek,
}

impl SubjectTag {
    /// Canonical wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectTag::Secrets => "secrets",
            SubjectTag::SecretFolders => "secret-folders",
            SubjectTag::SecretImports => "secret-imports",
            SubjectTag::SecretRollback => "secret-rollback",
            SubjectTag::SecretApproval => "secret-approval",
            SubjectTag::Member => "member",
            SubjectTag::Groups => "groups",
            SubjectTag::Role => "role",
            SubjectTag::Identity => "identity",
            SubjectTag::Integrations => "integrations",
            SubjectTag::Webhooks => "webhooks",
            SubjectTag::ServiceTokens => "service-tokens",
            SubjectTag::Settings => "settings",
            SubjectTag::Environments => "environments",
            SubjectTag::Tags => "tags",
            SubjectTag::AuditLogs => "audit-logs",
            SubjectTag::IpAllowlist => "ip-allowlist",
            SubjectTag::Project => "project",
            SubjectTag::Kms => "kms",
            SubjectTag::Cmek => "cmek",
        }
    }
}

impl fmt::Display for SubjectTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition field carrying the environment slug on secrets-scoped rules
pub const FIELD_ENVIRONMENT: &str = "environment";
/// Condition field carrying the secret path on secrets-scoped rules
pub const FIELD_SECRET_PATH: &str = "secretPath";

/// A single condition constraining one attribute field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    /// The attribute must equal the value
    #[serde(rename = "$eq")]
    Eq(String),
    /// The attribute must differ from the value
    #[serde(rename = "$neq")]
    Ne(String),
    /// The attribute must be one of the values
    #[serde(rename = "$in")]
    In(Vec<String>),
    /// The attribute must match the shell-style glob pattern
    #[serde(rename = "$glob")]
    Glob(String),
}

/// Ordered map of condition fields; wire order is preserved
pub type ConditionSet = IndexMap<String, Condition>;

/// A primitive permission rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub actions: Vec<Verb>,
    pub subject: SubjectTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<ConditionSet>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub inverted: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Rule {
    /// A positive rule with no conditions
    pub fn allow(actions: impl IntoIterator<Item = Verb>, subject: SubjectTag) -> Self {
        Self {
            actions: actions.into_iter().collect(),
            subject,
            conditions: None,
            inverted: false,
        }
    }

    /// Attach conditions to the rule
    pub fn with_conditions(mut self, conditions: ConditionSet) -> Self {
        self.conditions = Some(conditions);
        self
    }

    /// Turn the rule into an explicit deny
    pub fn inverted(mut self) -> Self {
        self.inverted = true;
        self
    }
}

/// Ordered list of rules; the unit of storage for custom roles and
/// additional privileges
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet(pub Vec<Rule>);

impl RuleSet {
    /// An empty rule set
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, rule: Rule) {
        self.0.push(rule);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serialize to the persisted wire form
    pub fn pack(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|err| WardenError::internal(format!("failed to pack rule set: {err}")))
    }

    /// Parse the persisted wire form
    pub fn unpack(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|err| WardenError::bad_request(format!("malformed rule set: {err}")))
    }
}

impl From<Vec<Rule>> for RuleSet {
    fn from(rules: Vec<Rule>) -> Self {
        Self(rules)
    }
}

impl FromIterator<Rule> for RuleSet {
    fn from_iter<T: IntoIterator<Item = Rule>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for RuleSet {
    type Item = Rule;
    type IntoIter = std::vec::IntoIter<Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// One permission a grantor is missing, reported by the boundary validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingPermission {
    pub action: Verb,
    pub subject: SubjectTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<ConditionSet>,
}

const CRUD: &[Verb] = &[Verb::Read, Verb::Create, Verb::Edit, Verb::Delete];

/// The declared schema of valid (verb x subject) pairs.
///
/// Most subjects support full CRUD; `kms` is edit-only, `secret-rollback`
/// supports read and create. Anything outside this table is rejected at
/// the validation boundary and never reaches the evaluator.
pub const SUBJECT_SCHEMA: &[(SubjectTag, &[Verb])] = &[
    (SubjectTag::Secrets, CRUD),
    (SubjectTag::SecretFolders, CRUD),
    (SubjectTag::SecretImports, CRUD),
    (SubjectTag::SecretRollback, &[Verb::Read, Verb::Create]),
    (SubjectTag::SecretApproval, CRUD),
    (SubjectTag::Member, CRUD),
    (SubjectTag::Groups, CRUD),
    (SubjectTag::Role, CRUD),
    (SubjectTag::Identity, CRUD),
    (SubjectTag::Integrations, CRUD),
    (SubjectTag::Webhooks, CRUD),
    (SubjectTag::ServiceTokens, CRUD),
    (SubjectTag::Settings, CRUD),
    (SubjectTag::Environments, CRUD),
    (SubjectTag::Tags, CRUD),
    (SubjectTag::AuditLogs, CRUD),
    (SubjectTag::IpAllowlist, CRUD),
    (SubjectTag::Project, &[Verb::Edit, Verb::Delete]),
    (SubjectTag::Kms, &[Verb::Edit]),
    (SubjectTag::Cmek, CRUD),
];

/// Verbs the schema allows for a subject
pub fn schema_verbs(subject: SubjectTag) -> &'static [Verb] {
    SUBJECT_SCHEMA
        .iter()
        .find(|(tag, _)| *tag == subject)
        .map(|(_, verbs)| *verbs)
        .unwrap_or(&[])
}

/// Whether the (verb, subject) pair is part of the declared schema
pub fn schema_allows(verb: Verb, subject: SubjectTag) -> bool {
    schema_verbs(subject).contains(&verb)
}

/// Whether a condition value carries glob metacharacters
pub fn has_glob_meta(value: &str) -> bool {
    value.contains(['*', '?', '['])
}

/// Compile a glob pattern, mapping invalid patterns to `BadRequest`
pub fn compile_glob(pattern: &str) -> Result<glob::Pattern> {
    glob::Pattern::new(pattern).map_err(|err| {
        WardenError::bad_request(format!("glob pattern '{pattern}' is invalid: {err}"))
    })
}

/// Validate a rule set against the schema before it is stored or applied.
///
/// Rejects empty action lists, (verb, subject) pairs outside the schema,
/// glob conditions that do not compile, and template tokens outside the
/// closed grammar. Runs before any mutation; nothing invalid reaches the
/// evaluator.
pub fn validate_rule_set(rules: &RuleSet) -> Result<()> {
    for rule in rules {
        if rule.actions.is_empty() {
            return Err(WardenError::bad_request(format!(
                "rule on subject '{}' declares no actions",
                rule.subject
            )));
        }
        for verb in &rule.actions {
            if !schema_allows(*verb, rule.subject) {
                return Err(WardenError::bad_request(format!(
                    "permission action '{verb}' on subject '{}' is not valid",
                    rule.subject
                )));
            }
        }
        let Some(conditions) = &rule.conditions else {
            continue;
        };
        for (field, condition) in conditions {
            let values: Vec<&String> = match condition {
                Condition::Eq(v) | Condition::Ne(v) | Condition::Glob(v) => vec![v],
                Condition::In(vs) => vs.iter().collect(),
            };
            for value in &values {
                for token in template::tokens(value) {
                    if !template::is_known_token(token) {
                        return Err(WardenError::bad_request(format!(
                            "condition '{field}' on subject '{}' references unknown template token '{token}'",
                            rule.subject
                        )));
                    }
                }
            }
            if let Condition::Glob(pattern) = condition {
                // Patterns carrying tokens are checked after interpolation.
                if !template::has_tokens(pattern) {
                    compile_glob(pattern).map_err(|_| {
                        WardenError::bad_request(format!(
                            "condition '{field}' on subject '{}' has invalid glob pattern '{pattern}'",
                            rule.subject
                        ))
                    })?;
                }
            }
        }
    }
    Ok(())
}
