//! Ability evaluation
//!
//! An ability is the fully composed, evaluable rule list for a principal
//! in a scope. `can` is a pure function over that list: access is granted
//! iff some non-inverted rule matches the action, subject, and attributes,
//! and no inverted rule matches the same query. Inverted rules suppress
//! positive grants irrespective of where they sit in the list.

use crate::interpolate::is_unresolved;
use std::collections::HashMap;
use warden_core::rules::{Condition, Rule, RuleSet, SubjectTag, Verb};

/// Attribute values a permission check is scoped by
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectAttrs(HashMap<String, String>);

impl SubjectAttrs {
    /// No attributes
    pub fn none() -> Self {
        Self::default()
    }

    /// Attributes for a secrets-scoped check
    pub fn secret(environment: impl Into<String>, secret_path: impl Into<String>) -> Self {
        Self::none()
            .with(warden_core::rules::FIELD_ENVIRONMENT, environment)
            .with(warden_core::rules::FIELD_SECRET_PATH, secret_path)
    }

    /// Add one attribute
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Look up one attribute
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }
}

/// The fully composed rule set for a principal in a scope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ability {
    rules: Vec<Rule>,
}

impl Ability {
    /// Build from an already-composed rule list
    pub fn from_rules(rules: RuleSet) -> Self {
        Self { rules: rules.0 }
    }

    /// The composed rules, in encounter order
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Whether the ability grants the action on the subject under the
    /// given attributes.
    pub fn can(&self, action: Verb, subject: SubjectTag, attrs: &SubjectAttrs) -> bool {
        let mut allowed = false;
        for rule in &self.rules {
            if !rule_matches(rule, action, subject, attrs) {
                continue;
            }
            if rule.inverted {
                return false;
            }
            allowed = true;
        }
        allowed
    }

    /// Canonical (action, subject) pairs granted by non-inverted rules
    pub fn permission_pairs(&self) -> std::collections::BTreeSet<(Verb, SubjectTag)> {
        self.rules
            .iter()
            .filter(|rule| !rule.inverted)
            .flat_map(|rule| rule.actions.iter().map(|verb| (*verb, rule.subject)))
            .collect()
    }
}

fn rule_matches(rule: &Rule, action: Verb, subject: SubjectTag, attrs: &SubjectAttrs) -> bool {
    if rule.subject != subject || !rule.actions.contains(&action) {
        return false;
    }
    let Some(conditions) = &rule.conditions else {
        return true;
    };
    conditions
        .iter()
        .all(|(field, condition)| condition_matches(condition, attrs.get(field)))
}

/// Whether one condition accepts the attribute value.
///
/// A missing attribute satisfies nothing, and an unresolved template
/// value satisfies nothing either; both fail closed, `$neq` included.
fn condition_matches(condition: &Condition, actual: Option<&str>) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    match condition {
        Condition::Eq(expected) => !is_unresolved(expected) && actual == expected,
        Condition::Ne(expected) => !is_unresolved(expected) && actual != expected,
        Condition::In(expected) => {
            expected.iter().all(|value| !is_unresolved(value))
                && expected.iter().any(|value| value == actual)
        }
        Condition::Glob(pattern) => {
            !is_unresolved(pattern)
                && glob::Pattern::new(pattern)
                    .map(|pattern| pattern.matches(actual))
                    .unwrap_or(false)
        }
    }
}
