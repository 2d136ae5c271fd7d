//! Ability composition
//!
//! Expands role presets and custom rule blobs into one flat rule list:
//! direct role rules, then group-derived role rules, then additional
//! privileges, concatenated in encounter order. Union is commutative for
//! positive rules; inverted rules suppress matches regardless of order.
//! Expired temporary assignments and privileges contribute nothing.

use crate::evaluate::Ability;
use crate::interpolate::interpolate_rule_set;
use crate::roles::assignment_rules;
use tracing::debug;
use warden_core::principal::TemplateContext;
use warden_core::rules::{Condition, ConditionSet, Rule, RuleSet, SubjectTag, Verb};
use warden_core::rules::{FIELD_ENVIRONMENT, FIELD_SECRET_PATH};
use warden_core::time::Timestamp;
use warden_core::Result;
use warden_store::records::{PrivilegeRecord, RoleAssignment};

/// Compose an ability from resolved role assignments and privileges.
///
/// The composed set is interpolated once against the template context so
/// callers can reuse it across every resource touched by one request.
pub fn build_ability(
    direct_roles: &[RoleAssignment],
    group_roles: &[RoleAssignment],
    privileges: &[PrivilegeRecord],
    context: &TemplateContext,
    now: Timestamp,
) -> Result<Ability> {
    let mut composed = RuleSet::new();

    for assignment in live_assignments(direct_roles, now).chain(live_assignments(group_roles, now))
    {
        composed.0.extend(assignment_rules(assignment)?);
    }

    for privilege in privileges {
        if privilege.is_expired(now) {
            continue;
        }
        composed.0.extend(privilege.permissions.iter().cloned());
    }

    debug!(rules = composed.len(), "composed ability");
    Ok(Ability::from_rules(interpolate_rule_set(composed, context)))
}

fn live_assignments<'a>(
    assignments: &'a [RoleAssignment],
    now: Timestamp,
) -> impl Iterator<Item = &'a RoleAssignment> {
    assignments
        .iter()
        .filter(move |assignment| !assignment.is_expired(now))
}

/// One path/environment scope of a service token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenScope {
    pub secret_path: String,
    pub environment: String,
}

/// Build the ability of a service token from its scopes and coarse
/// read/write flags. No role composition is involved: write implies
/// create/edit/delete on secrets under the glob path in the exact
/// environment, read implies read.
pub fn service_token_ability(scopes: &[TokenScope], read: bool, write: bool) -> Ability {
    let mut rules = RuleSet::new();
    for scope in scopes {
        let conditions: ConditionSet = [
            (
                FIELD_SECRET_PATH.to_string(),
                Condition::Glob(scope.secret_path.clone()),
            ),
            (
                FIELD_ENVIRONMENT.to_string(),
                Condition::Eq(scope.environment.clone()),
            ),
        ]
        .into_iter()
        .collect();
        if write {
            for verb in [Verb::Create, Verb::Edit, Verb::Delete] {
                rules.push(
                    Rule::allow([verb], SubjectTag::Secrets).with_conditions(conditions.clone()),
                );
            }
        }
        if read {
            rules.push(Rule::allow([Verb::Read], SubjectTag::Secrets).with_conditions(conditions));
        }
    }
    Ability::from_rules(rules)
}
