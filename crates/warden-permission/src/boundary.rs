//! Privilege boundary validation
//!
//! A grantor must never hand out more access than it holds. Two
//! comparators exist side by side: the legacy boolean comparator used by
//! the older privilege endpoints compares exact (action, subject) sets,
//! while the structured comparator walks rule conditions and reports the
//! specific permissions the grantor is missing.

use crate::evaluate::Ability;
use crate::interpolate::is_unresolved;
use warden_core::rules::{has_glob_meta, Condition, ConditionSet, MissingPermission, Rule};
use warden_core::{Result, WardenError};

/// Outcome of the structured boundary comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryCheck {
    pub is_valid: bool,
    pub missing_permissions: Vec<MissingPermission>,
}

/// Legacy comparator: exact (action, subject) subset test.
///
/// The grantor must hold at least as many canonical pairs as it hands
/// out; a bare subset test alone misses rule shapes that encode broader
/// real-world access.
pub fn is_at_least_as_privileged(grantor: &Ability, proposed: &Ability) -> bool {
    let grantor_pairs = grantor.permission_pairs();
    let proposed_pairs = proposed.permission_pairs();
    proposed_pairs.is_subset(&grantor_pairs) && grantor_pairs.len() >= proposed_pairs.len()
}

/// Structured comparator: every proposed rule must be covered by a
/// grantor rule with equal-or-broader conditions and must not intersect
/// any of the grantor's inverted carve-outs.
pub fn validate_permission_boundary(grantor: &Ability, proposed: &Ability) -> BoundaryCheck {
    let mut missing = Vec::new();
    for rule in proposed.rules().iter().filter(|rule| !rule.inverted) {
        for action in &rule.actions {
            let covered = grantor
                .rules()
                .iter()
                .filter(|parent| {
                    !parent.inverted
                        && parent.subject == rule.subject
                        && parent.actions.contains(action)
                })
                .any(|parent| parent_covers(parent, rule));
            let carved_out = grantor
                .rules()
                .iter()
                .filter(|parent| {
                    parent.inverted
                        && parent.subject == rule.subject
                        && parent.actions.contains(action)
                })
                .any(|parent| may_overlap(parent, rule));
            if !covered || carved_out {
                missing.push(MissingPermission {
                    action: *action,
                    subject: rule.subject,
                    conditions: rule.conditions.clone(),
                });
            }
        }
    }
    BoundaryCheck {
        is_valid: missing.is_empty(),
        missing_permissions: missing,
    }
}

/// Run the structured comparator and surface a failure as the dedicated
/// boundary error, distinct from a plain `Forbidden`.
pub fn enforce_permission_boundary(grantor: &Ability, proposed: &Ability) -> Result<()> {
    let check = validate_permission_boundary(grantor, proposed);
    if check.is_valid {
        return Ok(());
    }
    Err(WardenError::permission_boundary(
        "requested privileges exceed the grantor's own access",
        check.missing_permissions,
    ))
}

/// Whether the parent rule's conditions cover the child rule's.
///
/// A parent with no condition on a field is unrestricted there; a parent
/// condition with no child counterpart means the child is broader and is
/// not covered.
fn parent_covers(parent: &Rule, child: &Rule) -> bool {
    let Some(parent_conditions) = &parent.conditions else {
        return true;
    };
    let child_conditions = match &child.conditions {
        Some(conditions) => conditions,
        None => return false,
    };
    parent_conditions.iter().all(|(field, parent_condition)| {
        child_conditions
            .get(field)
            .is_some_and(|child_condition| condition_contains(parent_condition, child_condition))
    })
}

/// Whether the set of values accepted by `child` is contained in the set
/// accepted by `parent`.
fn condition_contains(parent: &Condition, child: &Condition) -> bool {
    if condition_values(parent)
        .chain(condition_values(child))
        .any(is_unresolved_str)
    {
        return false;
    }
    match (parent, child) {
        (Condition::Eq(pv), Condition::Eq(cv)) => pv == cv,
        (Condition::Eq(pv), Condition::In(cvs)) => cvs.iter().all(|cv| cv == pv),
        (Condition::Eq(pv), Condition::Glob(cp)) => !has_glob_meta(cp) && cp == pv,
        (Condition::Eq(_), Condition::Ne(_)) => false,

        (Condition::Ne(pv), Condition::Eq(cv)) => cv != pv,
        (Condition::Ne(pv), Condition::Ne(cv)) => cv == pv,
        (Condition::Ne(pv), Condition::In(cvs)) => !cvs.contains(pv),
        (Condition::Ne(pv), Condition::Glob(cp)) => !glob_matches(cp, pv),

        (Condition::In(pvs), Condition::Eq(cv)) => pvs.contains(cv),
        (Condition::In(pvs), Condition::In(cvs)) => cvs.iter().all(|cv| pvs.contains(cv)),
        (Condition::In(pvs), Condition::Glob(cp)) => !has_glob_meta(cp) && pvs.contains(cp),
        (Condition::In(_), Condition::Ne(_)) => false,

        (Condition::Glob(pp), Condition::Eq(cv)) => glob_matches(pp, cv),
        (Condition::Glob(pp), Condition::In(cvs)) => cvs.iter().all(|cv| glob_matches(pp, cv)),
        // Pattern-on-pattern: the child pattern string must itself fall
        // inside the parent pattern.
        (Condition::Glob(pp), Condition::Glob(cp)) => glob_matches(pp, cp),
        (Condition::Glob(_), Condition::Ne(_)) => false,
    }
}

/// Whether an inverted parent rule can intersect the child's request
/// space. Conservative: overlap is assumed unless some carve-out field is
/// provably disjoint from the child's condition on that field.
fn may_overlap(deny: &Rule, child: &Rule) -> bool {
    let Some(deny_conditions) = &deny.conditions else {
        // Unconditional carve-out denies the whole (action, subject).
        return true;
    };
    let child_conditions: Option<&ConditionSet> = child.conditions.as_ref();
    deny_conditions.iter().all(|(field, deny_condition)| {
        match child_conditions.and_then(|conditions| conditions.get(field)) {
            // Child unrestricted on this field: values inside the
            // carve-out are reachable.
            None => true,
            Some(child_condition) => !provably_disjoint(deny_condition, child_condition),
        }
    })
}

fn provably_disjoint(deny: &Condition, child: &Condition) -> bool {
    if condition_values(deny)
        .chain(condition_values(child))
        .any(is_unresolved_str)
    {
        return false;
    }
    match (deny, child) {
        (Condition::Eq(dv), Condition::Eq(cv)) => dv != cv,
        (Condition::Eq(dv), Condition::In(cvs)) => !cvs.contains(dv),
        (Condition::Eq(dv), Condition::Glob(cp)) => !glob_matches(cp, dv),
        (Condition::Eq(dv), Condition::Ne(cv)) => cv == dv,

        (Condition::Ne(dv), Condition::Eq(cv)) => cv == dv,
        (Condition::Ne(_), _) => false,

        (Condition::In(dvs), Condition::Eq(cv)) => !dvs.contains(cv),
        (Condition::In(dvs), Condition::In(cvs)) => !cvs.iter().any(|cv| dvs.contains(cv)),
        (Condition::In(dvs), Condition::Glob(cp)) => !dvs.iter().any(|dv| glob_matches(cp, dv)),
        (Condition::In(dvs), Condition::Ne(cv)) => dvs.iter().all(|dv| dv == cv),

        (Condition::Glob(dp), Condition::Eq(cv)) => !glob_matches(dp, cv),
        (Condition::Glob(dp), Condition::In(cvs)) => !cvs.iter().any(|cv| glob_matches(dp, cv)),
        // Glob-versus-glob disjointness is undecidable cheaply; stay
        // conservative and treat the sets as overlapping.
        (Condition::Glob(_), Condition::Glob(_)) => false,
        (Condition::Glob(_), Condition::Ne(_)) => false,
    }
}

fn condition_values(condition: &Condition) -> Box<dyn Iterator<Item = &str> + '_> {
    match condition {
        Condition::Eq(value) | Condition::Ne(value) | Condition::Glob(value) => {
            Box::new(std::iter::once(value.as_str()))
        }
        Condition::In(values) => Box::new(values.iter().map(String::as_str)),
    }
}

fn is_unresolved_str(value: &str) -> bool {
    is_unresolved(value)
}

fn glob_matches(pattern: &str, value: &str) -> bool {
    glob::Pattern::new(pattern)
        .map(|pattern| pattern.matches(value))
        .unwrap_or(false)
}
