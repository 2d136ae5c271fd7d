//! Identity token interpolation over rule conditions
//!
//! Runs once per ability build, before evaluation. Tokens the dictionary
//! can answer are substituted into the condition values; tokens it cannot
//! answer stay in place as unresolved markers, which the evaluator and
//! boundary validator treat as matching nothing. Unknown token *shapes*
//! never get this far: they are rejected when the rule set is validated.

use warden_core::principal::TemplateContext;
use warden_core::rules::{Condition, Rule, RuleSet};
use warden_core::template;

/// Whether a condition value still carries an unresolved template token.
///
/// Such a value is the fail-closed sentinel: it satisfies no operator,
/// including `$neq`.
pub fn is_unresolved(value: &str) -> bool {
    template::has_tokens(value)
}

/// Substitute identity tokens into every condition of the rule set.
pub fn interpolate_rule_set(rules: RuleSet, context: &TemplateContext) -> RuleSet {
    rules
        .into_iter()
        .map(|rule| interpolate_rule(rule, context))
        .collect()
}

fn interpolate_rule(mut rule: Rule, context: &TemplateContext) -> Rule {
    if let Some(conditions) = &mut rule.conditions {
        for condition in conditions.values_mut() {
            match condition {
                Condition::Eq(value) | Condition::Ne(value) | Condition::Glob(value) => {
                    *value = template::render(value, |token| context.resolve(token));
                }
                Condition::In(values) => {
                    for value in values {
                        *value = template::render(value, |token| context.resolve(token));
                    }
                }
            }
        }
    }
    rule
}
