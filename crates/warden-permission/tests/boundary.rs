//! Privilege boundary comparator behavior
//!
//! Exercises the structured comparator across every parent/child operator
//! pairing, the inverted-rule carve-outs, and the legacy exact comparator.

use warden_core::rules::{
    Condition, ConditionSet, MissingPermission, Rule, RuleSet, SubjectTag, Verb,
    FIELD_ENVIRONMENT, FIELD_SECRET_PATH,
};
use warden_core::WardenError;
use warden_permission::{
    enforce_permission_boundary, is_at_least_as_privileged, validate_permission_boundary, Ability,
};

fn ability(rules: Vec<Rule>) -> Ability {
    Ability::from_rules(RuleSet(rules))
}

fn conditions(entries: &[(&str, Condition)]) -> ConditionSet {
    entries
        .iter()
        .map(|(field, condition)| (field.to_string(), condition.clone()))
        .collect()
}

fn secrets_rule(actions: &[Verb], entries: &[(&str, Condition)]) -> Rule {
    let rule = Rule::allow(actions.iter().copied(), SubjectTag::Secrets);
    if entries.is_empty() {
        rule
    } else {
        rule.with_conditions(conditions(entries))
    }
}

const CRUD: &[Verb] = &[Verb::Create, Verb::Edit, Verb::Delete, Verb::Read];

#[test]
fn child_with_equal_privilege_is_valid() {
    let parent = ability(vec![secrets_rule(CRUD, &[])]);
    let child = ability(vec![secrets_rule(CRUD, &[])]);
    assert!(validate_permission_boundary(&parent, &child).is_valid);
}

#[test]
fn child_with_less_privilege_is_valid() {
    let parent = ability(vec![secrets_rule(CRUD, &[])]);
    let child = ability(vec![secrets_rule(&[Verb::Create, Verb::Edit], &[])]);
    assert!(validate_permission_boundary(&parent, &child).is_valid);
}

#[test]
fn child_with_more_privilege_reports_the_missing_action() {
    let parent = ability(vec![secrets_rule(&[Verb::Create], &[])]);
    let child = ability(vec![secrets_rule(&[Verb::Create, Verb::Edit], &[])]);
    let check = validate_permission_boundary(&parent, &child);
    assert!(!check.is_valid);
    assert_eq!(
        check.missing_permissions,
        vec![MissingPermission {
            action: Verb::Edit,
            subject: SubjectTag::Secrets,
            conditions: None,
        }]
    );
}

#[test]
fn multi_subject_subsets_are_valid() {
    let parent = ability(vec![
        secrets_rule(&[Verb::Create], &[]),
        Rule::allow([Verb::Create, Verb::Edit], SubjectTag::Member),
    ]);
    let child = ability(vec![
        Rule::allow([Verb::Create], SubjectTag::Member),
        secrets_rule(&[Verb::Create], &[]),
    ]);
    assert!(validate_permission_boundary(&parent, &child).is_valid);
}

#[test]
fn child_with_no_access_is_valid() {
    let parent = ability(vec![secrets_rule(&[Verb::Create], &[])]);
    let child = ability(vec![]);
    assert!(validate_permission_boundary(&parent, &child).is_valid);
}

#[test]
fn disjoint_condition_fields_are_not_covered() {
    let parent = ability(vec![secrets_rule(
        CRUD,
        &[(FIELD_ENVIRONMENT, Condition::Eq("dev".into()))],
    )]);
    let child = ability(vec![secrets_rule(
        CRUD,
        &[(FIELD_SECRET_PATH, Condition::Eq("dev".into()))],
    )]);
    let check = validate_permission_boundary(&parent, &child);
    assert!(!check.is_valid);
    assert_eq!(check.missing_permissions.len(), 4);
}

mod parent_eq {
    use super::*;

    fn parent() -> Ability {
        ability(vec![secrets_rule(
            &[Verb::Create, Verb::Read],
            &[(FIELD_ENVIRONMENT, Condition::Eq("dev".into()))],
        )])
    }

    #[test]
    fn contains_matching_children() {
        for child_condition in [
            Condition::Eq("dev".into()),
            Condition::In(vec!["dev".into()]),
            Condition::Glob("dev".into()),
        ] {
            let child = ability(vec![secrets_rule(
                &[Verb::Create],
                &[(FIELD_ENVIRONMENT, child_condition.clone())],
            )]);
            assert!(
                validate_permission_boundary(&parent(), &child).is_valid,
                "expected {child_condition:?} to be contained"
            );
        }
    }

    #[test]
    fn rejects_escaping_children() {
        for child_condition in [
            Condition::Eq("prod".into()),
            Condition::In(vec!["dev".into(), "prod".into()]),
            Condition::Glob("dev*".into()),
            Condition::Ne("staging".into()),
        ] {
            let child = ability(vec![secrets_rule(
                &[Verb::Create],
                &[(FIELD_ENVIRONMENT, child_condition.clone())],
            )]);
            assert!(
                !validate_permission_boundary(&parent(), &child).is_valid,
                "expected {child_condition:?} to escape"
            );
        }
    }
}

mod parent_ne {
    use super::*;

    fn parent() -> Ability {
        ability(vec![secrets_rule(
            &[Verb::Create, Verb::Read],
            &[(FIELD_SECRET_PATH, Condition::Ne("/hello".into()))],
        )])
    }

    #[test]
    fn contains_children_that_avoid_the_excluded_value() {
        for child_condition in [
            Condition::Eq("/".into()),
            Condition::Ne("/hello".into()),
            Condition::In(vec!["/".into(), "/staging".into()]),
            Condition::Glob("/dev*".into()),
        ] {
            let child = ability(vec![secrets_rule(
                &[Verb::Create],
                &[(FIELD_SECRET_PATH, child_condition.clone())],
            )]);
            assert!(
                validate_permission_boundary(&parent(), &child).is_valid,
                "expected {child_condition:?} to be contained"
            );
        }
    }

    #[test]
    fn rejects_children_that_can_reach_the_excluded_value() {
        for child_condition in [
            Condition::Eq("/hello".into()),
            Condition::Ne("/".into()),
            Condition::In(vec!["/".into(), "/hello".into()]),
            Condition::Glob("/hello*".into()),
        ] {
            let child = ability(vec![secrets_rule(
                &[Verb::Create],
                &[(FIELD_SECRET_PATH, child_condition.clone())],
            )]);
            assert!(
                !validate_permission_boundary(&parent(), &child).is_valid,
                "expected {child_condition:?} to escape"
            );
        }
    }
}

mod parent_in {
    use super::*;

    fn parent() -> Ability {
        ability(vec![secrets_rule(
            &[Verb::Edit],
            &[(
                FIELD_ENVIRONMENT,
                Condition::In(vec!["dev".into(), "staging".into()]),
            )],
        )])
    }

    #[test]
    fn contains_subset_children() {
        for child_condition in [
            Condition::Eq("dev".into()),
            Condition::In(vec!["dev".into()]),
            Condition::In(vec!["dev".into(), "staging".into()]),
            Condition::Glob("dev".into()),
        ] {
            let child = ability(vec![secrets_rule(
                &[Verb::Edit],
                &[(FIELD_ENVIRONMENT, child_condition.clone())],
            )]);
            assert!(
                validate_permission_boundary(&parent(), &child).is_valid,
                "expected {child_condition:?} to be contained"
            );
        }
    }

    #[test]
    fn rejects_children_outside_the_set() {
        for child_condition in [
            Condition::Eq("prod".into()),
            Condition::Ne("dev".into()),
            Condition::In(vec!["dev".into(), "prod".into()]),
            Condition::Glob("dev*".into()),
        ] {
            let child = ability(vec![secrets_rule(
                &[Verb::Edit],
                &[(FIELD_ENVIRONMENT, child_condition.clone())],
            )]);
            assert!(
                !validate_permission_boundary(&parent(), &child).is_valid,
                "expected {child_condition:?} to escape"
            );
        }
    }
}

mod parent_glob {
    use super::*;

    fn parent() -> Ability {
        ability(vec![secrets_rule(
            &[Verb::Create, Verb::Read],
            &[(FIELD_SECRET_PATH, Condition::Glob("/hello/**".into()))],
        )])
    }

    #[test]
    fn contains_children_inside_the_pattern() {
        for child_condition in [
            Condition::Eq("/hello/world".into()),
            Condition::In(vec!["/hello/world".into(), "/hello/world2".into()]),
            Condition::Glob("/hello/**/world".into()),
        ] {
            let child = ability(vec![secrets_rule(
                &[Verb::Create],
                &[(FIELD_SECRET_PATH, child_condition.clone())],
            )]);
            assert!(
                validate_permission_boundary(&parent(), &child).is_valid,
                "expected {child_condition:?} to be contained"
            );
        }
    }

    #[test]
    fn rejects_children_outside_the_pattern() {
        for child_condition in [
            Condition::Eq("/print".into()),
            Condition::Ne("/hello/world".into()),
            Condition::In(vec!["/".into(), "/hello".into()]),
            Condition::Glob("/hello*".into()),
        ] {
            let child = ability(vec![secrets_rule(
                &[Verb::Create],
                &[(FIELD_SECRET_PATH, child_condition.clone())],
            )]);
            assert!(
                !validate_permission_boundary(&parent(), &child).is_valid,
                "expected {child_condition:?} to escape"
            );
        }
    }
}

mod inverted_parent_rules {
    use super::*;

    fn parent() -> Ability {
        ability(vec![
            secrets_rule(CRUD, &[(FIELD_ENVIRONMENT, Condition::Eq("dev".into()))]),
            secrets_rule(
                &[Verb::Read],
                &[
                    (FIELD_ENVIRONMENT, Condition::Eq("dev".into())),
                    (FIELD_SECRET_PATH, Condition::Glob("/hello/**".into())),
                ],
            )
            .inverted(),
        ])
    }

    #[test]
    fn child_outside_the_carve_out_is_valid() {
        let child = ability(vec![secrets_rule(
            &[Verb::Read],
            &[
                (FIELD_ENVIRONMENT, Condition::Eq("dev".into())),
                (FIELD_SECRET_PATH, Condition::Eq("/".into())),
            ],
        )]);
        assert!(validate_permission_boundary(&parent(), &child).is_valid);
    }

    #[test]
    fn child_inside_the_carve_out_is_rejected_with_the_offending_rule() {
        let child_conditions = conditions(&[
            (FIELD_ENVIRONMENT, Condition::Eq("dev".into())),
            (FIELD_SECRET_PATH, Condition::Eq("/hello/world".into())),
        ]);
        let child = ability(vec![Rule::allow([Verb::Read], SubjectTag::Secrets)
            .with_conditions(child_conditions.clone())]);
        let check = validate_permission_boundary(&parent(), &child);
        assert!(!check.is_valid);
        assert_eq!(
            check.missing_permissions,
            vec![MissingPermission {
                action: Verb::Read,
                subject: SubjectTag::Secrets,
                conditions: Some(child_conditions),
            }]
        );
    }
}

#[test]
fn enforcement_surfaces_the_structured_payload() {
    let grantor = ability(vec![secrets_rule(&[Verb::Read, Verb::Create], &[])]);
    let proposed = ability(vec![secrets_rule(&[Verb::Read, Verb::Create, Verb::Delete], &[])]);
    match enforce_permission_boundary(&grantor, &proposed) {
        Err(WardenError::PermissionBoundary {
            missing_permissions,
            ..
        }) => {
            assert_eq!(
                missing_permissions,
                vec![MissingPermission {
                    action: Verb::Delete,
                    subject: SubjectTag::Secrets,
                    conditions: None,
                }]
            );
        }
        other => panic!("expected a permission boundary error, got {other:?}"),
    }
    enforce_permission_boundary(&grantor, &grantor).unwrap();
}

mod legacy_comparator {
    use super::*;

    #[test]
    fn rejects_supersets_and_accepts_subsets() {
        let grantor = ability(vec![secrets_rule(&[Verb::Read, Verb::Create], &[])]);
        let superset = ability(vec![secrets_rule(&[Verb::Read, Verb::Create, Verb::Delete], &[])]);
        let subset = ability(vec![secrets_rule(&[Verb::Read], &[])]);
        assert!(!is_at_least_as_privileged(&grantor, &superset));
        assert!(is_at_least_as_privileged(&grantor, &subset));
        assert!(is_at_least_as_privileged(&grantor, &grantor));
    }

    #[test]
    fn disjoint_subjects_fail_the_subset_test() {
        let grantor = ability(vec![secrets_rule(&[Verb::Read], &[])]);
        let proposed = ability(vec![Rule::allow([Verb::Read], SubjectTag::Member)]);
        assert!(!is_at_least_as_privileged(&grantor, &proposed));
    }
}
