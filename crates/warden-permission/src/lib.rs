//! Ability engine for Warden
//!
//! Answers `can(action, subject, attrs)` for a principal in a project:
//! role presets and custom rule blobs expand into one flat rule list,
//! identity tokens interpolate into rule conditions, and evaluation is a
//! pure function over the composed list. The privilege boundary validator
//! keeps grantors from handing out access they do not hold.
//!
//! Resolution order for every permission-gated call:
//! resolver → builder → interpolator → evaluator. The composed ability is
//! built once per request and reused across resources.

pub mod boundary;
pub mod builder;
pub mod evaluate;
pub mod interpolate;
pub mod resolver;
pub mod roles;

pub use boundary::{
    enforce_permission_boundary, is_at_least_as_privileged, validate_permission_boundary,
    BoundaryCheck,
};
pub use builder::{build_ability, service_token_ability, TokenScope};
pub use evaluate::{Ability, SubjectAttrs};
pub use interpolate::interpolate_rule_set;
pub use resolver::{
    OrgPermission, PermissionScope, PermissionService, ProjectPermission, ResolveOptions,
};
pub use roles::{assignment_rules, builtin_role_rules, BuiltinRole};
