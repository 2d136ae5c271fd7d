//! Identifier types used across the Warden platform
//!
//! Every entity gets its own UUID newtype so a membership id can never be
//! passed where a privilege id is expected. All identifiers serialize
//! transparently as their inner UUID.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random id
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create from a UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            pub fn uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// Identifies a human user
    UserId,
    "user"
);

define_id!(
    /// Identifies a machine identity
    IdentityId,
    "identity"
);

define_id!(
    /// Identifies a service token
    ServiceTokenId,
    "service-token"
);

define_id!(
    /// Identifies an organization (tenant)
    OrgId,
    "org"
);

define_id!(
    /// Identifies a project within an organization
    ProjectId,
    "project"
);

define_id!(
    /// Identifies a project environment
    EnvironmentId,
    "env"
);

define_id!(
    /// Identifies a user group
    GroupId,
    "group"
);

define_id!(
    /// Identifies a direct project membership
    MembershipId,
    "membership"
);

define_id!(
    /// Identifies a group's project membership
    GroupMembershipId,
    "group-membership"
);

define_id!(
    /// Identifies a project role row
    RoleId,
    "role"
);

define_id!(
    /// Identifies an access approval policy
    PolicyId,
    "policy"
);

define_id!(
    /// Identifies an access approval request
    RequestId,
    "request"
);

define_id!(
    /// Identifies a reviewer row on an approval request
    ReviewId,
    "review"
);

define_id!(
    /// Identifies an additional privilege row
    PrivilegeId,
    "privilege"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_prefix() {
        let id = PolicyId::new();
        assert!(id.to_string().starts_with("policy-"));
    }

    #[test]
    fn serializes_as_bare_uuid() {
        let id = RequestId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.uuid()));
        let back: RequestId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
