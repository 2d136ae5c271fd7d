//! Persistence contract and in-memory store for Warden
//!
//! The real relational store lives in the surrounding service layer; this
//! crate defines the row records it must produce and the async traits the
//! permission and approval services consume. `MemoryStore` implements the
//! whole contract in-process for tests and embedding.

pub mod memory;
pub mod records;
pub mod traits;

pub use memory::MemoryStore;
pub use records::{
    ApproverRef, BypasserRef, EnforcementLevel, GroupProjectMembershipRecord, GroupRecord,
    IdentityMembershipRecord, MembershipRecord, MembershipRef, OrgMembershipRecord, OrgRecord,
    PolicyRecord, PrivilegeRecord, RequestRecord, RequestStatus, ReviewRecord, ReviewStatus,
    RoleAssignment, RoleRecord,
};
pub use traits::{
    GroupStore, MembershipStore, OrgStore, PolicyStore, PrivilegeStore, RequestStore,
    RequestTransaction,
};
