//! Permission System
//!
//! Operation rules, role catalog and the authorization engine that evaluates
//! them against a session's identity.

pub mod engine;
pub mod registry;

pub use engine::{AuthorizationDecision, AuthorizationEngine, DecisionOutcome, DenyReason};
pub use registry::{
    Permission, PermissionRegistry, PermissionRegistryBuilder, PermissionRule, RoleCatalog,
    ScopeKind,
};
