//! Authentication Module
//!
//! Identities and their grants, the identity store contract, and credential
//! verification with failed-attempt lockout.

pub mod credentials;
pub mod identity;

pub use credentials::{CredentialVerifier, LockoutTable, SecretHasher};
pub use identity::{
    CampaignId, Grant, GrantScope, Identity, IdentityStore, LockoutRecord, MemoryIdentityStore,
};
