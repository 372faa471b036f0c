//! Identity Management
//!
//! Identity, grant and lockout types plus the identity store contract. The
//! store is the source of truth for role assignments; this crate only ever
//! writes lockout state back to it.

use crate::permissions::Permission;
use crate::{AaaError, AaaResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

/// Campaign identifier used as an authorization target
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CampaignId(String);

impl CampaignId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CampaignId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CampaignId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CampaignId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Where a granted permission applies
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "campaign", rename_all = "snake_case")]
pub enum GrantScope {
    /// Every campaign, and operations that are not campaign specific
    Global,
    /// A single campaign
    Campaign(CampaignId),
}

impl std::fmt::Display for GrantScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GrantScope::Global => write!(f, "global"),
            GrantScope::Campaign(id) => write!(f, "campaign:{}", id),
        }
    }
}

/// A permission held directly by an identity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Grant {
    pub permission: Permission,
    pub scope: GrantScope,
}

impl Grant {
    pub fn global(permission: Permission) -> Self {
        Self {
            permission,
            scope: GrantScope::Global,
        }
    }

    pub fn campaign<C: Into<CampaignId>>(permission: Permission, campaign: C) -> Self {
        Self {
            permission,
            scope: GrantScope::Campaign(campaign.into()),
        }
    }

    pub fn is_global(&self) -> bool {
        self.scope == GrantScope::Global
    }

    /// Whether this grant applies to `target`; a scoped grant never applies without a target
    pub fn covers(&self, target: Option<&CampaignId>) -> bool {
        match (&self.scope, target) {
            (GrantScope::Global, _) => true,
            (GrantScope::Campaign(scoped), Some(target)) => scoped == target,
            (GrantScope::Campaign(_), None) => false,
        }
    }
}

/// Failed-attempt state of one identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutRecord {
    pub failed_attempts: u32,
    pub window_start: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
}

impl LockoutRecord {
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }

    pub fn is_clear(&self) -> bool {
        self == &Self::default()
    }
}

/// A local operator account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Unique account name
    pub name: String,
    /// Role names resolved through the role catalog
    pub roles: BTreeSet<String>,
    /// Permissions held directly, globally or per campaign
    pub grants: BTreeSet<Grant>,
    pub lockout: LockoutRecord,
}

impl Identity {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            roles: BTreeSet::new(),
            grants: BTreeSet::new(),
            lockout: LockoutRecord::default(),
        }
    }

    pub fn with_role<S: Into<String>>(mut self, role: S) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn with_grant(mut self, grant: Grant) -> Self {
        self.grants.insert(grant);
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// External identity store contract
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Fetch an identity by name
    async fn lookup_identity(&self, name: &str) -> AaaResult<Option<Identity>>;

    /// PHC-formatted secret hash of an identity
    async fn secret_hash(&self, name: &str) -> AaaResult<Option<String>>;

    /// Persist an identity's lockout state
    async fn update_lockout(&self, name: &str, record: &LockoutRecord) -> AaaResult<()>;
}

#[derive(Debug, Clone)]
struct StoredIdentity {
    identity: Identity,
    secret_hash: String,
}

/// In-memory identity store for testing and small deployments
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    identities: RwLock<HashMap<String, StoredIdentity>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an identity together with its secret hash
    pub async fn add_identity(&self, identity: Identity, secret_hash: String) {
        let mut identities = self.identities.write().await;
        identities.insert(
            identity.name.clone(),
            StoredIdentity {
                identity,
                secret_hash,
            },
        );
    }

    pub async fn set_roles<I, S>(&self, name: &str, roles: I) -> AaaResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut identities = self.identities.write().await;
        let stored = identities
            .get_mut(name)
            .ok_or_else(|| AaaError::store(format!("Unknown identity: {}", name)))?;
        stored.identity.roles = roles.into_iter().map(Into::into).collect();
        Ok(())
    }

    pub async fn grant(&self, name: &str, grant: Grant) -> AaaResult<()> {
        let mut identities = self.identities.write().await;
        let stored = identities
            .get_mut(name)
            .ok_or_else(|| AaaError::store(format!("Unknown identity: {}", name)))?;
        stored.identity.grants.insert(grant);
        Ok(())
    }

    /// Returns whether the grant was present
    pub async fn revoke_grant(&self, name: &str, grant: &Grant) -> AaaResult<bool> {
        let mut identities = self.identities.write().await;
        let stored = identities
            .get_mut(name)
            .ok_or_else(|| AaaError::store(format!("Unknown identity: {}", name)))?;
        Ok(stored.identity.grants.remove(grant))
    }

    pub async fn len(&self) -> usize {
        self.identities.read().await.len()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn lookup_identity(&self, name: &str) -> AaaResult<Option<Identity>> {
        let identities = self.identities.read().await;
        Ok(identities.get(name).map(|stored| stored.identity.clone()))
    }

    async fn secret_hash(&self, name: &str) -> AaaResult<Option<String>> {
        let identities = self.identities.read().await;
        Ok(identities.get(name).map(|stored| stored.secret_hash.clone()))
    }

    async fn update_lockout(&self, name: &str, record: &LockoutRecord) -> AaaResult<()> {
        let mut identities = self.identities.write().await;
        match identities.get_mut(name) {
            Some(stored) => {
                stored.identity.lockout = record.clone();
                Ok(())
            }
            None => Err(AaaError::store(format!("Unknown identity: {}", name))),
        }
    }
}
