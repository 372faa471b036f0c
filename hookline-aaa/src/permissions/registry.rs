//! Permission Registry
//!
//! Static mapping from operation name to the permissions and scope required to
//! invoke it, plus the role catalog that turns configured role names into
//! global permissions. Both are built once at start and never mutated.

use crate::{AaaError, AaaResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Specific permissions that can be granted to identities
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// View campaign configuration and status
    ReadCampaign,
    /// Create and edit campaigns
    ModifyCampaign,
    /// Start sending a campaign
    LaunchCampaign,
    /// Remove a campaign and its data
    DeleteCampaign,
    /// Read harvested credentials and visit data
    ReadSubmissions,
    /// Upload and remove message templates
    ManageTemplates,
    /// Change roles and grants of other identities
    ManageIdentities,
    /// Server-wide administration
    ServerAdmin,
}

impl Permission {
    pub const ALL: [Permission; 8] = [
        Permission::ReadCampaign,
        Permission::ModifyCampaign,
        Permission::LaunchCampaign,
        Permission::DeleteCampaign,
        Permission::ReadSubmissions,
        Permission::ManageTemplates,
        Permission::ManageIdentities,
        Permission::ServerAdmin,
    ];
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Permission::ReadCampaign => write!(f, "read_campaign"),
            Permission::ModifyCampaign => write!(f, "modify_campaign"),
            Permission::LaunchCampaign => write!(f, "launch_campaign"),
            Permission::DeleteCampaign => write!(f, "delete_campaign"),
            Permission::ReadSubmissions => write!(f, "read_submissions"),
            Permission::ManageTemplates => write!(f, "manage_templates"),
            Permission::ManageIdentities => write!(f, "manage_identities"),
            Permission::ServerAdmin => write!(f, "server_admin"),
        }
    }
}

impl std::str::FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "read_campaign" => Ok(Permission::ReadCampaign),
            "modify_campaign" => Ok(Permission::ModifyCampaign),
            "launch_campaign" => Ok(Permission::LaunchCampaign),
            "delete_campaign" => Ok(Permission::DeleteCampaign),
            "read_submissions" => Ok(Permission::ReadSubmissions),
            "manage_templates" => Ok(Permission::ManageTemplates),
            "manage_identities" => Ok(Permission::ManageIdentities),
            "server_admin" => Ok(Permission::ServerAdmin),
            _ => Err(format!("Unknown permission: {}", s)),
        }
    }
}

/// How an operation's permissions are evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    /// No session required
    Public,
    /// Permissions must be held globally
    Global,
    /// Permissions must be held globally or for the call's target campaign
    PerCampaign,
}

impl std::fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScopeKind::Public => write!(f, "public"),
            ScopeKind::Global => write!(f, "global"),
            ScopeKind::PerCampaign => write!(f, "per_campaign"),
        }
    }
}

/// Requirements of a single operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRule {
    pub operation: String,
    /// Every permission listed is required; an empty set only requires a session
    pub permissions: BTreeSet<Permission>,
    pub scope: ScopeKind,
}

/// Immutable operation -> rule table
#[derive(Debug, Clone, Default)]
pub struct PermissionRegistry {
    rules: HashMap<String, PermissionRule>,
}

impl PermissionRegistry {
    pub fn builder() -> PermissionRegistryBuilder {
        PermissionRegistryBuilder::default()
    }

    /// Requirements of `operation`; operations without a rule are inaccessible
    pub fn required_permissions(&self, operation: &str) -> AaaResult<&PermissionRule> {
        self.rules
            .get(operation)
            .ok_or_else(|| AaaError::unknown_operation(operation))
    }

    pub fn contains(&self, operation: &str) -> bool {
        self.rules.contains_key(operation)
    }

    pub fn is_public(&self, operation: &str) -> bool {
        self.rules
            .get(operation)
            .is_some_and(|rule| rule.scope == ScopeKind::Public)
    }

    /// Operation names, sorted
    pub fn operations(&self) -> Vec<&str> {
        let mut operations: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        operations.sort_unstable();
        operations
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rule set of the campaign server's operator console
    pub fn campaign_server_defaults() -> Self {
        use Permission::*;

        let builder = Self::builder()
            .public("login")
            .public("version")
            .global("logout", std::iter::empty())
            .global("list_campaigns", [ReadCampaign])
            .global("create_campaign", [ModifyCampaign])
            .per_campaign("get_campaign", [ReadCampaign])
            .per_campaign("modify_campaign", [ReadCampaign, ModifyCampaign])
            .per_campaign("launch_campaign", [LaunchCampaign])
            .per_campaign("delete_campaign", [DeleteCampaign])
            .per_campaign("read_submissions", [ReadSubmissions])
            .global("list_templates", [ManageTemplates])
            .global("upload_template", [ManageTemplates])
            .global("delete_template", [ManageTemplates])
            .global("set_identity_roles", [ManageIdentities])
            .global("revoke_identity_sessions", [ManageIdentities])
            .global("shutdown_server", [ServerAdmin]);

        Self {
            rules: builder
                .rules
                .into_iter()
                .map(|rule| (rule.operation.clone(), rule))
                .collect(),
        }
    }
}

/// Collects rules and rejects conflicting definitions on `build`
#[derive(Debug, Default)]
pub struct PermissionRegistryBuilder {
    rules: Vec<PermissionRule>,
}

impl PermissionRegistryBuilder {
    pub fn rule<I>(mut self, operation: &str, scope: ScopeKind, permissions: I) -> Self
    where
        I: IntoIterator<Item = Permission>,
    {
        self.rules.push(PermissionRule {
            operation: operation.to_string(),
            permissions: permissions.into_iter().collect(),
            scope,
        });
        self
    }

    pub fn public(self, operation: &str) -> Self {
        self.rule(operation, ScopeKind::Public, std::iter::empty())
    }

    pub fn global<I>(self, operation: &str, permissions: I) -> Self
    where
        I: IntoIterator<Item = Permission>,
    {
        self.rule(operation, ScopeKind::Global, permissions)
    }

    pub fn per_campaign<I>(self, operation: &str, permissions: I) -> Self
    where
        I: IntoIterator<Item = Permission>,
    {
        self.rule(operation, ScopeKind::PerCampaign, permissions)
    }

    pub fn build(self) -> AaaResult<PermissionRegistry> {
        let mut rules = HashMap::with_capacity(self.rules.len());
        for rule in self.rules {
            if rule.operation.is_empty() {
                return Err(AaaError::config("Operation names must not be empty"));
            }
            if rule.scope == ScopeKind::Public && !rule.permissions.is_empty() {
                return Err(AaaError::config(format!(
                    "Public operation '{}' cannot require permissions",
                    rule.operation
                )));
            }
            if rules.contains_key(&rule.operation) {
                return Err(AaaError::config(format!(
                    "Operation '{}' is defined more than once",
                    rule.operation
                )));
            }
            rules.insert(rule.operation.clone(), rule);
        }
        Ok(PermissionRegistry { rules })
    }
}

/// Role name -> globally held permissions
#[derive(Debug, Clone, Default)]
pub struct RoleCatalog {
    roles: HashMap<String, BTreeSet<Permission>>,
}

impl RoleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the `[roles]` configuration table, rejecting unknown permission names
    pub fn from_config(roles: &BTreeMap<String, Vec<String>>) -> AaaResult<Self> {
        let mut catalog = Self::new();
        for (role, names) in roles {
            let permissions = names
                .iter()
                .map(|name| {
                    name.parse::<Permission>()
                        .map_err(|e| AaaError::config(format!("Role '{}': {}", role, e)))
                })
                .collect::<AaaResult<BTreeSet<_>>>()?;
            catalog.roles.insert(role.clone(), permissions);
        }
        Ok(catalog)
    }

    pub fn with_role<I>(mut self, role: &str, permissions: I) -> Self
    where
        I: IntoIterator<Item = Permission>,
    {
        self.roles
            .insert(role.to_string(), permissions.into_iter().collect());
        self
    }

    pub fn permissions_for(&self, role: &str) -> Option<&BTreeSet<Permission>> {
        self.roles.get(role)
    }

    /// Whether any of `roles` carries `permission`; unknown roles grant nothing
    pub fn grants<'a, I>(&self, roles: I, permission: Permission) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        roles.into_iter().any(|role| {
            self.roles
                .get(role)
                .is_some_and(|permissions| permissions.contains(&permission))
        })
    }
}
