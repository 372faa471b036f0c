//! Authorization Engine
//!
//! Pure decision function over the immutable registry and role catalog.
//! Deny takes precedence: a call is allowed only when every required
//! permission is held for the requested scope.

use super::registry::{Permission, PermissionRegistry, PermissionRule, RoleCatalog, ScopeKind};
use crate::auth::{CampaignId, Identity};
use crate::session::SessionContext;
use crate::time::Clock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Why a call was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    InvalidCredentials,
    IdentityLocked,
    NoSession,
    SessionExpired,
    UnknownOperation,
    PermissionDenied,
    AuditUnavailable,
    /// The identity store could not be consulted
    StoreUnavailable,
}

impl DenyReason {
    /// Stable code used in audit records and responses
    pub fn code(&self) -> &'static str {
        match self {
            DenyReason::InvalidCredentials => "invalid_credentials",
            DenyReason::IdentityLocked => "identity_locked",
            DenyReason::NoSession => "no_session",
            DenyReason::SessionExpired => "session_expired",
            DenyReason::UnknownOperation => "unknown_operation",
            DenyReason::PermissionDenied => "permission_denied",
            DenyReason::AuditUnavailable => "audit_unavailable",
            DenyReason::StoreUnavailable => "store_unavailable",
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    Allow,
    Deny,
}

/// Result of evaluating one call; immutable once produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationDecision {
    pub decision_id: Uuid,
    /// Identity the decision was made for, when one was established
    pub identity: Option<String>,
    /// Fingerprint of the presented session token, never the token itself
    pub session_fingerprint: Option<String>,
    pub operation: String,
    pub target: Option<CampaignId>,
    pub timestamp: DateTime<Utc>,
    pub outcome: DecisionOutcome,
    pub reason: Option<DenyReason>,
    pub detail: Option<String>,
}

impl AuthorizationDecision {
    pub fn allow(operation: &str, target: Option<&CampaignId>, timestamp: DateTime<Utc>) -> Self {
        Self {
            decision_id: Uuid::new_v4(),
            identity: None,
            session_fingerprint: None,
            operation: operation.to_string(),
            target: target.cloned(),
            timestamp,
            outcome: DecisionOutcome::Allow,
            reason: None,
            detail: None,
        }
    }

    pub fn deny<S: Into<String>>(
        operation: &str,
        target: Option<&CampaignId>,
        timestamp: DateTime<Utc>,
        reason: DenyReason,
        detail: S,
    ) -> Self {
        Self {
            decision_id: Uuid::new_v4(),
            identity: None,
            session_fingerprint: None,
            operation: operation.to_string(),
            target: target.cloned(),
            timestamp,
            outcome: DecisionOutcome::Deny,
            reason: Some(reason),
            detail: Some(detail.into()),
        }
    }

    pub fn for_identity<S: Into<String>>(mut self, identity: S) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn with_session_fingerprint(mut self, fingerprint: Option<String>) -> Self {
        self.session_fingerprint = fingerprint;
        self
    }

    pub fn is_allowed(&self) -> bool {
        self.outcome == DecisionOutcome::Allow
    }

    /// Turn an allow into a deny, keeping identity and session attribution
    pub fn into_denied<S: Into<String>>(self, reason: DenyReason, detail: S) -> Self {
        Self {
            decision_id: Uuid::new_v4(),
            outcome: DecisionOutcome::Deny,
            reason: Some(reason),
            detail: Some(detail.into()),
            ..self
        }
    }
}

/// Stateless authorization over the permission registry
#[derive(Debug, Clone)]
pub struct AuthorizationEngine {
    registry: Arc<PermissionRegistry>,
    roles: Arc<RoleCatalog>,
    clock: Arc<dyn Clock>,
}

impl AuthorizationEngine {
    pub fn new(
        registry: Arc<PermissionRegistry>,
        roles: Arc<RoleCatalog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            roles,
            clock,
        }
    }

    pub fn registry(&self) -> &Arc<PermissionRegistry> {
        &self.registry
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Decide whether the session may invoke `operation` against `target`
    ///
    /// A missing session is denied with `NoSession` before the registry is consulted.
    pub fn authorize(
        &self,
        session: Option<&SessionContext>,
        operation: &str,
        target: Option<&CampaignId>,
    ) -> AuthorizationDecision {
        let now = self.clock.now();

        let Some(context) = session else {
            return AuthorizationDecision::deny(
                operation,
                target,
                now,
                DenyReason::NoSession,
                "no valid session",
            );
        };

        let decision = match self.registry.required_permissions(operation) {
            Err(_) => AuthorizationDecision::deny(
                operation,
                target,
                now,
                DenyReason::UnknownOperation,
                format!("operation '{}' is not registered", operation),
            ),
            Ok(rule) => match self.missing_permission(&context.identity, rule, target) {
                None => AuthorizationDecision::allow(operation, target, now),
                Some(detail) => AuthorizationDecision::deny(
                    operation,
                    target,
                    now,
                    DenyReason::PermissionDenied,
                    detail,
                ),
            },
        };

        let decision = decision
            .for_identity(context.identity_name())
            .with_session_fingerprint(Some(context.token_fingerprint()));

        debug!(
            identity = context.identity_name(),
            operation,
            outcome = ?decision.outcome,
            reason = ?decision.reason,
            "Authorization decided"
        );
        decision
    }

    /// Decide a call made without a session; only public operations are allowed
    pub fn authorize_public(
        &self,
        operation: &str,
        target: Option<&CampaignId>,
    ) -> AuthorizationDecision {
        let now = self.clock.now();
        match self.registry.required_permissions(operation) {
            Ok(rule) if rule.scope == ScopeKind::Public => {
                AuthorizationDecision::allow(operation, target, now)
            }
            Ok(_) => AuthorizationDecision::deny(
                operation,
                target,
                now,
                DenyReason::NoSession,
                "operation requires a session",
            ),
            Err(_) => AuthorizationDecision::deny(
                operation,
                target,
                now,
                DenyReason::UnknownOperation,
                format!("operation '{}' is not registered", operation),
            ),
        }
    }

    /// First unmet requirement of `rule`, described for the caller
    fn missing_permission(
        &self,
        identity: &Identity,
        rule: &PermissionRule,
        target: Option<&CampaignId>,
    ) -> Option<String> {
        match rule.scope {
            ScopeKind::Public => None,
            ScopeKind::Global => rule
                .permissions
                .iter()
                .find(|permission| !self.holds_globally(identity, **permission))
                .map(|permission| format!("missing global permission {}", permission)),
            ScopeKind::PerCampaign => {
                let Some(target) = target else {
                    return Some(format!(
                        "operation '{}' requires a target campaign",
                        rule.operation
                    ));
                };
                rule.permissions
                    .iter()
                    .find(|permission| !self.holds_for(identity, **permission, target))
                    .map(|permission| {
                        format!("missing permission {} for campaign {}", permission, target)
                    })
            }
        }
    }

    fn holds_globally(&self, identity: &Identity, permission: Permission) -> bool {
        self.roles.grants(&identity.roles, permission)
            || identity
                .grants
                .iter()
                .any(|grant| grant.permission == permission && grant.is_global())
    }

    fn holds_for(&self, identity: &Identity, permission: Permission, target: &CampaignId) -> bool {
        self.holds_globally(identity, permission)
            || identity
                .grants
                .iter()
                .any(|grant| grant.permission == permission && grant.covers(Some(target)))
    }
}
