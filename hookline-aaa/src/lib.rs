//! Hookline AAA - authentication, authorization and accounting core
//!
//! Every remote operation issued by an operator console passes through this
//! crate before any campaign business logic runs:
//!
//! - **Authentication**: credential verification with failed-attempt lockout,
//!   session tokens bound to a connection
//! - **Authorization**: a static permission registry and a stateless engine
//!   evaluating global and campaign-scoped grants
//! - **Accounting**: a single-writer, strictly ordered audit trail
//!
//! ## Architecture
//!
//! The [`dispatch::Dispatcher`] is the entry point. It resolves the session,
//! asks the [`permissions::AuthorizationEngine`] for a decision, records the
//! decision through the [`audit::AuditLogger`] and only then invokes the
//! registered [`dispatch::OperationHandler`].

pub mod audit;
pub mod auth;
pub mod dispatch;
pub mod permissions;
pub mod session;
pub mod time;

pub use audit::{
    AuditLogger, AuditRecord, AuditRecordBody, AuditSink, CompletionOutcome, JsonlAuditSink,
    MemoryAuditSink,
};
#[cfg(feature = "sqlite")]
pub use audit::SqliteAuditSink;
pub use auth::{
    CampaignId, CredentialVerifier, Grant, GrantScope, Identity, IdentityStore, LockoutRecord,
    LockoutTable, MemoryIdentityStore, SecretHasher,
};
pub use dispatch::{
    handler_fn, AlertKind, CallError, CallResponse, Dispatcher, DispatcherParts, HandlerContext,
    HandlerError, HandlerRegistry, InboundCall, OperationHandler, OperationalAlert,
};
pub use permissions::{
    AuthorizationDecision, AuthorizationEngine, DecisionOutcome, DenyReason, Permission,
    PermissionRegistry, PermissionRule, RoleCatalog, ScopeKind,
};
pub use session::{ConnectionId, Session, SessionContext, SessionManager, SessionToken};
pub use time::{Clock, ManualClock, SystemClock};

use chrono::{DateTime, Utc};
use hookline_core::CoreError;

/// AAA error taxonomy
///
/// Authentication and authorization outcomes are distinct variants so callers
/// can always tell a denial from an operational failure.
#[derive(Debug, thiserror::Error)]
pub enum AaaError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Identity locked until {until}")]
    IdentityLocked { until: DateTime<Utc> },

    #[error("No session")]
    NoSession,

    #[error("Session expired")]
    SessionExpired,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Unknown operation: {operation}")]
    UnknownOperation { operation: String },

    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("Audit trail unavailable: {message}")]
    AuditUnavailable { message: String },

    #[error("Handler failure: {message}")]
    HandlerFailure { message: String },

    #[error("Identity store error: {message}")]
    Store { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

pub type AaaResult<T> = Result<T, AaaError>;

impl AaaError {
    /// Create an unknown operation error
    pub fn unknown_operation<S: Into<String>>(operation: S) -> Self {
        Self::UnknownOperation {
            operation: operation.into(),
        }
    }

    /// Create a permission denied error
    pub fn permission_denied<S: Into<String>>(message: S) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    /// Create an audit unavailable error
    pub fn audit_unavailable<S: Into<String>>(message: S) -> Self {
        Self::AuditUnavailable {
            message: message.into(),
        }
    }

    /// Create an identity store error
    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// The denial reason this error maps to, if it is an authorization-layer outcome
    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            AaaError::InvalidCredentials => Some(DenyReason::InvalidCredentials),
            AaaError::IdentityLocked { .. } => Some(DenyReason::IdentityLocked),
            AaaError::NoSession | AaaError::SessionNotFound => Some(DenyReason::NoSession),
            AaaError::SessionExpired => Some(DenyReason::SessionExpired),
            AaaError::UnknownOperation { .. } => Some(DenyReason::UnknownOperation),
            AaaError::PermissionDenied { .. } => Some(DenyReason::PermissionDenied),
            AaaError::AuditUnavailable { .. } => Some(DenyReason::AuditUnavailable),
            _ => None,
        }
    }
}
