//! Call Dispatcher - entry point for every inbound operation
//!
//! Each call walks `Received -> SessionResolved -> Authorized|Denied ->
//! Executed|Skipped -> Recorded -> Responded`. Every terminal path produces
//! exactly one decision record and one response; authorized work additionally
//! produces a completion record linked to its decision.

use super::handlers::{HandlerContext, HandlerError, HandlerRegistry, OperationHandler};
use crate::audit::{self, AuditEntry, AuditLogger, CompletionOutcome};
use crate::auth::{CampaignId, CredentialVerifier, Identity, IdentityStore, LockoutTable};
use crate::permissions::{
    AuthorizationDecision, AuthorizationEngine, DenyReason, PermissionRegistry, RoleCatalog,
};
use crate::session::{fingerprint, ConnectionId, SessionContext, SessionManager, SweeperHandle};
use crate::time::{Clock, SystemClock};
use crate::{AaaError, AaaResult};
use chrono::{DateTime, Utc};
use hookline_core::ServerConfig;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Operation handled by the dispatcher itself: verify credentials and open a session
pub const LOGIN_OPERATION: &str = "login";
/// Operation handled by the dispatcher itself: revoke the caller's session
pub const LOGOUT_OPERATION: &str = "logout";

const ALERT_CAPACITY: usize = 64;

/// Steps of a call's lifecycle, emitted as debug events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Received,
    SessionResolved,
    Authorized,
    Denied,
    Executed,
    Skipped,
    Recorded,
    Responded,
}

impl std::fmt::Display for CallPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallPhase::Received => write!(f, "received"),
            CallPhase::SessionResolved => write!(f, "session_resolved"),
            CallPhase::Authorized => write!(f, "authorized"),
            CallPhase::Denied => write!(f, "denied"),
            CallPhase::Executed => write!(f, "executed"),
            CallPhase::Skipped => write!(f, "skipped"),
            CallPhase::Recorded => write!(f, "recorded"),
            CallPhase::Responded => write!(f, "responded"),
        }
    }
}

fn enter(phase: CallPhase) {
    debug!(%phase, "Call phase");
}

/// A decoded call handed over by the transport layer
#[derive(Debug, Clone)]
pub struct InboundCall {
    pub operation: String,
    pub arguments: Value,
    pub token: Option<String>,
    pub target: Option<CampaignId>,
    pub connection_id: ConnectionId,
}

impl InboundCall {
    pub fn new<S: Into<String>>(operation: S, connection_id: ConnectionId) -> Self {
        Self {
            operation: operation.into(),
            arguments: Value::Null,
            token: None,
            target: None,
            connection_id,
        }
    }

    pub fn with_token<S: Into<String>>(mut self, token: S) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_target<C: Into<CampaignId>>(mut self, target: C) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_arguments(mut self, arguments: Value) -> Self {
        self.arguments = arguments;
        self
    }
}

/// Successful result of an executed operation
#[derive(Debug, Clone, Serialize)]
pub struct CallResponse {
    pub call_id: Uuid,
    pub result: Value,
    /// Sequence of the allow decision record
    pub audit_sequence: u64,
    /// Sequence of the completion record, absent if it could not be written
    pub completion_sequence: Option<u64>,
}

/// Structured call failure; authorization failures and execution failures never share a variant
#[derive(Debug, Clone, thiserror::Error, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum CallError {
    #[error("Denied ({reason}): {detail}")]
    Denied {
        reason: DenyReason,
        detail: String,
        audit_sequence: Option<u64>,
    },

    #[error("Audit trail unavailable: {detail}")]
    AuditUnavailable { detail: String },

    #[error("Handler failure: {detail}")]
    HandlerFailure {
        detail: String,
        audit_sequence: u64,
        completion_sequence: Option<u64>,
    },

    /// The dispatcher is closed, or the call's task was torn down before it answered
    #[error("Server unavailable: {detail}")]
    Unavailable { detail: String },
}

impl CallError {
    /// Stable error code for the transport layer
    pub fn code(&self) -> &'static str {
        match self {
            CallError::Denied { reason, .. } => reason.code(),
            CallError::AuditUnavailable { .. } => DenyReason::AuditUnavailable.code(),
            CallError::HandlerFailure { .. } => "handler_failure",
            CallError::Unavailable { .. } => "server_unavailable",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            CallError::Denied { detail, .. }
            | CallError::AuditUnavailable { detail }
            | CallError::HandlerFailure { detail, .. }
            | CallError::Unavailable { detail } => detail,
        }
    }

    pub fn reason(&self) -> Option<DenyReason> {
        match self {
            CallError::Denied { reason, .. } => Some(*reason),
            CallError::AuditUnavailable { .. } => Some(DenyReason::AuditUnavailable),
            CallError::HandlerFailure { .. } | CallError::Unavailable { .. } => None,
        }
    }

    /// True when the call was refused rather than executed
    pub fn is_authorization_failure(&self) -> bool {
        !matches!(self, CallError::HandlerFailure { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// A decision could not be recorded; the call was denied
    AuditUnavailable,
    /// Authorized work ran but its completion record could not be written
    CompletionRecordLost,
}

/// Condition raised for operational alerting
#[derive(Debug, Clone, Serialize)]
pub struct OperationalAlert {
    pub kind: AlertKind,
    pub call_id: Uuid,
    pub operation: String,
    pub detail: String,
    pub raised_at: DateTime<Utc>,
}

/// Why authorized work did not produce a result
#[derive(Debug)]
enum ExecutionFailure {
    /// The operation ran and failed
    Failed(HandlerError),
    /// Refused at execution time for an authorization reason, e.g. a lockout
    /// that landed after the credentials were verified
    Refused { reason: DenyReason, detail: String },
}

impl ExecutionFailure {
    fn completion(&self) -> CompletionOutcome {
        let detail = match self {
            ExecutionFailure::Failed(e) => e.message.clone(),
            ExecutionFailure::Refused { reason, detail } => format!("{}: {}", reason.code(), detail),
        };
        CompletionOutcome::AllowButFailed { detail }
    }

    fn into_call_error(self, audit_sequence: u64, completion_sequence: Option<u64>) -> CallError {
        match self {
            ExecutionFailure::Failed(e) => CallError::HandlerFailure {
                detail: e.message,
                audit_sequence,
                completion_sequence,
            },
            ExecutionFailure::Refused { reason, detail } => CallError::Denied {
                reason,
                detail,
                audit_sequence: Some(audit_sequence),
            },
        }
    }
}

/// Work performed once a call is authorized
enum Execution {
    Handler {
        handler: Arc<dyn OperationHandler>,
        context: HandlerContext,
        arguments: Value,
    },
    OpenSession {
        identity: Identity,
        connection_id: ConnectionId,
    },
    CloseSession {
        token: String,
    },
}

impl Execution {
    async fn run(self, sessions: Arc<SessionManager>) -> Result<Value, ExecutionFailure> {
        match self {
            Execution::Handler {
                handler,
                context,
                arguments,
            } => handler
                .handle(context, arguments)
                .await
                .map_err(ExecutionFailure::Failed),
            Execution::OpenSession {
                identity,
                connection_id,
            } => sessions
                .create_session(&identity, connection_id)
                .map(|session| {
                    json!({
                        "token": session.token.as_str(),
                        "identity": session.identity,
                        "expires_at": session.expires_at,
                    })
                })
                .map_err(|e| match e.deny_reason() {
                    Some(reason) => ExecutionFailure::Refused {
                        reason,
                        detail: e.to_string(),
                    },
                    None => ExecutionFailure::Failed(HandlerError::new(e.to_string())),
                }),
            Execution::CloseSession { token } => {
                let revoked = sessions.revoke(&token);
                Ok(json!({ "revoked": revoked }))
            }
        }
    }
}

/// Components a dispatcher is assembled from
pub struct DispatcherParts {
    pub sessions: Arc<SessionManager>,
    pub verifier: Arc<CredentialVerifier>,
    pub store: Arc<dyn IdentityStore>,
    pub engine: AuthorizationEngine,
    pub handlers: HandlerRegistry,
    pub audit: Arc<AuditLogger>,
    /// Calls processed at once; further calls wait for a slot
    pub max_concurrent_calls: usize,
}

struct DispatcherInner {
    sessions: Arc<SessionManager>,
    verifier: Arc<CredentialVerifier>,
    store: Arc<dyn IdentityStore>,
    engine: AuthorizationEngine,
    handlers: HandlerRegistry,
    audit: Arc<AuditLogger>,
    alerts: broadcast::Sender<OperationalAlert>,
    throttle: Arc<Semaphore>,
    /// Session sweep owned by a dispatcher built from configuration
    sweeper: std::sync::Mutex<Option<SweeperHandle>>,
}

/// Cheaply cloneable handle; every clone drives the same components
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    /// Assemble a dispatcher, rejecting handlers the permission registry does not know
    pub fn new(parts: DispatcherParts) -> AaaResult<Self> {
        let registry = parts.engine.registry();
        for operation in parts.handlers.operations() {
            if operation == LOGIN_OPERATION || operation == LOGOUT_OPERATION {
                return Err(AaaError::config(format!(
                    "Operation '{}' is handled by the dispatcher and cannot be registered",
                    operation
                )));
            }
            if !registry.contains(operation) {
                return Err(AaaError::config(format!(
                    "Handler registered for '{}' which has no permission rule",
                    operation
                )));
            }
        }

        let unhandled: Vec<&str> = registry
            .operations()
            .into_iter()
            .filter(|op| {
                *op != LOGIN_OPERATION && *op != LOGOUT_OPERATION && !parts.handlers.contains(op)
            })
            .collect();
        if !unhandled.is_empty() {
            info!(?unhandled, "Operations without handlers will be denied");
        }

        if parts.max_concurrent_calls == 0 {
            return Err(AaaError::config("max_concurrent_calls must be greater than 0"));
        }

        let (alerts, _) = broadcast::channel(ALERT_CAPACITY);

        Ok(Self {
            inner: Arc::new(DispatcherInner {
                sessions: parts.sessions,
                verifier: parts.verifier,
                store: parts.store,
                engine: parts.engine,
                handlers: parts.handlers,
                audit: parts.audit,
                alerts,
                throttle: Arc::new(Semaphore::new(parts.max_concurrent_calls)),
                sweeper: std::sync::Mutex::new(None),
            }),
        })
    }

    /// Build every component from configuration with the default campaign rules
    ///
    /// The dispatcher owns a session sweep running every
    /// `session.sweep_interval_secs` until its last clone is dropped.
    pub async fn from_config(
        config: &ServerConfig,
        store: Arc<dyn IdentityStore>,
        handlers: HandlerRegistry,
    ) -> AaaResult<Self> {
        config.validate()?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let lockouts = Arc::new(LockoutTable::new(&config.lockout));
        let sessions = Arc::new(SessionManager::new(
            &config.session,
            Arc::clone(&lockouts),
            Arc::clone(&clock),
        ));
        let sweeper = sessions.spawn_sweeper(config.session.sweep_interval());
        let verifier = Arc::new(CredentialVerifier::new(
            Arc::clone(&store),
            lockouts,
            &config.credentials,
            Arc::clone(&clock),
        )?);
        let engine = AuthorizationEngine::new(
            Arc::new(PermissionRegistry::campaign_server_defaults()),
            Arc::new(RoleCatalog::from_config(&config.roles)?),
            Arc::clone(&clock),
        );
        let sink = audit::open_sink(&config.audit).await?;
        let audit = Arc::new(AuditLogger::start(sink, &config.audit, clock).await?);

        let dispatcher = Self::new(DispatcherParts {
            sessions,
            verifier,
            store,
            engine,
            handlers,
            audit,
            max_concurrent_calls: config.server.max_concurrent_calls,
        })?;
        *dispatcher.lock_sweeper() = Some(sweeper);
        Ok(dispatcher)
    }

    /// Run one inbound call through authorization, execution and recording
    pub async fn dispatch(&self, call: InboundCall) -> Result<CallResponse, CallError> {
        let call_id = Uuid::new_v4();
        let span = info_span!("call", %call_id, operation = %call.operation);
        async {
            let permit = self.inner.admit().await?;
            self.inner.process(call_id, call, permit).await
        }
        .instrument(span)
        .await
    }

    /// Verify credentials and open a session bound to `connection_id`
    pub async fn login(
        &self,
        name: &str,
        secret: &str,
        connection_id: ConnectionId,
    ) -> Result<CallResponse, CallError> {
        let call_id = Uuid::new_v4();
        let span = info_span!("call", %call_id, operation = LOGIN_OPERATION);
        async {
            let permit = self.inner.admit().await?;
            enter(CallPhase::Received);
            self.inner
                .process_login(call_id, Some(name), Some(secret), connection_id, permit)
                .await
        }
        .instrument(span)
        .await
    }

    /// Revoke the session behind `token`
    pub async fn logout(
        &self,
        token: &str,
        connection_id: ConnectionId,
    ) -> Result<CallResponse, CallError> {
        self.dispatch(InboundCall::new(LOGOUT_OPERATION, connection_id).with_token(token))
            .await
    }

    /// Receive `AuditUnavailable` and lost-completion alerts
    pub fn subscribe_alerts(&self) -> broadcast::Receiver<OperationalAlert> {
        self.inner.alerts.subscribe()
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.inner.sessions
    }

    pub fn audit(&self) -> &Arc<AuditLogger> {
        &self.inner.audit
    }

    pub fn registry(&self) -> &Arc<PermissionRegistry> {
        self.inner.engine.registry()
    }

    /// Start a background session sweep owned by the caller
    pub fn spawn_sweeper(&self, interval: Duration) -> SweeperHandle {
        self.inner.sessions.spawn_sweeper(interval)
    }

    /// Interval of the sweep this dispatcher owns, if it was built from configuration
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.lock_sweeper().as_ref().map(SweeperHandle::interval)
    }

    /// Calls that could start right now without waiting
    pub fn available_call_slots(&self) -> usize {
        self.inner.throttle.available_permits()
    }

    /// Refuse new calls and stop the owned sweep; calls already admitted run to completion
    pub fn close(&self) {
        self.inner.throttle.close();
        // Dropping the handle signals the sweep loop to stop
        drop(self.lock_sweeper().take());
        info!("Dispatcher closed to new calls");
    }

    fn lock_sweeper(&self) -> std::sync::MutexGuard<'_, Option<SweeperHandle>> {
        self.inner
            .sweeper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

impl DispatcherInner {
    /// Wait for a call slot; the permit is held until the call's records are written
    async fn admit(&self) -> Result<OwnedSemaphorePermit, CallError> {
        if self.throttle.available_permits() == 0 {
            debug!("All call slots busy; waiting");
        }
        Arc::clone(&self.throttle)
            .acquire_owned()
            .await
            .map_err(|_| CallError::Unavailable {
                detail: "dispatcher is closed".to_string(),
            })
    }

    async fn process(
        self: &Arc<Self>,
        call_id: Uuid,
        call: InboundCall,
        permit: OwnedSemaphorePermit,
    ) -> Result<CallResponse, CallError> {
        enter(CallPhase::Received);

        let InboundCall {
            operation,
            arguments,
            token,
            target,
            connection_id,
        } = call;

        if operation == LOGIN_OPERATION {
            let name = arguments.get("name").and_then(Value::as_str);
            let secret = arguments.get("secret").and_then(Value::as_str);
            return self
                .process_login(call_id, name, secret, connection_id, permit)
                .await;
        }

        let (decision, session) = if self.engine.registry().is_public(&operation) {
            (
                self.engine.authorize_public(&operation, target.as_ref()),
                None,
            )
        } else {
            match self.resolve_session(token.as_deref(), &connection_id).await {
                Ok(context) => {
                    enter(CallPhase::SessionResolved);
                    let decision = self
                        .engine
                        .authorize(Some(&context), &operation, target.as_ref());
                    (decision, Some(context))
                }
                Err((reason, detail)) => {
                    let decision = AuthorizationDecision::deny(
                        &operation,
                        target.as_ref(),
                        self.engine.now(),
                        reason,
                        detail,
                    )
                    .with_session_fingerprint(token.as_deref().map(fingerprint));
                    (decision, None)
                }
            }
        };

        let (decision, execution) = if decision.is_allowed() {
            let execution = if operation == LOGOUT_OPERATION {
                token.map(|token| Execution::CloseSession { token })
            } else {
                self.handlers
                    .get(&operation)
                    .map(|handler| Execution::Handler {
                        handler,
                        context: HandlerContext {
                            call_id,
                            operation: operation.clone(),
                            identity: session.map(|context| context.identity),
                            target: target.clone(),
                        },
                        arguments,
                    })
            };
            match execution {
                Some(execution) => (decision, Some(execution)),
                None => {
                    let detail = format!("no handler registered for '{}'", operation);
                    (
                        decision.into_denied(DenyReason::UnknownOperation, detail),
                        None,
                    )
                }
            }
        } else {
            (decision, None)
        };

        self.finish(call_id, &operation, decision, execution, permit)
            .await
    }

    async fn process_login(
        self: &Arc<Self>,
        call_id: Uuid,
        name: Option<&str>,
        secret: Option<&str>,
        connection_id: ConnectionId,
        permit: OwnedSemaphorePermit,
    ) -> Result<CallResponse, CallError> {
        let now = self.engine.now();

        let (Some(name), Some(secret)) = (name, secret) else {
            let decision = AuthorizationDecision::deny(
                LOGIN_OPERATION,
                None,
                now,
                DenyReason::InvalidCredentials,
                "login requires a name and a secret",
            );
            return self
                .finish(call_id, LOGIN_OPERATION, decision, None, permit)
                .await;
        };

        let (decision, execution) = match self.verifier.verify(name, secret).await {
            Ok(identity) => (
                AuthorizationDecision::allow(LOGIN_OPERATION, None, now).for_identity(name),
                Some(Execution::OpenSession {
                    identity,
                    connection_id,
                }),
            ),
            Err(e) => {
                let reason = e.deny_reason().unwrap_or(DenyReason::StoreUnavailable);
                (
                    AuthorizationDecision::deny(LOGIN_OPERATION, None, now, reason, e.to_string())
                        .for_identity(name),
                    None,
                )
            }
        };

        self.finish(call_id, LOGIN_OPERATION, decision, execution, permit)
            .await
    }

    async fn resolve_session(
        &self,
        token: Option<&str>,
        connection_id: &ConnectionId,
    ) -> Result<SessionContext, (DenyReason, String)> {
        let Some(token) = token else {
            return Err((DenyReason::NoSession, "no session token presented".to_string()));
        };

        let session = self
            .sessions
            .validate_for(token, connection_id)
            .map_err(|e| match e {
                AaaError::SessionExpired => {
                    (DenyReason::SessionExpired, "session expired".to_string())
                }
                _ => (DenyReason::NoSession, "unknown session".to_string()),
            })?;

        match self.store.lookup_identity(&session.identity).await {
            Ok(Some(identity)) => Ok(SessionContext::new(session, identity)),
            Ok(None) => {
                self.sessions.revoke(token);
                Err((
                    DenyReason::NoSession,
                    "session identity no longer exists".to_string(),
                ))
            }
            Err(e) => Err((
                DenyReason::StoreUnavailable,
                format!("identity lookup failed: {}", e),
            )),
        }
    }

    /// Record the decision, run authorized work and record its completion
    async fn finish(
        self: &Arc<Self>,
        call_id: Uuid,
        operation: &str,
        decision: AuthorizationDecision,
        execution: Option<Execution>,
        permit: OwnedSemaphorePermit,
    ) -> Result<CallResponse, CallError> {
        let Some(execution) = execution else {
            enter(CallPhase::Denied);
            enter(CallPhase::Skipped);

            let reason = decision.reason.unwrap_or(DenyReason::PermissionDenied);
            let detail = decision.detail.clone().unwrap_or_default();
            let audit_sequence = match self.audit.record(AuditEntry::decision(call_id, decision)).await {
                Ok(sequence) => {
                    enter(CallPhase::Recorded);
                    Some(sequence)
                }
                Err(e) => {
                    error!(error = %e, "Deny decision could not be recorded");
                    self.raise_alert(AlertKind::AuditUnavailable, call_id, operation, e.to_string());
                    None
                }
            };
            drop(permit);

            info!(%reason, %detail, "Call denied");
            enter(CallPhase::Responded);
            return Err(CallError::Denied {
                reason,
                detail,
                audit_sequence,
            });
        };

        enter(CallPhase::Authorized);

        // Detached from here on: a dropped caller can neither strand the allow
        // decision nor skip the completion record
        let inner = Arc::clone(self);
        let operation = operation.to_string();
        let task = tokio::spawn(
            async move {
                let response = inner
                    .record_and_execute(call_id, operation, decision, execution)
                    .await;
                drop(permit);
                response
            }
            .in_current_span(),
        );

        let response = match task.await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Call task ended without a response");
                Err(CallError::Unavailable {
                    detail: format!("call task failed: {}", e),
                })
            }
        };
        enter(CallPhase::Responded);
        response
    }

    async fn record_and_execute(
        self: Arc<Self>,
        call_id: Uuid,
        operation: String,
        decision: AuthorizationDecision,
        execution: Execution,
    ) -> Result<CallResponse, CallError> {
        let decision_sequence = match self.audit.record(AuditEntry::decision(call_id, decision)).await {
            Ok(sequence) => sequence,
            Err(e) => {
                error!(error = %e, "Allow decision could not be recorded; call denied");
                self.raise_alert(AlertKind::AuditUnavailable, call_id, &operation, e.to_string());
                enter(CallPhase::Skipped);
                return Err(CallError::AuditUnavailable {
                    detail: e.to_string(),
                });
            }
        };

        self.execute_and_record(call_id, operation, decision_sequence, execution)
            .await
    }

    async fn execute_and_record(
        self: Arc<Self>,
        call_id: Uuid,
        operation: String,
        decision_sequence: u64,
        execution: Execution,
    ) -> Result<CallResponse, CallError> {
        // A panicking handler still ends in a completion record
        let sessions = Arc::clone(&self.sessions);
        let outcome = match tokio::spawn(execution.run(sessions).in_current_span()).await {
            Ok(outcome) => outcome,
            Err(e) => Err(ExecutionFailure::Failed(HandlerError::new(format!(
                "handler aborted: {}",
                e
            )))),
        };
        enter(CallPhase::Executed);

        let completion = match &outcome {
            Ok(_) => CompletionOutcome::Succeeded,
            Err(failure) => failure.completion(),
        };

        let completion_sequence = match self
            .audit
            .record(AuditEntry::completion(call_id, decision_sequence, completion))
            .await
        {
            Ok(sequence) => {
                enter(CallPhase::Recorded);
                Some(sequence)
            }
            Err(e) => {
                error!(
                    error = %e,
                    decision_sequence,
                    "Completion record lost for authorized call"
                );
                self.raise_alert(
                    AlertKind::CompletionRecordLost,
                    call_id,
                    &operation,
                    e.to_string(),
                );
                None
            }
        };

        match outcome {
            Ok(result) => {
                info!(decision_sequence, "Call executed");
                Ok(CallResponse {
                    call_id,
                    result,
                    audit_sequence: decision_sequence,
                    completion_sequence,
                })
            }
            Err(failure) => {
                warn!(?failure, decision_sequence, "Authorized operation did not complete");
                Err(failure.into_call_error(decision_sequence, completion_sequence))
            }
        }
    }

    fn raise_alert(&self, kind: AlertKind, call_id: Uuid, operation: &str, detail: String) {
        let alert = OperationalAlert {
            kind,
            call_id,
            operation: operation.to_string(),
            detail,
            raised_at: self.engine.now(),
        };
        // Nobody listening is not an error
        let _ = self.alerts.send(alert);
    }
}
