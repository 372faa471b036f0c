//! Shared fixture: a dispatcher over in-memory stores and a manual clock

#![allow(dead_code)]

use hookline_aaa::dispatch::DispatcherParts;
use hookline_aaa::{
    AuditLogger, AuthorizationEngine, CallResponse, ConnectionId, CredentialVerifier, Dispatcher,
    Grant, HandlerRegistry, Identity, LockoutTable, ManualClock, MemoryAuditSink,
    MemoryIdentityStore, Permission, PermissionRegistry, RoleCatalog, SecretHasher,
    SessionManager,
};
use hookline_core::{AuditSettings, CredentialSettings, LockoutSettings, SessionSettings};
use std::sync::Arc;

pub const OP1_SECRET: &str = "op1-correct-secret";
pub const OP2_SECRET: &str = "op2-correct-secret";
pub const ADMIN_SECRET: &str = "admin-correct-secret";

pub struct Harness {
    pub dispatcher: Dispatcher,
    pub clock: Arc<ManualClock>,
    pub sink: Arc<MemoryAuditSink>,
    pub store: Arc<MemoryIdentityStore>,
    pub lockouts: Arc<LockoutTable>,
}

impl Harness {
    pub async fn login(&self, name: &str, secret: &str, connection: &str) -> String {
        let response: CallResponse = self
            .dispatcher
            .login(name, secret, ConnectionId::new(connection))
            .await
            .unwrap();
        response.result["token"].as_str().unwrap().to_string()
    }
}

pub fn fast_credentials() -> CredentialSettings {
    CredentialSettings {
        required_role: None,
        argon2_memory_kib: 1024,
        argon2_iterations: 1,
        argon2_parallelism: 1,
    }
}

pub fn lockout_settings() -> LockoutSettings {
    LockoutSettings {
        threshold: 5,
        window_secs: 15 * 60,
        duration_secs: 15 * 60,
    }
}

pub fn session_settings() -> SessionSettings {
    SessionSettings {
        idle_timeout_secs: 30 * 60,
        renewal_threshold_secs: 10 * 60,
        max_lifetime_secs: 12 * 60 * 60,
        sweep_interval_secs: 60,
        bind_to_connection: true,
    }
}

/// op1: launch on C1 only; op2: no permissions; admin: every permission globally
pub async fn seeded_store(hasher: &SecretHasher) -> Arc<MemoryIdentityStore> {
    let store = Arc::new(MemoryIdentityStore::new());
    store
        .add_identity(
            Identity::new("op1").with_grant(Grant::campaign(Permission::LaunchCampaign, "C1")),
            hasher.hash(OP1_SECRET).unwrap(),
        )
        .await;
    store
        .add_identity(Identity::new("op2"), hasher.hash(OP2_SECRET).unwrap())
        .await;
    store
        .add_identity(
            Identity::new("admin").with_role("admin"),
            hasher.hash(ADMIN_SECRET).unwrap(),
        )
        .await;
    store
}

pub async fn harness(handlers: HandlerRegistry) -> Harness {
    harness_with(handlers, fast_credentials()).await
}

pub async fn harness_with(handlers: HandlerRegistry, credentials: CredentialSettings) -> Harness {
    build_harness(handlers, credentials, 64).await
}

/// Dispatcher that runs at most `max_concurrent_calls` calls at once
pub async fn harness_limited(handlers: HandlerRegistry, max_concurrent_calls: usize) -> Harness {
    build_harness(handlers, fast_credentials(), max_concurrent_calls).await
}

async fn build_harness(
    handlers: HandlerRegistry,
    credentials: CredentialSettings,
    max_concurrent_calls: usize,
) -> Harness {
    let clock = Arc::new(ManualClock::starting_now());
    let hasher = SecretHasher::new(&credentials).unwrap();
    let store = seeded_store(&hasher).await;
    let lockouts = Arc::new(LockoutTable::new(&lockout_settings()));

    let sessions = Arc::new(SessionManager::new(
        &session_settings(),
        Arc::clone(&lockouts),
        clock.clone(),
    ));
    let verifier = Arc::new(
        CredentialVerifier::new(store.clone(), Arc::clone(&lockouts), &credentials, clock.clone())
            .unwrap(),
    );
    let engine = AuthorizationEngine::new(
        Arc::new(PermissionRegistry::campaign_server_defaults()),
        Arc::new(RoleCatalog::new().with_role("admin", Permission::ALL)),
        clock.clone(),
    );

    let sink = Arc::new(MemoryAuditSink::new());
    let audit_settings = AuditSettings {
        append_timeout_ms: 500,
        queue_capacity: 64,
        ..AuditSettings::default()
    };
    let audit = Arc::new(
        AuditLogger::start(sink.clone(), &audit_settings, clock.clone())
            .await
            .unwrap(),
    );

    let dispatcher = Dispatcher::new(DispatcherParts {
        sessions,
        verifier,
        store: store.clone(),
        engine,
        handlers,
        audit,
        max_concurrent_calls,
    })
    .unwrap();

    Harness {
        dispatcher,
        clock,
        sink,
        store,
        lockouts,
    }
}
