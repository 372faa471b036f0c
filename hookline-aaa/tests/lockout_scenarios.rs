//! Failed-login lockout observed through the dispatcher

mod common;

use chrono::Duration;
use common::{harness, harness_with, fast_credentials, OP1_SECRET, OP2_SECRET};
use hookline_aaa::{CallError, ConnectionId, DenyReason, HandlerRegistry, IdentityStore};

fn conn() -> ConnectionId {
    ConnectionId::new("conn-op2")
}

#[tokio::test]
async fn test_lockout_after_threshold() {
    let h = harness(HandlerRegistry::default()).await;

    for attempt in 1..=5 {
        let err = h
            .dispatcher
            .login("op2", "wrong-secret", conn())
            .await
            .unwrap_err();
        assert_eq!(
            err.reason(),
            Some(DenyReason::InvalidCredentials),
            "attempt {}",
            attempt
        );
    }

    // The correct secret no longer helps
    let err = h
        .dispatcher
        .login("op2", OP2_SECRET, conn())
        .await
        .unwrap_err();
    assert_eq!(err.reason(), Some(DenyReason::IdentityLocked));

    let stored = h.store.lookup_identity("op2").await.unwrap().unwrap();
    assert_eq!(stored.lockout.failed_attempts, 5);
    assert!(stored.lockout.locked_until.is_some());

    // Other identities are unaffected
    h.dispatcher
        .login("op1", OP1_SECRET, ConnectionId::new("conn-op1"))
        .await
        .unwrap();

    h.clock.advance(Duration::minutes(15) + Duration::seconds(1));
    let response = h.dispatcher.login("op2", OP2_SECRET, conn()).await.unwrap();
    assert_eq!(response.result["identity"], "op2");

    assert!(h.lockouts.get("op2").is_none());
    let stored = h.store.lookup_identity("op2").await.unwrap().unwrap();
    assert!(stored.lockout.is_clear());

    // Every attempt left exactly one decision plus a completion for each success
    let records = h.sink.records().await;
    let denials = records.iter().filter(|r| r.outcome_label() == "deny").count();
    assert_eq!(denials, 6);
}

#[tokio::test]
async fn test_failures_outside_window_do_not_accumulate() {
    let h = harness(HandlerRegistry::default()).await;

    for _ in 0..4 {
        h.dispatcher
            .login("op2", "wrong-secret", conn())
            .await
            .unwrap_err();
    }

    h.clock.advance(Duration::minutes(16));

    for _ in 0..4 {
        h.dispatcher
            .login("op2", "wrong-secret", conn())
            .await
            .unwrap_err();
    }

    h.dispatcher.login("op2", OP2_SECRET, conn()).await.unwrap();
}

#[tokio::test]
async fn test_success_resets_counter() {
    let h = harness(HandlerRegistry::default()).await;

    for _ in 0..4 {
        h.dispatcher
            .login("op2", "wrong-secret", conn())
            .await
            .unwrap_err();
    }
    h.dispatcher.login("op2", OP2_SECRET, conn()).await.unwrap();

    for _ in 0..4 {
        h.dispatcher
            .login("op2", "wrong-secret", conn())
            .await
            .unwrap_err();
    }
    h.dispatcher.login("op2", OP2_SECRET, conn()).await.unwrap();
}

#[tokio::test]
async fn test_unknown_identity_is_indistinguishable() {
    let h = harness(HandlerRegistry::default()).await;

    for _ in 0..10 {
        let err = h
            .dispatcher
            .login("ghost", "anything", conn())
            .await
            .unwrap_err();
        assert_eq!(err.reason(), Some(DenyReason::InvalidCredentials));
    }

    assert!(h.lockouts.is_empty());
}

#[tokio::test]
async fn test_concurrent_failures_cannot_bypass_threshold() {
    let h = harness(HandlerRegistry::default()).await;

    let attempts = (0..12).map(|_| {
        let dispatcher = h.dispatcher.clone();
        tokio::spawn(async move { dispatcher.login("op2", "wrong-secret", conn()).await })
    });
    let results = futures::future::join_all(attempts).await;
    assert!(results.into_iter().all(|r| r.unwrap().is_err()));

    let record = h.lockouts.get("op2").unwrap();
    assert!(record.failed_attempts >= 5);
    assert!(record.locked_until.is_some());

    let err = h
        .dispatcher
        .login("op2", OP2_SECRET, conn())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CallError::Denied {
            reason: DenyReason::IdentityLocked,
            ..
        }
    ));
}

#[tokio::test]
async fn test_required_role_gates_login() {
    let credentials = hookline_core::CredentialSettings {
        required_role: Some("admin".to_string()),
        ..fast_credentials()
    };
    let h = harness_with(HandlerRegistry::default(), credentials).await;

    let err = h
        .dispatcher
        .login("op1", OP1_SECRET, ConnectionId::new("conn-op1"))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), Some(DenyReason::InvalidCredentials));
    // A correct secret is not a failed attempt
    assert!(h.lockouts.get("op1").is_none());

    h.dispatcher
        .login("admin", common::ADMIN_SECRET, ConnectionId::new("conn-a"))
        .await
        .unwrap();
}
