//! Session table behaviour under concurrent use

use chrono::Duration;
use hookline_aaa::{AaaError, ConnectionId, Identity, LockoutTable, ManualClock, SessionManager};
use hookline_core::{LockoutSettings, SessionSettings};
use std::sync::Arc;

fn manager(clock: Arc<ManualClock>) -> Arc<SessionManager> {
    let settings = SessionSettings {
        idle_timeout_secs: 30 * 60,
        renewal_threshold_secs: 10 * 60,
        max_lifetime_secs: 2 * 60 * 60,
        sweep_interval_secs: 60,
        bind_to_connection: true,
    };
    Arc::new(SessionManager::new(
        &settings,
        Arc::new(LockoutTable::new(&LockoutSettings::default())),
        clock,
    ))
}

#[tokio::test]
async fn test_create_validate_revoke() {
    let clock = Arc::new(ManualClock::starting_now());
    let sessions = manager(clock.clone());
    let conn = ConnectionId::new("conn-1");

    let session = sessions
        .create_session(&Identity::new("op1"), conn.clone())
        .unwrap();
    let token = session.token.as_str().to_string();

    let validated = sessions.validate_for(&token, &conn).unwrap();
    assert_eq!(validated.identity, "op1");

    assert!(sessions.revoke(&token));
    assert!(!sessions.revoke(&token));
    assert!(matches!(
        sessions.validate_for(&token, &conn),
        Err(AaaError::SessionNotFound)
    ));
}

#[tokio::test]
async fn test_concurrent_validation_during_sweep() {
    let clock = Arc::new(ManualClock::starting_now());
    let sessions = manager(clock.clone());

    let mut live = Vec::new();
    for i in 0..32 {
        let session = sessions
            .create_session(&Identity::new(format!("op{}", i)), ConnectionId::new(format!("c{}", i)))
            .unwrap();
        live.push((session.token.as_str().to_string(), session.connection_id));
    }

    // Half the sessions go idle, the other half stay active
    clock.advance(Duration::minutes(25));
    for (token, conn) in live.iter().step_by(2) {
        sessions.validate_for(token, conn).unwrap();
    }
    clock.advance(Duration::minutes(10));

    let validators = live.iter().cloned().map(|(token, conn)| {
        let sessions = Arc::clone(&sessions);
        tokio::spawn(async move { sessions.validate_for(&token, &conn).is_ok() })
    });
    let sweeper = {
        let sessions = Arc::clone(&sessions);
        tokio::spawn(async move { sessions.sweep_expired() })
    };

    let results = futures::future::join_all(validators).await;
    let swept = sweeper.await.unwrap();

    let valid: Vec<bool> = results.into_iter().map(|r| r.unwrap()).collect();
    for (index, is_valid) in valid.iter().enumerate() {
        assert_eq!(*is_valid, index % 2 == 0, "session {}", index);
    }
    assert!(swept <= 16);
    assert_eq!(sessions.len(), 16);
}

#[tokio::test]
async fn test_revoke_identity_and_lifetime_ceiling() {
    let clock = Arc::new(ManualClock::starting_now());
    let sessions = manager(clock.clone());
    let admin = Identity::new("admin");

    let first = sessions
        .create_session(&admin, ConnectionId::new("c1"))
        .unwrap();
    sessions
        .create_session(&admin, ConnectionId::new("c2"))
        .unwrap();
    sessions
        .create_session(&Identity::new("op1"), ConnectionId::new("c3"))
        .unwrap();
    assert_eq!(sessions.sessions_for("admin").len(), 2);

    // Constant activity cannot push a session past its maximum lifetime
    let token = first.token.as_str().to_string();
    let conn = ConnectionId::new("c1");
    let mut expiry = None;
    for step in 1..=12 {
        clock.advance(Duration::minutes(12));
        if let Err(e) = sessions.validate_for(&token, &conn) {
            expiry = Some((step, e));
            break;
        }
    }
    let (step, err) = expiry.unwrap();
    assert_eq!(step, 10);
    assert!(matches!(err, AaaError::SessionExpired));

    assert_eq!(sessions.revoke_identity("admin"), 1);
    assert!(sessions.sessions_for("admin").is_empty());
}

#[tokio::test]
async fn test_sweeper_job_removes_expired_sessions() {
    let clock = Arc::new(ManualClock::starting_now());
    let sessions = manager(clock.clone());

    sessions
        .create_session(&Identity::new("op1"), ConnectionId::new("c1"))
        .unwrap();
    clock.advance(Duration::minutes(31));

    let sweeper = sessions.spawn_sweeper(std::time::Duration::from_millis(10));
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    sweeper.shutdown().await;

    assert!(sessions.is_empty());
}
