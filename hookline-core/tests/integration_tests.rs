//! Integration tests for hookline-core infrastructure

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use hookline_core::{
    config_error, init_logging, spawn_periodic, storage_error, validation_error, with_timeout,
    AuditSinkKind, CoreError, ErrorContext, LogFormat, LoggingConfig, ServerConfig,
};

#[tokio::test]
async fn test_error_handling() {
    let error = storage_error!("Journal unavailable", "audit_sink");

    match &error {
        CoreError::Storage {
            message, context, ..
        } => {
            assert_eq!(message, "Journal unavailable");
            assert_eq!(context.component, "audit_sink");
            assert!(!context.error_id.is_empty());
        }
        _ => panic!("Expected Storage error"),
    }
    assert!(error.is_transient());

    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only volume");
    let wrapped = storage_error!("Failed to write audit record", "jsonl_audit_sink", io);
    assert!(wrapped.to_string().contains("read-only volume"));
    assert!(std::error::Error::source(&wrapped).is_some());

    let config_error = config_error!("Invalid config", "parse_toml");
    assert!(!config_error.is_transient());
    assert_eq!(
        config_error.context().and_then(|c| c.operation.as_deref()),
        Some("parse_toml")
    );

    let validation = validation_error!("Bad value", "lockout.threshold");
    assert_eq!(validation.field(), Some("lockout.threshold"));
    assert!(validation.suggestions()[0].contains("lockout.threshold"));
}

#[test]
fn test_error_context_builder() {
    let context = ErrorContext::new("session")
        .with_operation("validate")
        .with_metadata("connection", "c-1")
        .with_suggestion("Log in again");

    assert_eq!(context.operation.as_deref(), Some("validate"));
    assert_eq!(context.metadata.get("connection").map(String::as_str), Some("c-1"));
    assert_eq!(context.recovery_suggestions.len(), 1);
}

#[tokio::test]
async fn test_logging_initialization() {
    let config = LoggingConfig {
        level: "debug".to_string(),
        format: LogFormat::Compact,
        show_source: false,
        show_threads: false,
        file: None,
        span_timing: true,
        directives: vec!["hookline_core=debug".to_string()],
    };

    // A second initialisation in the same process reports an error instead of panicking
    let _ = init_logging(&config);
    assert!(init_logging(&config).is_err());
}

#[tokio::test]
async fn test_unwritable_log_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = LoggingConfig {
        file: Some(dir.path().join("missing").join("hookline.log")),
        ..LoggingConfig::default()
    };

    assert!(init_logging(&config).is_err());
}

#[test]
fn test_ready_future_never_times_out() {
    let result = tokio_test::block_on(with_timeout(async { 42 }, Duration::from_millis(1), "ready"));
    assert_eq!(tokio_test::assert_ok!(result), 42);
}

#[tokio::test]
async fn test_timeout_mechanism() {
    let quick_operation = async {
        sleep(Duration::from_millis(10)).await;
        "Success"
    };

    let result = with_timeout(quick_operation, Duration::from_millis(500), "quick_test").await;
    assert_eq!(result.unwrap(), "Success");

    let slow_operation = async {
        sleep(Duration::from_millis(500)).await;
        "Should not reach here"
    };

    let result = with_timeout(slow_operation, Duration::from_millis(20), "slow_test").await;
    match result.unwrap_err() {
        CoreError::Timeout {
            operation,
            duration_ms,
            ..
        } => {
            assert_eq!(operation, "slow_test");
            assert_eq!(duration_ms, 20);
        }
        _ => panic!("Expected Timeout error"),
    }
}

#[tokio::test]
async fn test_periodic_job_runs_until_shutdown() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let job = {
        let ticks = Arc::clone(&ticks);
        spawn_periodic("test_job", Duration::from_millis(10), move || {
            let ticks = Arc::clone(&ticks);
            async move {
                ticks.fetch_add(1, Ordering::SeqCst);
            }
        })
    };

    assert_eq!(job.interval(), Duration::from_millis(10));
    sleep(Duration::from_millis(80)).await;
    job.shutdown().await;

    let observed = ticks.load(Ordering::SeqCst);
    assert!(observed >= 2, "expected several ticks, got {}", observed);

    sleep(Duration::from_millis(40)).await;
    assert_eq!(ticks.load(Ordering::SeqCst), observed);
}

#[test]
fn test_config_validation() {
    let mut config = ServerConfig::default();
    assert!(config.validate().is_ok());

    config.session.renewal_threshold_secs = config.session.idle_timeout_secs + 1;
    let err = config.validate().unwrap_err();
    assert!(matches!(err, CoreError::Validation { .. }));
    assert_eq!(err.field(), Some("session.renewal_threshold_secs"));
    assert_eq!(err.suggestions(), ["Lower session.renewal_threshold_secs".to_string()]);

    let mut config = ServerConfig::default();
    config.session.idle_timeout_secs = config.session.max_lifetime_secs + 1;
    assert!(config.validate().is_err());

    let mut config = ServerConfig::default();
    config.lockout.threshold = 0;
    assert_eq!(config.validate().unwrap_err().field(), Some("lockout.threshold"));

    let mut config = ServerConfig::default();
    config.audit.sink = AuditSinkKind::Jsonl;
    config.audit.path = None;
    assert!(config.validate().is_err());

    let mut config = ServerConfig::default();
    config.server.max_concurrent_calls = 0;
    assert_eq!(
        config.validate().unwrap_err().field(),
        Some("server.max_concurrent_calls")
    );
}

#[test]
fn test_config_partial_toml_uses_defaults() {
    let config = ServerConfig::from_toml_str(
        r#"
        [server]
        max_concurrent_calls = 4

        [lockout]
        threshold = 3

        [audit]
        sink = "jsonl"
        path = "/tmp/audit.jsonl"

        [roles]
        viewer = ["read_campaign"]
        "#,
    )
    .unwrap();

    assert_eq!(config.server.max_concurrent_calls, 4);
    assert_eq!(config.lockout.threshold, 3);
    assert_eq!(config.lockout.window_secs, 15 * 60);
    assert_eq!(config.session.idle_timeout_secs, 30 * 60);
    assert_eq!(config.audit.sink, AuditSinkKind::Jsonl);
    assert_eq!(config.roles.len(), 1);
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_rejects_unknown_sink() {
    let result = ServerConfig::from_toml_str(
        r#"
        [audit]
        sink = "carrier-pigeon"
        "#,
    );
    assert!(matches!(result, Err(CoreError::Config { .. })));
}

#[test]
fn test_missing_config_file_names_the_path() {
    let err = ServerConfig::from_file("/nonexistent/hookline.toml").unwrap_err();
    let context = err.context().unwrap();
    assert_eq!(context.operation.as_deref(), Some("read_file"));
    assert_eq!(
        context.metadata.get("path").map(String::as_str),
        Some("/nonexistent/hookline.toml")
    );
}

#[test]
fn test_config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hookline.toml");

    let mut config = ServerConfig::default();
    config.lockout.threshold = 7;
    config.save_to_file(&path).unwrap();

    let loaded = ServerConfig::from_file(&path).unwrap();
    assert_eq!(loaded.lockout.threshold, 7);
    assert_eq!(loaded.roles, config.roles);
}
