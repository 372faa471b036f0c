//! Audit Module
//!
//! Append-only, strictly ordered record of every authorization decision and
//! the outcome of the work it allowed.

pub mod logger;
pub mod sink;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod types;

pub use logger::{AuditLogger, NOT_EXECUTED_DETAIL};
pub use sink::{AuditSink, JsonlAuditSink, MemoryAuditSink};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteAuditSink;
pub use types::{AuditEntry, AuditRecord, AuditRecordBody, CompletionOutcome};

use crate::{AaaError, AaaResult};
use hookline_core::{AuditSettings, AuditSinkKind};
use std::sync::Arc;

/// Open the sink selected by configuration
pub async fn open_sink(settings: &AuditSettings) -> AaaResult<Arc<dyn AuditSink>> {
    let path = || {
        settings
            .path
            .as_ref()
            .ok_or_else(|| AaaError::config(format!("Audit sink '{}' requires a path", settings.sink)))
    };

    match settings.sink {
        AuditSinkKind::Memory => Ok(Arc::new(MemoryAuditSink::new())),
        AuditSinkKind::Jsonl => Ok(Arc::new(JsonlAuditSink::open(path()?).await?)),
        #[cfg(feature = "sqlite")]
        AuditSinkKind::Sqlite => Ok(Arc::new(SqliteAuditSink::open(path()?).await?)),
        #[cfg(not(feature = "sqlite"))]
        AuditSinkKind::Sqlite => Err(AaaError::config(
            "Audit sink 'sqlite' requires the sqlite feature",
        )),
    }
}
