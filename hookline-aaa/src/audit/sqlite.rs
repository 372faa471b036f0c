//! SQLite-backed audit sink

use super::sink::AuditSink;
use super::types::AuditRecord;
use crate::AaaResult;
use async_trait::async_trait;
use hookline_core::{storage_error, CoreError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::{info, warn};

fn to_db_sequence(sequence: u64) -> i64 {
    i64::try_from(sequence).unwrap_or(i64::MAX)
}

/// Audit sink storing one row per record
///
/// The full record is kept as JSON next to a few indexed columns for review tools.
#[derive(Debug, Clone)]
pub struct SqliteAuditSink {
    pool: SqlitePool,
}

impl SqliteAuditSink {
    /// Open or create the database file
    pub async fn open<P: AsRef<Path>>(path: P) -> AaaResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);

        // A single connection keeps appends in submission order
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| storage_error!("Failed to open audit database", "sqlite_audit_sink", e))?;

        Self::with_pool(pool).await
    }

    /// Use an existing pool, creating the table if needed
    pub async fn with_pool(pool: SqlitePool) -> AaaResult<Self> {
        let sink = Self { pool };
        sink.create_tables().await?;
        Ok(sink)
    }

    async fn create_tables(&self) -> AaaResult<()> {
        let query = r#"
            CREATE TABLE IF NOT EXISTS audit_records (
                sequence INTEGER PRIMARY KEY,
                recorded_at TEXT NOT NULL,
                call_id TEXT NOT NULL,
                outcome TEXT NOT NULL,
                record TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_records_call_id ON audit_records(call_id);
        "#;

        sqlx::query(query)
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error!("Failed to create audit table", "sqlite_audit_sink", e))?;

        info!("Audit table ready");
        Ok(())
    }
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
    async fn append(&self, record: &AuditRecord) -> AaaResult<()> {
        let json = serde_json::to_string(record).map_err(CoreError::from)?;

        sqlx::query(
            "INSERT INTO audit_records (sequence, recorded_at, call_id, outcome, record) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(to_db_sequence(record.sequence))
        .bind(record.recorded_at.to_rfc3339())
        .bind(record.call_id.to_string())
        .bind(record.outcome_label())
        .bind(json)
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error!("Failed to insert audit record", "sqlite_audit_sink", e))?;

        Ok(())
    }

    async fn read_range(&self, from: u64, to: u64) -> AaaResult<Vec<AuditRecord>> {
        let rows = sqlx::query(
            "SELECT sequence, record FROM audit_records WHERE sequence BETWEEN ? AND ? ORDER BY sequence",
        )
        .bind(to_db_sequence(from))
        .bind(to_db_sequence(to))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error!("Failed to read audit records", "sqlite_audit_sink", e))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let json: String = row
                .try_get("record")
                .map_err(|e| storage_error!("Malformed audit row", "sqlite_audit_sink", e))?;
            match serde_json::from_str::<AuditRecord>(&json) {
                Ok(record) => records.push(record),
                Err(e) => {
                    let sequence: i64 = row.try_get("sequence").unwrap_or_default();
                    warn!(sequence, error = %e, "Skipping unreadable audit row");
                }
            }
        }
        Ok(records)
    }

    async fn last_sequence(&self) -> AaaResult<u64> {
        let row = sqlx::query("SELECT COALESCE(MAX(sequence), 0) AS last FROM audit_records")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| storage_error!("Failed to read audit sequence", "sqlite_audit_sink", e))?;

        let last: i64 = row
            .try_get("last")
            .map_err(|e| storage_error!("Malformed audit sequence", "sqlite_audit_sink", e))?;
        Ok(u64::try_from(last).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::types::{AuditRecordBody, CompletionOutcome};
    use chrono::Utc;
    use uuid::Uuid;

    fn record(sequence: u64) -> AuditRecord {
        AuditRecord {
            sequence,
            recorded_at: Utc::now(),
            call_id: Uuid::new_v4(),
            body: AuditRecordBody::Completion {
                decision_sequence: sequence.saturating_sub(1),
                outcome: CompletionOutcome::AllowButFailed {
                    detail: "template missing".to_string(),
                },
            },
        }
    }

    #[tokio::test]
    async fn test_sqlite_sink_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.db");

        {
            let sink = SqliteAuditSink::open(&path).await.unwrap();
            assert_eq!(sink.last_sequence().await.unwrap(), 0);
            for sequence in 1..=4 {
                sink.append(&record(sequence)).await.unwrap();
            }
            // Sequence numbers are unique
            assert!(sink.append(&record(4)).await.is_err());
        }

        let sink = SqliteAuditSink::open(&path).await.unwrap();
        assert_eq!(sink.last_sequence().await.unwrap(), 4);

        let records = sink.read_range(2, 3).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sequence, 2);
        assert_eq!(records[1].outcome_label(), "allow-but-failed");
    }
}
