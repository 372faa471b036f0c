//! Durable audit sinks
//!
//! A sink only stores records it is handed; sequencing is owned by the
//! [`AuditLogger`](super::AuditLogger) writer task.

use super::types::AuditRecord;
use crate::AaaResult;
use async_trait::async_trait;
use hookline_core::{storage_error, CoreError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

/// Append-only store of audit records
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Durably append one record; records arrive in sequence order
    async fn append(&self, record: &AuditRecord) -> AaaResult<()>;

    /// Records with `from <= sequence <= to`, in sequence order
    async fn read_range(&self, from: u64, to: u64) -> AaaResult<Vec<AuditRecord>>;

    /// Highest stored sequence number, 0 when empty
    async fn last_sequence(&self) -> AaaResult<u64>;
}

/// In-memory sink for tests and ephemeral deployments
#[derive(Debug)]
pub struct MemoryAuditSink {
    records: RwLock<Vec<AuditRecord>>,
    available: AtomicBool,
    append_delay_ms: AtomicU64,
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
            append_delay_ms: AtomicU64::new(0),
        }
    }
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: while unavailable every append fails
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Simulate a slow disk: every append waits this long before completing
    pub fn set_append_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.append_delay_ms.store(millis, Ordering::SeqCst);
    }

    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, record: &AuditRecord) -> AaaResult<()> {
        let delay = self.append_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(storage_error!("Audit sink unavailable", "memory_audit_sink").into());
        }
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn read_range(&self, from: u64, to: u64) -> AaaResult<Vec<AuditRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|record| (from..=to).contains(&record.sequence))
            .cloned()
            .collect())
    }

    async fn last_sequence(&self) -> AaaResult<u64> {
        let records = self.records.read().await;
        Ok(records.last().map(|record| record.sequence).unwrap_or(0))
    }
}

/// Newline-delimited JSON journal, synced to disk after every append
///
/// The journal only ever holds whole lines: a write that fails part way is cut
/// back to the last acknowledged record before the error is returned, and a
/// partial tail found at open or before an append is truncated.
#[derive(Debug)]
pub struct JsonlAuditSink {
    path: PathBuf,
    journal: Mutex<Journal>,
    last_sequence: AtomicU64,
}

#[derive(Debug)]
struct Journal {
    file: File,
    /// Length covering every acknowledged record
    committed_len: u64,
    /// Set when a failed write could not be cut back; cleared by reopening
    poisoned: bool,
}

impl Journal {
    async fn truncate_to_committed(&mut self) -> std::io::Result<()> {
        self.file.set_len(self.committed_len).await?;
        self.file.sync_data().await
    }

    async fn write_line(&mut self, line: &[u8]) -> std::io::Result<()> {
        self.file.write_all(line).await?;
        self.file.flush().await?;
        self.file.sync_data().await
    }
}

impl JsonlAuditSink {
    /// Open or create the journal and recover the last sequence number
    pub async fn open<P: AsRef<Path>>(path: P) -> AaaResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                storage_error!("Failed to create audit journal directory", "jsonl_audit_sink", e)
            })?;
        }

        let content = match fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(
                    storage_error!("Failed to read audit journal", "jsonl_audit_sink", e).into(),
                )
            }
        };
        let complete = complete_prefix_len(&content);
        let last_sequence = parse_records(&path, &String::from_utf8_lossy(&content[..complete]))
            .last()
            .map(|record| record.sequence)
            .unwrap_or(0);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| storage_error!("Failed to open audit journal", "jsonl_audit_sink", e))?;

        let mut journal = Journal {
            file,
            committed_len: complete as u64,
            poisoned: false,
        };
        if complete < content.len() {
            warn!(
                path = %path.display(),
                discarded_bytes = content.len() - complete,
                "Truncating partial record at the end of the audit journal"
            );
            journal.truncate_to_committed().await.map_err(|e| {
                storage_error!("Failed to repair audit journal", "jsonl_audit_sink", e)
            })?;
        }

        info!(path = %path.display(), last_sequence, "Opened audit journal");

        Ok(Self {
            path,
            journal: Mutex::new(journal),
            last_sequence: AtomicU64::new(last_sequence),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Length of `content` up to and including its last newline
fn complete_prefix_len(content: &[u8]) -> usize {
    content
        .iter()
        .rposition(|byte| *byte == b'\n')
        .map(|index| index + 1)
        .unwrap_or(0)
}

/// Parse journal lines, skipping lines that do not hold a record (a torn final write)
pub fn parse_records(path: &Path, content: &str) -> Vec<AuditRecord> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(index, line)| match serde_json::from_str(line) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    line = index + 1,
                    error = %e,
                    "Skipping unreadable audit journal line"
                );
                None
            }
        })
        .collect()
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn append(&self, record: &AuditRecord) -> AaaResult<()> {
        let mut line = serde_json::to_vec(record).map_err(CoreError::from)?;
        line.push(b'\n');

        let mut journal = self.journal.lock().await;
        if journal.poisoned {
            return Err(storage_error!(
                "Audit journal holds an unrepaired partial write; reopen it",
                "jsonl_audit_sink"
            )
            .into());
        }

        let on_disk = journal
            .file
            .metadata()
            .await
            .map_err(|e| storage_error!("Failed to stat audit journal", "jsonl_audit_sink", e))?
            .len();
        if on_disk != journal.committed_len {
            warn!(
                path = %self.path.display(),
                on_disk,
                committed = journal.committed_len,
                "Discarding unacknowledged bytes at the end of the audit journal"
            );
            journal.truncate_to_committed().await.map_err(|e| {
                storage_error!("Failed to repair audit journal", "jsonl_audit_sink", e)
            })?;
        }

        if let Err(e) = journal.write_line(&line).await {
            // Cut back so neither a torn line nor an unacknowledged record survives
            if let Err(repair) = journal.truncate_to_committed().await {
                error!(
                    path = %self.path.display(),
                    error = %repair,
                    "Could not cut back a failed audit write; journal poisoned"
                );
                journal.poisoned = true;
            }
            return Err(storage_error!("Failed to write audit record", "jsonl_audit_sink", e).into());
        }

        journal.committed_len += line.len() as u64;
        self.last_sequence.store(record.sequence, Ordering::SeqCst);
        Ok(())
    }

    async fn read_range(&self, from: u64, to: u64) -> AaaResult<Vec<AuditRecord>> {
        // Only the acknowledged prefix is read, never a write in progress
        let journal = self.journal.lock().await;
        let content = fs::read(&self.path)
            .await
            .map_err(|e| storage_error!("Failed to read audit journal", "jsonl_audit_sink", e))?;
        let committed = usize::try_from(journal.committed_len)
            .unwrap_or(usize::MAX)
            .min(content.len());

        Ok(parse_records(&self.path, &String::from_utf8_lossy(&content[..committed]))
            .into_iter()
            .filter(|record| (from..=to).contains(&record.sequence))
            .collect())
    }

    async fn last_sequence(&self) -> AaaResult<u64> {
        Ok(self.last_sequence.load(Ordering::SeqCst))
    }
}
