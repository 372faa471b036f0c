//! Audit Logger - single-writer append path
//!
//! Callers submit entries over a bounded queue; one writer task owns the sink
//! and the next sequence number, so records are ordered by the order they
//! complete at the writer no matter how many calls run in parallel.

use super::sink::AuditSink;
use super::types::{AuditEntry, AuditRecord, AuditRecordBody, CompletionOutcome};
use crate::permissions::DecisionOutcome;
use crate::time::Clock;
use crate::{AaaError, AaaResult};
use hookline_core::{with_timeout, AuditSettings};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Completion detail written for an allow decision whose caller gave up before
/// the append was confirmed; the operation never ran
pub const NOT_EXECUTED_DETAIL: &str = "audit_unavailable: not executed";

struct AppendRequest {
    entry: AuditEntry,
    reply: oneshot::Sender<AaaResult<AuditRecord>>,
}

/// Serialized, fail-loud front of an [`AuditSink`]
pub struct AuditLogger {
    requests: mpsc::Sender<AppendRequest>,
    sink: Arc<dyn AuditSink>,
    append_timeout: Duration,
    shutdown_tx: std::sync::Mutex<Option<oneshot::Sender<()>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl AuditLogger {
    /// Start the writer task, continuing after the sink's last sequence number
    pub async fn start(
        sink: Arc<dyn AuditSink>,
        settings: &AuditSettings,
        clock: Arc<dyn Clock>,
    ) -> AaaResult<Self> {
        let last_sequence = sink.last_sequence().await?;
        let (requests, receiver) = mpsc::channel(settings.queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let writer = tokio::spawn(run_writer(
            Arc::clone(&sink),
            receiver,
            shutdown_rx,
            last_sequence + 1,
            clock,
        ));

        info!(
            next_sequence = last_sequence + 1,
            append_timeout = ?settings.append_timeout(),
            "Audit logger started"
        );

        Ok(Self {
            requests,
            sink,
            append_timeout: settings.append_timeout(),
            shutdown_tx: std::sync::Mutex::new(Some(shutdown_tx)),
            writer: Mutex::new(Some(writer)),
        })
    }

    /// Append an entry and return its sequence number
    ///
    /// Fails with `AuditUnavailable` when the sink rejects the record, the
    /// writer is gone, or no confirmation arrives within the append timeout.
    /// An entry abandoned while still queued is never written; an allow
    /// decision abandoned mid-append is closed by a completion carrying
    /// [`NOT_EXECUTED_DETAIL`].
    pub async fn record(&self, entry: AuditEntry) -> AaaResult<u64> {
        self.record_full(entry).await.map(|record| record.sequence)
    }

    /// Like [`record`](Self::record) but returns the stored record
    pub async fn record_full(&self, entry: AuditEntry) -> AaaResult<AuditRecord> {
        let (reply, confirmation) = oneshot::channel();
        let exchange = async {
            self.requests
                .send(AppendRequest { entry, reply })
                .await
                .map_err(|_| AaaError::audit_unavailable("audit writer has stopped"))?;
            confirmation
                .await
                .map_err(|_| AaaError::audit_unavailable("audit writer dropped the request"))?
        };

        match with_timeout(exchange, self.append_timeout, "audit_record").await {
            Ok(result) => result,
            Err(e) => Err(AaaError::audit_unavailable(e.to_string())),
        }
    }

    /// Records with sequence numbers in `from..=to`, for review tooling
    pub async fn read_range(&self, from: u64, to: u64) -> AaaResult<Vec<AuditRecord>> {
        self.sink.read_range(from, to).await
    }

    /// Stop accepting entries once the queue has drained
    pub async fn shutdown(&self) {
        let shutdown_tx = self
            .shutdown_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(tx) = shutdown_tx {
            let _ = tx.send(());
        }
        if let Some(writer) = self.writer.lock().await.take() {
            let _ = writer.await;
        }
    }
}

async fn run_writer(
    sink: Arc<dyn AuditSink>,
    mut receiver: mpsc::Receiver<AppendRequest>,
    mut shutdown_rx: oneshot::Receiver<()>,
    mut next_sequence: u64,
    clock: Arc<dyn Clock>,
) {
    let mut closing = false;
    loop {
        let request = tokio::select! {
            biased;
            request = receiver.recv() => match request {
                Some(request) => request,
                None => break,
            },
            // Refuse new entries but drain what is already queued
            _ = &mut shutdown_rx, if !closing => {
                receiver.close();
                closing = true;
                continue;
            }
        };

        if request.reply.is_closed() {
            warn!(call_id = %request.entry.call_id, "Dropping audit entry abandoned by its caller");
            continue;
        }

        let record = AuditRecord {
            sequence: next_sequence,
            recorded_at: clock.now(),
            call_id: request.entry.call_id,
            body: request.entry.body,
        };

        let result = match sink.append(&record).await {
            Ok(()) => {
                debug!(
                    sequence = record.sequence,
                    call_id = %record.call_id,
                    outcome = record.outcome_label(),
                    "Audit record appended"
                );
                next_sequence += 1;
                Ok(record)
            }
            // The sequence number is reused by the next successful append
            Err(e) => {
                error!(sequence = record.sequence, error = %e, "Audit append failed");
                Err(AaaError::audit_unavailable(e.to_string()))
            }
        };

        if let Err(Ok(orphan)) = request.reply.send(result) {
            if is_allow_decision(&orphan) {
                close_orphaned_allow(sink.as_ref(), clock.as_ref(), &orphan, &mut next_sequence)
                    .await;
            }
        }
    }

    info!(next_sequence, "Audit writer stopped");
}

fn is_allow_decision(record: &AuditRecord) -> bool {
    matches!(
        &record.body,
        AuditRecordBody::Decision(decision) if decision.outcome == DecisionOutcome::Allow
    )
}

/// The caller stopped waiting while `orphan` was being appended, so the call
/// was answered as refused; link a failed completion to the stray allow
async fn close_orphaned_allow(
    sink: &dyn AuditSink,
    clock: &dyn Clock,
    orphan: &AuditRecord,
    next_sequence: &mut u64,
) {
    let record = AuditRecord {
        sequence: *next_sequence,
        recorded_at: clock.now(),
        call_id: orphan.call_id,
        body: AuditRecordBody::Completion {
            decision_sequence: orphan.sequence,
            outcome: CompletionOutcome::AllowButFailed {
                detail: NOT_EXECUTED_DETAIL.to_string(),
            },
        },
    };

    match sink.append(&record).await {
        Ok(()) => {
            warn!(
                decision_sequence = orphan.sequence,
                sequence = record.sequence,
                call_id = %orphan.call_id,
                "Allow decision confirmed too late; recorded as not executed"
            );
            *next_sequence += 1;
        }
        Err(e) => error!(
            decision_sequence = orphan.sequence,
            error = %e,
            "Allow decision confirmed too late and could not be closed"
        ),
    }
}
