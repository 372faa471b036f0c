//! Audit record types

use crate::permissions::{AuthorizationDecision, DecisionOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of a handler that was allowed to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompletionOutcome {
    Succeeded,
    /// Permitted, but execution failed for an independent reason
    AllowButFailed { detail: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditRecordBody {
    Decision(AuthorizationDecision),
    Completion {
        /// Sequence number of the allow decision this completes
        decision_sequence: u64,
        outcome: CompletionOutcome,
    },
}

/// An entry submitted to the audit logger, before it is sequenced
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub call_id: Uuid,
    pub body: AuditRecordBody,
}

impl AuditEntry {
    pub fn decision(call_id: Uuid, decision: AuthorizationDecision) -> Self {
        Self {
            call_id,
            body: AuditRecordBody::Decision(decision),
        }
    }

    pub fn completion(call_id: Uuid, decision_sequence: u64, outcome: CompletionOutcome) -> Self {
        Self {
            call_id,
            body: AuditRecordBody::Completion {
                decision_sequence,
                outcome,
            },
        }
    }
}

/// A sequenced, durable audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Gap-free logical clock starting at 1
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
    pub call_id: Uuid,
    #[serde(flatten)]
    pub body: AuditRecordBody,
}

impl AuditRecord {
    /// Short outcome label: `allow`, `deny`, `succeeded` or `allow-but-failed`
    pub fn outcome_label(&self) -> &'static str {
        match &self.body {
            AuditRecordBody::Decision(decision) => match decision.outcome {
                DecisionOutcome::Allow => "allow",
                DecisionOutcome::Deny => "deny",
            },
            AuditRecordBody::Completion { outcome, .. } => match outcome {
                CompletionOutcome::Succeeded => "succeeded",
                CompletionOutcome::AllowButFailed { .. } => "allow-but-failed",
            },
        }
    }

    pub fn decision(&self) -> Option<&AuthorizationDecision> {
        match &self.body {
            AuditRecordBody::Decision(decision) => Some(decision),
            AuditRecordBody::Completion { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::DenyReason;

    #[test]
    fn test_record_json_shape() {
        let decision = AuthorizationDecision::deny(
            "launch_campaign",
            None,
            Utc::now(),
            DenyReason::NoSession,
            "no valid session",
        );
        let record = AuditRecord {
            sequence: 7,
            recorded_at: Utc::now(),
            call_id: Uuid::new_v4(),
            body: AuditRecordBody::Decision(decision),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["sequence"], 7);
        assert_eq!(json["kind"], "decision");
        assert_eq!(json["outcome"], "deny");
        assert_eq!(record.outcome_label(), "deny");

        let parsed: AuditRecord = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_completion_labels() {
        let record = AuditRecord {
            sequence: 2,
            recorded_at: Utc::now(),
            call_id: Uuid::new_v4(),
            body: AuditRecordBody::Completion {
                decision_sequence: 1,
                outcome: CompletionOutcome::AllowButFailed {
                    detail: "smtp relay refused".to_string(),
                },
            },
        };

        assert_eq!(record.outcome_label(), "allow-but-failed");
        assert!(record.decision().is_none());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "completion");
        assert_eq!(json["outcome"]["status"], "allow_but_failed");
    }
}
