//! Audit trail of finalized decisions.
//!
//! One entry per decision, newest first, bounded by `audit_max_entries`.
//! Each entry carries the decision fingerprint so a replayed case can be
//! checked against what was originally decided.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use evidence::{Decision, DecisionStatus, Verdict};

/// Default maximum entries before pruning.
const MAX_AUDIT_ENTRIES: usize = 10_000;

/// An entry in the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry ID
    pub audit_id: String,
    /// Case decided
    pub case_id: String,
    /// Final verdict
    pub final_verdict: Verdict,
    /// Decision status
    pub status: DecisionStatus,
    /// Aggregate confidence
    pub confidence: f64,
    /// Dissent index
    pub dissent_index: f64,
    /// Whether the case went to human review
    pub requires_escalation: bool,
    /// Whether the decision ran degraded
    pub degraded_mode: bool,
    /// Decision fingerprint
    pub fingerprint: String,
    /// Pipeline duration
    pub execution_time_ms: u64,
    /// When the entry was recorded
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// Create an entry from a decision.
    pub fn from_decision(decision: &Decision) -> Self {
        Self {
            audit_id: uuid::Uuid::new_v4().to_string(),
            case_id: decision.case_id.clone(),
            final_verdict: decision.final_verdict,
            status: decision.status,
            confidence: decision.confidence,
            dissent_index: decision.dissent_index,
            requires_escalation: decision.requires_escalation,
            degraded_mode: decision.degraded_mode,
            fingerprint: decision.fingerprint(),
            execution_time_ms: decision.execution_time_ms,
            timestamp: Utc::now(),
        }
    }
}

/// Bounded audit log.
pub struct AuditLog {
    /// Log entries (newest first)
    entries: Arc<RwLock<VecDeque<AuditEntry>>>,
    max_entries: usize,
}

impl AuditLog {
    /// Create a new audit log.
    pub fn new() -> Self {
        Self::with_max_entries(MAX_AUDIT_ENTRIES)
    }

    /// Create with custom max entries.
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            max_entries: max_entries.max(1),
        }
    }

    /// Record a decision; returns the audit ID.
    pub async fn record(&self, decision: &Decision) -> String {
        let entry = AuditEntry::from_decision(decision);
        let audit_id = entry.audit_id.clone();

        debug!(
            audit_id = %audit_id,
            case_id = %entry.case_id,
            verdict = %entry.final_verdict,
            "Decision audited"
        );

        let mut entries = self.entries.write().await;
        entries.push_front(entry);
        while entries.len() > self.max_entries {
            entries.pop_back();
        }

        audit_id
    }

    /// Get entry by audit ID.
    pub async fn get(&self, audit_id: &str) -> Option<AuditEntry> {
        let entries = self.entries.read().await;
        entries.iter().find(|e| e.audit_id == audit_id).cloned()
    }

    /// Entries for a case, newest first.
    pub async fn for_case(&self, case_id: &str) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.case_id == case_id)
            .cloned()
            .collect()
    }

    /// Get recent entries.
    pub async fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries.iter().take(limit).cloned().collect()
    }

    /// Get statistics.
    pub async fn stats(&self) -> AuditStats {
        let entries = self.entries.read().await;

        let total = entries.len();
        let escalated = entries.iter().filter(|e| e.requires_escalation).count();
        let degraded = entries.iter().filter(|e| e.degraded_mode).count();
        let undecidable = entries
            .iter()
            .filter(|e| e.status == DecisionStatus::Undecidable)
            .count();

        let avg_duration_ms = if total > 0 {
            entries.iter().map(|e| e.execution_time_ms).sum::<u64>() / total as u64
        } else {
            0
        };

        AuditStats {
            total,
            escalated,
            degraded,
            undecidable,
            avg_duration_ms,
        }
    }

    /// Get count.
    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics from the audit log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStats {
    /// Decisions logged
    pub total: usize,
    /// Decisions that required escalation
    pub escalated: usize,
    /// Decisions made in degraded mode
    pub degraded: usize,
    /// Undecidable decisions
    pub undecidable: usize,
    /// Average pipeline duration
    pub avg_duration_ms: u64,
}
