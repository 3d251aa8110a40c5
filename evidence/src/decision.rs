//! The governed decision reduced from a set of evidence bundles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::hash::content_hash;
use crate::types::{EvidenceBundle, InputSnapshot, Verdict, SCHEMA_VERSION};

/// Outcome status of a decision.
///
/// `Decided` and `Degraded` are success paths; `Undecidable` means the
/// system could not evaluate the case and forced escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    /// All critics and the precedent store answered
    Decided,
    /// Decided with reduced evidence (critic errors or precedent store down)
    Degraded,
    /// No usable evidence; the case must go to human review
    Undecidable,
}

/// Shape of the disagreement among weighted votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisagreementType {
    /// Every weighted vote agrees
    Unanimous,
    /// A dominant majority with a minority outlier
    Lopsided,
    /// Near-even two-way split
    Split,
    /// Three or more verdicts with comparable weight
    Chaotic,
}

impl DisagreementType {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unanimous => "unanimous",
            Self::Lopsided => "lopsided",
            Self::Split => "split",
            Self::Chaotic => "chaotic",
        }
    }
}

/// Why a decision requires human review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTrigger {
    /// Dissent index above the escalation threshold
    HighDissent,
    /// Confidence below the minimum
    LowConfidence,
    /// A critic raised the mandatory review flag
    MandatoryReview,
    /// No critic produced usable evidence
    AllCriticsFailed,
}

/// A governed decision over one case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Case identifier
    pub case_id: String,
    /// Schema version
    pub version: String,
    /// Outcome status
    pub status: DecisionStatus,
    /// Final verdict
    pub final_verdict: Verdict,
    /// Share of weight behind the final verdict (0.0 - 1.0)
    pub confidence: f64,
    /// Normalized disagreement (0.0 = unanimous)
    pub dissent_index: f64,
    /// Count share of critics behind the final verdict
    pub split_ratio: f64,
    /// Shape of the disagreement
    pub disagreement_type: DisagreementType,
    /// Evidence, ordered by critic name
    pub evidence: Vec<EvidenceBundle>,
    /// Critic weights the vote was computed with
    #[serde(default)]
    pub critic_weights: BTreeMap<String, f64>,
    /// Precedent IDs consulted
    #[serde(default)]
    pub precedents_applied: Vec<String>,
    /// Union of bundle flags and flags raised during aggregation
    #[serde(default)]
    pub risk_flags: BTreeSet<String>,
    /// Whether a human must review this decision
    pub requires_escalation: bool,
    /// What triggered escalation
    #[serde(default)]
    pub escalation_triggers: Vec<EscalationTrigger>,
    /// Whether the precedent store was unreachable
    #[serde(default)]
    pub degraded_mode: bool,
    /// Audit log entry for this decision
    #[serde(default)]
    pub audit_log_id: Option<String>,
    /// Escalation bundle created for this decision
    #[serde(default)]
    pub escalation_ref: Option<String>,
    /// When the decision was made
    pub timestamp: DateTime<Utc>,
    /// Time spent producing the decision
    pub execution_time_ms: u64,
    /// Fields from newer schema versions, preserved verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Decision {
    /// Create a decision with the schema version and current timestamp.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        case_id: impl Into<String>,
        status: DecisionStatus,
        final_verdict: Verdict,
        confidence: f64,
        dissent_index: f64,
        split_ratio: f64,
        disagreement_type: DisagreementType,
        evidence: Vec<EvidenceBundle>,
    ) -> Self {
        Self {
            case_id: case_id.into(),
            version: SCHEMA_VERSION.to_string(),
            status,
            final_verdict,
            confidence,
            dissent_index,
            split_ratio,
            disagreement_type,
            evidence,
            critic_weights: BTreeMap::new(),
            precedents_applied: Vec::new(),
            risk_flags: BTreeSet::new(),
            requires_escalation: false,
            escalation_triggers: Vec::new(),
            degraded_mode: false,
            audit_log_id: None,
            escalation_ref: None,
            timestamp: Utc::now(),
            execution_time_ms: 0,
            extra: BTreeMap::new(),
        }
    }

    /// Whether the system could not decide.
    pub fn is_undecidable(&self) -> bool {
        self.status == DecisionStatus::Undecidable
    }

    /// Whether the decision carries a risk flag.
    pub fn has_flag(&self, flag: &str) -> bool {
        self.risk_flags.contains(flag)
    }

    /// Evidence from a specific critic.
    pub fn evidence_for(&self, critic_name: &str) -> Option<&EvidenceBundle> {
        self.evidence.iter().find(|b| b.critic_name == critic_name)
    }

    /// Input snapshot shared by the evidence set.
    pub fn input_snapshot(&self) -> Option<&InputSnapshot> {
        self.evidence.first().map(|b| &b.input_snapshot)
    }

    /// Weight the vote gave a critic; unlisted critics weigh 1.0.
    pub fn critic_weight(&self, critic_name: &str) -> f64 {
        self.critic_weights.get(critic_name).copied().unwrap_or(1.0)
    }

    /// Number of ERROR bundles.
    pub fn error_count(&self) -> usize {
        self.evidence.iter().filter(|b| b.verdict.is_error()).count()
    }

    /// SHA-256 over the decision with volatile fields removed.
    ///
    /// Excludes the timestamp, execution time, audit ID and escalation
    /// reference. Two decisions from identical bundle sets and identical
    /// precedent snapshots share a fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            for key in ["timestamp", "execution_time_ms", "audit_log_id", "escalation_ref"] {
                obj.remove(key);
            }
        }
        content_hash(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CaseInput;

    fn make_decision() -> Decision {
        let input = CaseInput::new("case-1", "Delete production database");
        let evidence = vec![
            EvidenceBundle::new("safety", Verdict::Deny, 0.9, &input),
            EvidenceBundle::new("ops", Verdict::Allow, 0.4, &input),
        ];
        Decision::new(
            "case-1",
            DecisionStatus::Decided,
            Verdict::Deny,
            0.69,
            0.31,
            0.5,
            DisagreementType::Lopsided,
            evidence,
        )
    }

    #[test]
    fn test_fingerprint_ignores_volatile_fields() {
        let a = make_decision();
        let mut b = a.clone();
        b.timestamp = b.timestamp + chrono::Duration::seconds(30);
        b.execution_time_ms = 999;
        b.audit_log_id = Some("audit-1".to_string());
        b.escalation_ref = Some("esc-1".to_string());
        assert_eq!(a.fingerprint(), b.fingerprint());

        let mut c = a.clone();
        c.confidence = 0.7;
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_lookups() {
        let decision = make_decision();
        assert_eq!(decision.evidence_for("ops").unwrap().verdict, Verdict::Allow);
        assert!(decision.evidence_for("missing").is_none());
        assert_eq!(decision.error_count(), 0);
        assert_eq!(decision.critic_weight("safety"), 1.0);
        assert_eq!(decision.input_snapshot().unwrap().case_id, "case-1");
    }

    #[test]
    fn test_decision_roundtrip_keeps_unknown_fields() {
        let decision = make_decision();
        let mut value = serde_json::to_value(&decision).unwrap();
        value["reviewer_notes"] = serde_json::json!("looked fine");

        let decoded: Decision = serde_json::from_value(value).unwrap();
        assert_eq!(decoded.final_verdict, Verdict::Deny);
        assert_eq!(decoded.extra["reviewer_notes"], "looked fine");
    }
}
