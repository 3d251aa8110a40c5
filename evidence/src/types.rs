//! Core types for case input and critic evidence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::hash::content_hash;

/// Current schema version for evidence bundles and decisions.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Risk flag that forces human review regardless of the vote.
pub const MANDATORY_REVIEW_FLAG: &str = "mandatory_review";

/// Risk flag added when the top precedent disagrees with the verdict.
pub const PRECEDENT_CONFLICT_FLAG: &str = "precedent_conflict";

/// Risk flag added when the precedent store could not be consulted.
pub const PRECEDENT_DEGRADED_FLAG: &str = "precedent_store_degraded";

/// A critic verdict.
///
/// Verdicts are a closed set; free-form strings are never accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// Permit the proposed action
    Allow,
    /// Refuse the proposed action
    Deny,
    /// Route to human review
    Escalate,
    /// Critic declines to take a position
    Abstain,
    /// Critic failed to produce a usable evaluation
    Error,
}

impl Verdict {
    /// All verdicts.
    pub const ALL: [Verdict; 5] = [
        Verdict::Allow,
        Verdict::Deny,
        Verdict::Escalate,
        Verdict::Abstain,
        Verdict::Error,
    ];

    /// Verdicts that carry vote weight.
    pub const VOTING: [Verdict; 4] = [
        Verdict::Allow,
        Verdict::Deny,
        Verdict::Escalate,
        Verdict::Abstain,
    ];

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "ALLOW",
            Self::Deny => "DENY",
            Self::Escalate => "ESCALATE",
            Self::Abstain => "ABSTAIN",
            Self::Error => "ERROR",
        }
    }

    /// Whether this verdict marks a failed evaluation.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown verdict string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown verdict: {0}")]
pub struct UnknownVerdict(pub String);

impl FromStr for Verdict {
    type Err = UnknownVerdict;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALLOW" => Ok(Self::Allow),
            "DENY" => Ok(Self::Deny),
            "ESCALATE" => Ok(Self::Escalate),
            "ABSTAIN" => Ok(Self::Abstain),
            "ERROR" => Ok(Self::Error),
            _ => Err(UnknownVerdict(s.to_string())),
        }
    }
}

/// The proposed action submitted for evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseInput {
    /// Case identifier
    pub case_id: String,
    /// The prompt or action description
    pub prompt: String,
    /// Structured context; each key is a feature for attribution
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
}

impl CaseInput {
    /// Create a new case input.
    pub fn new(case_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            case_id: case_id.into(),
            prompt: prompt.into(),
            context: BTreeMap::new(),
        }
    }

    /// Add a context entry.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.context
            .insert(key.into(), serde_json::to_value(value).unwrap_or_default());
        self
    }

    /// Feature names present in the input, sorted.
    pub fn features(&self) -> Vec<String> {
        self.context.keys().cloned().collect()
    }

    /// Content hash of prompt and context. The case ID is excluded so that
    /// resubmitted content hashes identically.
    pub fn content_hash(&self) -> String {
        content_hash(&(&self.prompt, &self.context))
    }

    /// Take an immutable snapshot for evidence records.
    pub fn snapshot(&self) -> InputSnapshot {
        InputSnapshot {
            case_id: self.case_id.clone(),
            prompt: self.prompt.clone(),
            context: self.context.clone(),
            content_hash: self.content_hash(),
        }
    }
}

/// Snapshot of the case input captured alongside evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSnapshot {
    /// Case identifier
    pub case_id: String,
    /// The prompt at evaluation time
    pub prompt: String,
    /// Context at evaluation time
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
    /// SHA-256 of prompt and context
    pub content_hash: String,
}

impl InputSnapshot {
    /// Feature names present in the snapshot, sorted.
    pub fn features(&self) -> Vec<String> {
        self.context.keys().cloned().collect()
    }

    /// Lowercased alphanumeric tokens of the prompt and context.
    pub fn tokens(&self) -> BTreeSet<String> {
        let mut text = self.prompt.clone();
        for (key, value) in &self.context {
            text.push(' ');
            text.push_str(key);
            text.push(' ');
            match value {
                serde_json::Value::String(s) => text.push_str(s),
                other => text.push_str(&other.to_string()),
            }
        }
        tokenize(&text)
    }

    /// Short human-readable summary of the case.
    pub fn summary(&self) -> String {
        const MAX_CHARS: usize = 120;
        if self.prompt.chars().count() <= MAX_CHARS {
            self.prompt.clone()
        } else {
            let truncated: String = self.prompt.chars().take(MAX_CHARS).collect();
            format!("{}...", truncated)
        }
    }
}

/// Split text into lowercased alphanumeric tokens.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Execution metadata attached to a bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceMetadata {
    /// When the evaluation finished
    pub timestamp: DateTime<Utc>,
    /// Wall-clock time spent in the critic
    pub execution_time_ms: u64,
    /// Trace identifier for correlating logs
    pub trace_id: String,
}

impl Default for EvidenceMetadata {
    fn default() -> Self {
        Self {
            timestamp: Utc::now(),
            execution_time_ms: 0,
            trace_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// A finer-grained verdict reported by a critic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubVerdict {
    /// Aspect evaluated
    pub name: String,
    /// Verdict for this aspect
    pub verdict: Verdict,
    /// Confidence (0.0 - 1.0)
    pub confidence: f64,
}

/// Why a critic produced no usable evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Critic exceeded its timeout
    CriticTimeout,
    /// Critic returned a bundle that violates the schema
    CriticMalformedOutput,
    /// Critic raised an error or panicked
    CriticFailed,
}

impl FailureKind {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CriticTimeout => "critic_timeout",
            Self::CriticMalformedOutput => "critic_malformed_output",
            Self::CriticFailed => "critic_failed",
        }
    }

    /// Risk flag recorded on the ERROR bundle.
    pub fn risk_flag(&self) -> String {
        format!("error:{}", self.as_str())
    }
}

/// Schema violations found when validating a bundle.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaViolation {
    /// Confidence is NaN, infinite or outside [0, 1]
    #[error("Confidence out of range: {0}")]
    ConfidenceOutOfRange(f64),

    /// Critic name is empty or does not match the registered name
    #[error("Critic name mismatch: expected {expected}, got {actual:?}")]
    CriticNameMismatch { expected: String, actual: String },

    /// Major schema version is not supported
    #[error("Unsupported schema version: {0}")]
    UnsupportedVersion(String),

    /// A sub-verdict carries an invalid confidence
    #[error("Sub-verdict {name} has confidence out of range: {confidence}")]
    SubVerdictOutOfRange { name: String, confidence: f64 },
}

/// Immutable record of one critic's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceBundle {
    /// Unique bundle ID
    pub bundle_id: String,
    /// Schema version
    pub version: String,
    /// Critic that produced this bundle
    pub critic_name: String,
    /// Verdict
    pub verdict: Verdict,
    /// Confidence (0.0 - 1.0)
    pub confidence: f64,
    /// Free-text justification
    #[serde(default)]
    pub justification: String,
    /// Risk flags raised by the critic
    #[serde(default)]
    pub risk_flags: BTreeSet<String>,
    /// Finer-grained verdicts
    #[serde(default)]
    pub sub_verdicts: Vec<SubVerdict>,
    /// Precedent IDs the critic consulted
    #[serde(default)]
    pub precedents_referenced: Vec<String>,
    /// Execution metadata
    pub metadata: EvidenceMetadata,
    /// Input the critic saw
    pub input_snapshot: InputSnapshot,
    /// Fields from newer schema versions, preserved verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl EvidenceBundle {
    /// Create a new bundle for a case.
    pub fn new(
        critic_name: impl Into<String>,
        verdict: Verdict,
        confidence: f64,
        input: &CaseInput,
    ) -> Self {
        Self::from_snapshot(critic_name, verdict, confidence, input.snapshot())
    }

    /// Create a new bundle from an existing snapshot.
    pub fn from_snapshot(
        critic_name: impl Into<String>,
        verdict: Verdict,
        confidence: f64,
        snapshot: InputSnapshot,
    ) -> Self {
        Self {
            bundle_id: uuid::Uuid::new_v4().to_string(),
            version: SCHEMA_VERSION.to_string(),
            critic_name: critic_name.into(),
            verdict,
            confidence,
            justification: String::new(),
            risk_flags: BTreeSet::new(),
            sub_verdicts: Vec::new(),
            precedents_referenced: Vec::new(),
            metadata: EvidenceMetadata::default(),
            input_snapshot: snapshot,
            extra: BTreeMap::new(),
        }
    }

    /// Create an ERROR bundle standing in for a failed critic.
    pub fn error(
        critic_name: impl Into<String>,
        kind: FailureKind,
        reason: impl Into<String>,
        snapshot: InputSnapshot,
    ) -> Self {
        let mut bundle = Self::from_snapshot(critic_name, Verdict::Error, 0.0, snapshot);
        bundle.justification = reason.into();
        bundle.risk_flags.insert(kind.risk_flag());
        bundle.extra.insert(
            "failure_kind".to_string(),
            serde_json::Value::String(kind.as_str().to_string()),
        );
        bundle
    }

    /// Set the justification.
    pub fn with_justification(mut self, justification: impl Into<String>) -> Self {
        self.justification = justification.into();
        self
    }

    /// Add a risk flag.
    pub fn with_risk_flag(mut self, flag: impl Into<String>) -> Self {
        self.risk_flags.insert(flag.into());
        self
    }

    /// Add a sub-verdict.
    pub fn with_sub_verdict(mut self, name: impl Into<String>, verdict: Verdict, confidence: f64) -> Self {
        self.sub_verdicts.push(SubVerdict {
            name: name.into(),
            verdict,
            confidence,
        });
        self
    }

    /// Record a precedent the critic consulted.
    pub fn with_precedent(mut self, precedent_id: impl Into<String>) -> Self {
        self.precedents_referenced.push(precedent_id.into());
        self
    }

    /// Set the execution time.
    pub fn with_execution_time(mut self, execution_time_ms: u64) -> Self {
        self.metadata.execution_time_ms = execution_time_ms;
        self
    }

    /// Set the trace ID.
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.metadata.trace_id = trace_id.into();
        self
    }

    /// Whether the bundle carries a risk flag.
    pub fn has_flag(&self, flag: &str) -> bool {
        self.risk_flags.contains(flag)
    }

    /// Failure kind recorded on an ERROR bundle.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.extra
            .get("failure_kind")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Vote weight given the critic's configured weight. ERROR bundles
    /// never carry weight.
    pub fn weight(&self, critic_weight: f64) -> f64 {
        if self.verdict.is_error() {
            0.0
        } else {
            self.confidence * critic_weight
        }
    }

    /// Check the bundle against the schema.
    pub fn validate(&self, expected_critic: &str) -> Result<(), SchemaViolation> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(SchemaViolation::ConfidenceOutOfRange(self.confidence));
        }

        if self.critic_name.is_empty() || self.critic_name != expected_critic {
            return Err(SchemaViolation::CriticNameMismatch {
                expected: expected_critic.to_string(),
                actual: self.critic_name.clone(),
            });
        }

        if !is_supported_version(&self.version) {
            return Err(SchemaViolation::UnsupportedVersion(self.version.clone()));
        }

        for sub in &self.sub_verdicts {
            if !sub.confidence.is_finite() || !(0.0..=1.0).contains(&sub.confidence) {
                return Err(SchemaViolation::SubVerdictOutOfRange {
                    name: sub.name.clone(),
                    confidence: sub.confidence,
                });
            }
        }

        Ok(())
    }
}

/// Whether a schema version shares the supported major version.
pub fn is_supported_version(version: &str) -> bool {
    let major = |v: &str| v.split('.').next().map(str::to_string);
    match (major(version), major(SCHEMA_VERSION)) {
        (Some(a), Some(b)) => !a.is_empty() && a == b,
        _ => false,
    }
}
