//! Configuration for the tribunal.
//!
//! Every threshold is injected; nothing in the pipeline hard-codes policy.
//! Invalid configuration is rejected by [`TribunalConfig::validate`] at
//! startup.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use evidence::{SearchMode, Verdict};

use crate::types::{Result, TribunalError};

/// Configuration for a tribunal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TribunalConfig {
    /// Collector configuration
    pub collector: CollectorConfig,
    /// Aggregator configuration
    pub aggregator: AggregatorConfig,
    /// Escalation configuration
    pub escalation: EscalationConfig,
    /// Explainability configuration
    pub explain: ExplainConfig,
    /// General settings
    pub general: GeneralConfig,
}

impl TribunalConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> std::result::Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Load and validate config from YAML.
    pub fn load(yaml: &str) -> Result<Self> {
        let config = Self::from_yaml(yaml).map_err(|e| TribunalError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the whole configuration.
    pub fn validate(&self) -> Result<()> {
        self.collector.validate()?;
        self.aggregator.validate()?;
        self.escalation.validate()?;
        self.explain.validate()?;
        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(TribunalError::Config(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )))
    }
}

fn check_nonzero(name: &str, value: u64) -> Result<()> {
    if value == 0 {
        Err(TribunalError::Config(format!("{} must be greater than zero", name)))
    } else {
        Ok(())
    }
}

/// Collector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Timeout per critic (ms)
    pub timeout_per_critic_ms: u64,
    /// Maximum critics evaluated at once
    pub max_concurrent: usize,
    /// Per-critic timings kept for observability
    pub timing_history: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            timeout_per_critic_ms: 5_000,
            max_concurrent: 16,
            timing_history: 1_000,
        }
    }
}

impl CollectorConfig {
    fn validate(&self) -> Result<()> {
        check_nonzero("collector.timeout_per_critic_ms", self.timeout_per_critic_ms)?;
        check_nonzero("collector.max_concurrent", self.max_concurrent as u64)?;
        Ok(())
    }
}

/// Aggregator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Weight per critic; missing critics weigh 1.0
    pub critic_weights: BTreeMap<String, f64>,
    /// Escalate when dissent exceeds this
    pub escalation_threshold: f64,
    /// Escalate when confidence falls below this
    pub min_confidence: f64,
    /// Conservative order used to break ties, most conservative first
    pub tie_break_order: Vec<Verdict>,
    /// Weights closer than this are tied
    pub tie_epsilon: f64,
    /// Risk flag that forces review
    pub mandatory_review_flag: String,
    /// Precedents to retrieve
    pub precedent_top_k: usize,
    /// Minimum precedent similarity
    pub precedent_min_similarity: f64,
    /// Similarity above which a disagreeing precedent is a conflict
    pub precedent_conflict_similarity: f64,
    /// Added to dissent on precedent conflict
    pub precedent_conflict_penalty: f64,
    /// Precedent lookup timeout (ms)
    pub precedent_timeout_ms: u64,
    /// Precedent search strategy
    pub precedent_search_mode: SearchMode,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            critic_weights: BTreeMap::new(),
            escalation_threshold: 0.4,
            min_confidence: 0.5,
            tie_break_order: vec![
                Verdict::Deny,
                Verdict::Escalate,
                Verdict::Abstain,
                Verdict::Allow,
            ],
            tie_epsilon: 1e-6,
            mandatory_review_flag: evidence::MANDATORY_REVIEW_FLAG.to_string(),
            precedent_top_k: 5,
            precedent_min_similarity: 0.5,
            precedent_conflict_similarity: 0.85,
            precedent_conflict_penalty: 0.15,
            precedent_timeout_ms: 2_000,
            precedent_search_mode: SearchMode::Hybrid,
        }
    }
}

impl AggregatorConfig {
    /// Configured weight for a critic.
    pub fn critic_weight(&self, critic_name: &str) -> f64 {
        self.critic_weights.get(critic_name).copied().unwrap_or(1.0)
    }

    fn validate(&self) -> Result<()> {
        for (name, weight) in &self.critic_weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(TribunalError::Config(format!(
                    "critic weight for {} must be finite and non-negative, got {}",
                    name, weight
                )));
            }
        }

        check_unit("aggregator.escalation_threshold", self.escalation_threshold)?;
        check_unit("aggregator.min_confidence", self.min_confidence)?;
        check_unit("aggregator.precedent_min_similarity", self.precedent_min_similarity)?;
        check_unit("aggregator.precedent_conflict_similarity", self.precedent_conflict_similarity)?;
        check_unit("aggregator.precedent_conflict_penalty", self.precedent_conflict_penalty)?;
        check_nonzero("aggregator.precedent_timeout_ms", self.precedent_timeout_ms)?;

        if !self.tie_epsilon.is_finite() || self.tie_epsilon < 0.0 {
            return Err(TribunalError::Config(format!(
                "aggregator.tie_epsilon must be finite and non-negative, got {}",
                self.tie_epsilon
            )));
        }

        let order: BTreeSet<Verdict> = self.tie_break_order.iter().copied().collect();
        let voting: BTreeSet<Verdict> = Verdict::VOTING.iter().copied().collect();
        if order != voting || self.tie_break_order.len() != Verdict::VOTING.len() {
            return Err(TribunalError::Config(format!(
                "aggregator.tie_break_order must list ALLOW, DENY, ESCALATE and ABSTAIN exactly once, got {:?}",
                self.tie_break_order
            )));
        }

        if self.mandatory_review_flag.is_empty() {
            return Err(TribunalError::Config(
                "aggregator.mandatory_review_flag must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Escalation configuration.
///
/// Priority bands: HIGH when dissent exceeds `high_dissent` or confidence
/// falls below `high_low_confidence`; MEDIUM for the looser band; LOW
/// otherwise. CRITICAL is reserved for mandatory critic failures and
/// critical risk flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Dissent above which priority is HIGH
    pub high_dissent: f64,
    /// Confidence below which priority is HIGH
    pub high_low_confidence: f64,
    /// Dissent above which priority is MEDIUM
    pub medium_dissent: f64,
    /// Confidence below which priority is MEDIUM
    pub medium_low_confidence: f64,
    /// Risk flags that make an escalation CRITICAL
    pub critical_flags: Vec<String>,
    /// Similar precedents to attach
    pub similar_precedents: usize,
    /// Minimum similarity for an attached precedent
    pub similar_min_similarity: f64,
    /// Queue size above which resolved bundles are evicted
    pub max_pending: usize,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            high_dissent: 0.6,
            high_low_confidence: 0.3,
            medium_dissent: 0.3,
            medium_low_confidence: 0.6,
            critical_flags: vec!["safety_critical".to_string()],
            similar_precedents: 3,
            similar_min_similarity: 0.3,
            max_pending: 10_000,
        }
    }
}

impl EscalationConfig {
    fn validate(&self) -> Result<()> {
        check_unit("escalation.high_dissent", self.high_dissent)?;
        check_unit("escalation.high_low_confidence", self.high_low_confidence)?;
        check_unit("escalation.medium_dissent", self.medium_dissent)?;
        check_unit("escalation.medium_low_confidence", self.medium_low_confidence)?;
        check_unit("escalation.similar_min_similarity", self.similar_min_similarity)?;

        if self.medium_dissent > self.high_dissent {
            return Err(TribunalError::Config(
                "escalation.medium_dissent must not exceed escalation.high_dissent".to_string(),
            ));
        }
        if self.medium_low_confidence < self.high_low_confidence {
            return Err(TribunalError::Config(
                "escalation.medium_low_confidence must not be below escalation.high_low_confidence"
                    .to_string(),
            ));
        }
        check_nonzero("escalation.max_pending", self.max_pending as u64)?;
        Ok(())
    }
}

/// Explainability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainConfig {
    /// Maximum counterfactuals returned
    pub max_counterfactuals: usize,
    /// Maximum critics changed in one counterfactual
    pub max_changes: usize,
    /// Counterfactual search deadline (ms)
    pub timeout_ms: u64,
    /// Base importance per critic and feature
    pub attribution_base: f64,
    /// Bonus when the justification mentions the feature
    pub attribution_mention_bonus: f64,
    /// Attribution cache capacity
    pub cache_capacity: usize,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            max_counterfactuals: 3,
            max_changes: 3,
            timeout_ms: 1_000,
            attribution_base: 0.1,
            attribution_mention_bonus: 0.4,
            cache_capacity: 4_096,
        }
    }
}

impl ExplainConfig {
    fn validate(&self) -> Result<()> {
        check_nonzero("explain.max_counterfactuals", self.max_counterfactuals as u64)?;
        check_nonzero("explain.max_changes", self.max_changes as u64)?;
        check_nonzero("explain.timeout_ms", self.timeout_ms)?;
        for (name, value) in [
            ("explain.attribution_base", self.attribution_base),
            ("explain.attribution_mention_bonus", self.attribution_mention_bonus),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(TribunalError::Config(format!(
                    "{} must be finite and non-negative, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// General configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable the decision audit log
    pub audit_enabled: bool,
    /// Maximum audit entries retained
    pub audit_max_entries: usize,
    /// Create escalation bundles automatically on evaluate
    pub auto_escalate: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            audit_enabled: true,
            audit_max_entries: 10_000,
            auto_escalate: true,
        }
    }
}
