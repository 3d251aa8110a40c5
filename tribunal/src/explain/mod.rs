//! Post-hoc explanations of finalized decisions.
//!
//! Two methods are offered: counterfactual search ("what would flip this")
//! and heuristic feature attribution. Both work only from the decision and
//! its evidence; critics are never called again.

pub mod attribution;
pub mod counterfactual;

pub use attribution::{AttributionEngine, AttributionReport, FeatureAttribution};
pub use counterfactual::{
    ChangedFactor, CounterfactualEngine, CounterfactualMode, CounterfactualReport,
    CounterfactualResult,
};

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use evidence::Decision;

use crate::config::{AggregatorConfig, ExplainConfig};
use crate::types::{Result, TribunalError};

/// Explanation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationMethod {
    Counterfactual,
    Attribution,
}

impl FromStr for ExplanationMethod {
    type Err = TribunalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "counterfactual" => Ok(Self::Counterfactual),
            "attribution" => Ok(Self::Attribution),
            _ => Err(TribunalError::Config(format!("Unknown explanation method: {}", s))),
        }
    }
}

/// Options for one explanation. Unset limits fall back to configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationRequest {
    /// Method
    pub method: ExplanationMethod,
    /// Counterfactual mode
    #[serde(default)]
    pub mode: CounterfactualMode,
    /// Maximum counterfactuals
    #[serde(default)]
    pub max_counterfactuals: Option<usize>,
    /// Maximum critics changed per counterfactual
    #[serde(default)]
    pub max_changes: Option<usize>,
    /// Search deadline (ms)
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ExplanationRequest {
    /// Request a counterfactual search.
    pub fn counterfactual(mode: CounterfactualMode) -> Self {
        Self {
            method: ExplanationMethod::Counterfactual,
            mode,
            max_counterfactuals: None,
            max_changes: None,
            timeout_ms: None,
        }
    }

    /// Request feature attribution.
    pub fn attribution() -> Self {
        Self {
            method: ExplanationMethod::Attribution,
            ..Self::counterfactual(CounterfactualMode::default())
        }
    }

    /// Limit the number of counterfactuals.
    pub fn with_max_counterfactuals(mut self, max: usize) -> Self {
        self.max_counterfactuals = Some(max);
        self
    }

    /// Limit the critics changed per counterfactual.
    pub fn with_max_changes(mut self, max: usize) -> Self {
        self.max_changes = Some(max);
        self
    }

    /// Set the search deadline.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Explanation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Explanation {
    Counterfactual(CounterfactualReport),
    Attribution(AttributionReport),
}

/// Produces explanations for decisions.
pub struct ExplainabilityEngine {
    config: ExplainConfig,
    counterfactual: CounterfactualEngine,
    attribution: AttributionEngine,
}

impl ExplainabilityEngine {
    /// Create a new engine with default configuration.
    pub fn new() -> Self {
        Self::with_config(ExplainConfig::default(), &AggregatorConfig::default())
    }

    /// Create with custom configuration. Counterfactuals replay the vote
    /// with the aggregator's tie policy.
    pub fn with_config(config: ExplainConfig, aggregator: &AggregatorConfig) -> Self {
        let counterfactual =
            CounterfactualEngine::new(aggregator.tie_break_order.clone(), aggregator.tie_epsilon);
        let attribution = AttributionEngine::with_config(&config);
        Self {
            config,
            counterfactual,
            attribution,
        }
    }

    /// The counterfactual engine, for replay and validity checks.
    pub fn counterfactuals(&self) -> &CounterfactualEngine {
        &self.counterfactual
    }

    /// The attribution engine.
    pub fn attributions(&self) -> &AttributionEngine {
        &self.attribution
    }

    /// Explain a decision.
    pub fn explain(&self, decision: &Decision, request: &ExplanationRequest) -> Result<Explanation> {
        if decision.evidence.is_empty() {
            return Err(TribunalError::NoEvidence(decision.case_id.clone()));
        }

        match request.method {
            ExplanationMethod::Counterfactual => {
                let max_counterfactuals = request
                    .max_counterfactuals
                    .unwrap_or(self.config.max_counterfactuals);
                let max_changes = request.max_changes.unwrap_or(self.config.max_changes);
                let timeout = Duration::from_millis(request.timeout_ms.unwrap_or(self.config.timeout_ms));

                Ok(Explanation::Counterfactual(self.counterfactual.search(
                    decision,
                    request.mode,
                    max_counterfactuals,
                    max_changes,
                    timeout,
                )))
            }
            ExplanationMethod::Attribution => {
                Ok(Explanation::Attribution(self.attribution.attribute(decision)))
            }
        }
    }
}

impl Default for ExplainabilityEngine {
    fn default() -> Self {
        Self::new()
    }
}
