//! Rule-based critic matching keywords in the case prompt.

use async_trait::async_trait;
use std::time::Instant;

use evidence::{CaseInput, EvidenceBundle, Verdict};

use crate::traits::{Critic, CriticError};

/// A keyword rule.
#[derive(Debug, Clone)]
pub struct KeywordRule {
    /// Lowercase keyword to look for
    pub keyword: String,
    /// Verdict when the keyword is present
    pub verdict: Verdict,
    /// Confidence when the keyword is present
    pub confidence: f64,
    /// Risk flags raised on match
    pub risk_flags: Vec<String>,
}

impl KeywordRule {
    /// Create a new rule.
    pub fn new(keyword: impl Into<String>, verdict: Verdict, confidence: f64) -> Self {
        Self {
            keyword: keyword.into().to_lowercase(),
            verdict,
            confidence: confidence.clamp(0.0, 1.0),
            risk_flags: Vec::new(),
        }
    }

    /// Raise a risk flag on match.
    pub fn with_risk_flag(mut self, flag: impl Into<String>) -> Self {
        self.risk_flags.push(flag.into());
        self
    }
}

/// Critic that applies keyword rules in order; the first match wins.
pub struct KeywordCritic {
    name: String,
    rules: Vec<KeywordRule>,
    default_verdict: Verdict,
    default_confidence: f64,
}

impl KeywordCritic {
    /// Create a critic that abstains when nothing matches.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
            default_verdict: Verdict::Abstain,
            default_confidence: 0.5,
        }
    }

    /// Add a rule.
    pub fn with_rule(mut self, rule: KeywordRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Set the verdict used when no rule matches.
    pub fn with_default(mut self, verdict: Verdict, confidence: f64) -> Self {
        self.default_verdict = verdict;
        self.default_confidence = confidence.clamp(0.0, 1.0);
        self
    }
}

#[async_trait]
impl Critic for KeywordCritic {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, input: &CaseInput) -> Result<EvidenceBundle, CriticError> {
        let start = Instant::now();
        let prompt = input.prompt.to_lowercase();

        let bundle = match self.rules.iter().find(|r| prompt.contains(&r.keyword)) {
            Some(rule) => {
                let mut bundle = EvidenceBundle::new(&self.name, rule.verdict, rule.confidence, input)
                    .with_justification(format!("Prompt mentions '{}'", rule.keyword))
                    .with_sub_verdict(rule.keyword.clone(), rule.verdict, rule.confidence);
                for flag in &rule.risk_flags {
                    bundle = bundle.with_risk_flag(flag.clone());
                }
                bundle
            }
            None => EvidenceBundle::new(&self.name, self.default_verdict, self.default_confidence, input)
                .with_justification("No keyword rule matched"),
        };

        Ok(bundle.with_execution_time(start.elapsed().as_millis() as u64))
    }
}
