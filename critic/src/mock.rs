//! Mock critic for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use evidence::{CaseInput, EvidenceBundle, Verdict};

use crate::traits::{Critic, CriticError};

/// How the mock misbehaves, if at all.
#[derive(Debug, Clone, PartialEq)]
enum Behavior {
    /// Return the configured bundle
    Normal,
    /// Return an error
    Fail(String),
    /// Return a bundle with this (possibly invalid) confidence
    RawConfidence(f64),
    /// Return a bundle attributed to another critic
    WrongName(String),
    /// Panic inside evaluate
    Panic,
}

/// Mock critic for testing.
///
/// Configurable verdict, confidence, delay and failure behaviour.
pub struct MockCritic {
    name: String,
    verdict: Verdict,
    confidence: f64,
    justification: String,
    risk_flags: Vec<String>,
    delay: Option<Duration>,
    behavior: Behavior,
    call_count: AtomicU32,
}

impl MockCritic {
    /// Create a new mock critic.
    pub fn new(name: impl Into<String>, verdict: Verdict, confidence: f64) -> Self {
        let name = name.into();
        Self {
            justification: format!("{} returned {}", name, verdict),
            name,
            verdict,
            confidence,
            risk_flags: Vec::new(),
            delay: None,
            behavior: Behavior::Normal,
            call_count: AtomicU32::new(0),
        }
    }

    /// Set the justification.
    pub fn with_justification(mut self, justification: impl Into<String>) -> Self {
        self.justification = justification.into();
        self
    }

    /// Add a risk flag to every bundle.
    pub fn with_risk_flag(mut self, flag: impl Into<String>) -> Self {
        self.risk_flags.push(flag.into());
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every evaluation.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.behavior = Behavior::Fail(message.into());
        self
    }

    /// Return bundles with an unchecked confidence value.
    pub fn with_raw_confidence(mut self, confidence: f64) -> Self {
        self.behavior = Behavior::RawConfidence(confidence);
        self
    }

    /// Return bundles attributed to another critic name.
    pub fn with_wrong_name(mut self, name: impl Into<String>) -> Self {
        self.behavior = Behavior::WrongName(name.into());
        self
    }

    /// Panic on every evaluation.
    pub fn panicking(mut self) -> Self {
        self.behavior = Behavior::Panic;
        self
    }

    /// Get the number of times evaluate was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Critic for MockCritic {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, input: &CaseInput) -> Result<EvidenceBundle, CriticError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let (name, confidence) = match &self.behavior {
            Behavior::Normal => (self.name.clone(), self.confidence),
            Behavior::Fail(message) => return Err(CriticError::EvaluationFailed(message.clone())),
            Behavior::RawConfidence(raw) => (self.name.clone(), *raw),
            Behavior::WrongName(other) => (other.clone(), self.confidence),
            Behavior::Panic => panic!("mock critic {} panicked", self.name),
        };

        let mut bundle = EvidenceBundle::new(name, self.verdict, confidence, input)
            .with_justification(self.justification.clone());
        for flag in &self.risk_flags {
            bundle = bundle.with_risk_flag(flag.clone());
        }
        Ok(bundle)
    }
}
