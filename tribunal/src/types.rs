//! Error types for the tribunal pipeline.
//!
//! Critic failures and precedent-store outages never surface here; they are
//! carried as data on evidence bundles and decisions. These errors cover
//! startup configuration and misuse of the escalation and explain APIs.

use critic::RegistryError;
use evidence::PrecedentError;

/// Tribunal error.
#[derive(Debug, thiserror::Error)]
pub enum TribunalError {
    /// Configuration error (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Decision does not require escalation
    #[error("Decision for case {0} does not require escalation")]
    EscalationNotRequired(String),

    /// Escalation bundle not found
    #[error("Escalation bundle not found: {0}")]
    EscalationNotFound(String),

    /// Escalation bundle already resolved
    #[error("Escalation bundle already resolved: {0}")]
    AlreadyResolved(String),

    /// Reviewer feedback is malformed
    #[error("Invalid feedback: {0}")]
    InvalidFeedback(String),

    /// Decision carries no evidence
    #[error("Decision for case {0} has no evidence")]
    NoEvidence(String),

    /// Counterfactual does not apply to the decision
    #[error("Invalid counterfactual: {0}")]
    InvalidCounterfactual(String),

    /// Critic registry error
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Precedent store error
    #[error("Precedent error: {0}")]
    Precedent(#[from] PrecedentError),
}

pub type Result<T> = std::result::Result<T, TribunalError>;
