//! Core trait for critics.
//!
//! This module defines the `Critic` trait - the single capability
//! interface over heterogeneous evaluator implementations.

use async_trait::async_trait;

use evidence::{CaseInput, EvidenceBundle};

/// Error types for critic evaluation.
#[derive(Debug, thiserror::Error)]
pub enum CriticError {
    /// Critic gave up waiting on its own dependencies
    #[error("Critic timed out after {0}ms")]
    Timeout(u64),

    /// Critic is not available
    #[error("Critic unavailable: {0}")]
    Unavailable(String),

    /// Critic produced output it could not shape into a bundle
    #[error("Malformed output: {0}")]
    MalformedOutput(String),

    /// Evaluation failed
    #[error("Evaluation failed: {0}")]
    EvaluationFailed(String),
}

/// Core trait for critics.
///
/// Implementations must be safe to call concurrently and must not share
/// mutable state with other critics. A critic is a black box: the tribunal
/// only sees the returned bundle or error.
#[async_trait]
pub trait Critic: Send + Sync {
    /// Get the critic name. Must match the `critic_name` of every bundle it
    /// returns.
    fn name(&self) -> &str;

    /// Evaluate a case.
    async fn evaluate(&self, input: &CaseInput) -> Result<EvidenceBundle, CriticError>;
}
