//! Tribunal - critic-panel decision aggregation and escalation.
//!
//! A case is evaluated by a panel of independent critics. Their evidence is
//! reduced to one governed decision with a dissent measure, checked against
//! precedent, routed to human review when consensus is weak, and explained
//! after the fact.
//!
//! - **Evidence collection**: concurrent critics with per-critic timeouts
//! - **Aggregation**: confidence-weighted voting, dissent, precedent conflicts
//! - **Escalation**: prioritized review queue with reviewer feedback hooks
//! - **Explainability**: counterfactual search and heuristic attribution
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Tribunal                          │
//! │                                                          │
//! │  ┌───────────┐   ┌────────────┐   ┌───────────────────┐  │
//! │  │ Collector │──▶│ Aggregator │──▶│ EscalationManager │  │
//! │  └───────────┘   └─────┬──────┘   └─────────┬─────────┘  │
//! │                        │                    │            │
//! │                  ┌─────▼────────────────────▼─┐          │
//! │                  │       PrecedentStore       │          │
//! │                  └────────────────────────────┘          │
//! │                                                          │
//! │  Decision ──▶ AuditLog           Decision ──▶ Explainer  │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod aggregator;
pub mod audit;
pub mod collector;
pub mod config;
pub mod escalation;
pub mod explain;
pub mod tribunal;
pub mod types;

// Re-export main types
pub use aggregator::{tally, Aggregator, VoteTally};
pub use audit::{AuditEntry, AuditLog, AuditStats};
pub use collector::{CollectorStats, CriticTiming, EvidenceCollector};
pub use config::TribunalConfig;
pub use escalation::{
    EscalationBundle, EscalationManager, EscalationPriority, EscalationStats, EscalationStatus,
    FeedbackAck, FeedbackHook, PrecedentPromotionHook, QueueFilter, QueueSort, ReviewerFeedback,
};
pub use explain::{
    AttributionEngine, AttributionReport, ChangedFactor, CounterfactualEngine, CounterfactualMode,
    CounterfactualReport, CounterfactualResult, ExplainabilityEngine, Explanation,
    ExplanationMethod, ExplanationRequest, FeatureAttribution,
};
pub use tribunal::{Tribunal, TribunalBuilder};
pub use types::{Result, TribunalError};
