//! The tribunal facade.
//!
//! Wires the collector, aggregator, escalation manager, explainability
//! engine and audit log around one critic registry and an optional
//! precedent store:
//!
//! ```text
//! CaseInput ─▶ collect ─▶ aggregate ─▶ audit ─▶ escalate (if required)
//! ```

use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use critic::{Critic, CriticMetadata, CriticRegistry};
use evidence::{CaseInput, Decision, Precedent, PrecedentStore};

use crate::aggregator::Aggregator;
use crate::audit::AuditLog;
use crate::collector::{CollectorStats, EvidenceCollector};
use crate::config::TribunalConfig;
use crate::escalation::{
    EscalationBundle, EscalationManager, EscalationStats, FeedbackAck, FeedbackHook, QueueFilter,
    QueueSort, ReviewerFeedback,
};
use crate::explain::{ExplainabilityEngine, Explanation, ExplanationRequest};
use crate::types::{Result, TribunalError};

/// Critic-panel decision pipeline.
pub struct Tribunal {
    config: TribunalConfig,
    registry: Arc<CriticRegistry>,
    collector: EvidenceCollector,
    aggregator: Aggregator,
    escalation: EscalationManager,
    explainer: ExplainabilityEngine,
    audit: AuditLog,
    precedents: Option<Arc<dyn PrecedentStore>>,
}

impl Tribunal {
    /// Create a builder.
    pub fn builder() -> TribunalBuilder {
        TribunalBuilder::new()
    }

    /// Get the configuration.
    pub fn config(&self) -> &TribunalConfig {
        &self.config
    }

    /// The critic registry. Critics may be enabled, disabled and
    /// re-weighted at runtime.
    pub fn registry(&self) -> &CriticRegistry {
        &self.registry
    }

    /// The decision audit log.
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// The explainability engine.
    pub fn explainer(&self) -> &ExplainabilityEngine {
        &self.explainer
    }

    /// Evaluate a case with every enabled critic.
    ///
    /// Critic failures and precedent-store outages are absorbed into the
    /// decision. Only an empty panel is an error.
    pub async fn evaluate(&self, input: &CaseInput) -> Result<Decision> {
        let start = Instant::now();

        let critics = self.registry.enabled().await;
        if critics.is_empty() {
            return Err(TribunalError::NoEvidence(input.case_id.clone()));
        }

        let mut bundles = self.collector.collect_default(input, &critics).await;

        // A failed mandatory critic always sends the case to review
        for (registered, bundle) in critics.iter().zip(bundles.iter_mut()) {
            if registered.metadata.mandatory && bundle.verdict.is_error() {
                warn!(critic = %registered.name(), case_id = %input.case_id, "Mandatory critic failed");
                bundle
                    .risk_flags
                    .insert(self.config.aggregator.mandatory_review_flag.clone());
            }
        }

        let base_weights = self.registry.weights().await;
        let mut decision = self.aggregator.aggregate_weighted(bundles, &base_weights).await?;
        decision.execution_time_ms = start.elapsed().as_millis() as u64;

        if self.config.general.audit_enabled {
            decision.audit_log_id = Some(self.audit.record(&decision).await);
        }

        if decision.requires_escalation && self.config.general.auto_escalate {
            let bundle = self.escalate(&decision).await?;
            decision.escalation_ref = Some(bundle.bundle_id);
        }

        info!(
            case_id = %decision.case_id,
            final_verdict = %decision.final_verdict,
            confidence = decision.confidence,
            dissent_index = decision.dissent_index,
            requires_escalation = decision.requires_escalation,
            duration_ms = decision.execution_time_ms,
            "Case evaluated"
        );

        Ok(decision)
    }

    /// Explain a decision.
    pub fn explain(&self, decision: &Decision, request: &ExplanationRequest) -> Result<Explanation> {
        self.explainer.explain(decision, request)
    }

    /// Create or update the escalation bundle for a decision.
    pub async fn escalate(&self, decision: &Decision) -> Result<EscalationBundle> {
        let mandatory = self.registry.mandatory().await;
        self.escalation.create_escalation(decision, &mandatory).await
    }

    /// Pending and resolved escalations.
    pub async fn review_queue(
        &self,
        filter: QueueFilter,
        sort: QueueSort,
        limit: Option<usize>,
    ) -> Vec<EscalationBundle> {
        self.escalation.review_queue(filter, sort, limit).await
    }

    /// Resolve an escalation with reviewer feedback.
    pub async fn submit_feedback(&self, bundle_id: &str, feedback: ReviewerFeedback) -> Result<FeedbackAck> {
        self.escalation.submit_feedback(bundle_id, feedback).await
    }

    /// Escalation bundle for a case.
    pub async fn escalation_for(&self, case_id: &str) -> Option<EscalationBundle> {
        self.escalation.get_by_case(case_id).await
    }

    /// Escalation queue statistics.
    pub async fn escalation_stats(&self) -> EscalationStats {
        self.escalation.stats().await
    }

    /// Collector statistics.
    pub async fn collector_stats(&self) -> CollectorStats {
        self.collector.stats().await
    }

    /// Promote a finalized decision to a precedent; returns the precedent ID.
    pub async fn promote_precedent(&self, decision: &Decision) -> Result<String> {
        let store = self.precedents.as_ref().ok_or_else(|| {
            TribunalError::Config("No precedent store configured".to_string())
        })?;
        let precedent = Precedent::from_decision(decision)?;
        let precedent_id = store.append(precedent).await?;

        info!(
            case_id = %decision.case_id,
            precedent_id = %precedent_id,
            "Decision promoted to precedent"
        );
        Ok(precedent_id)
    }
}

/// Builder for a [`Tribunal`].
pub struct TribunalBuilder {
    config: TribunalConfig,
    registry: Option<Arc<CriticRegistry>>,
    critics: Vec<(Arc<dyn Critic>, CriticMetadata)>,
    hooks: Vec<Arc<dyn FeedbackHook>>,
    precedents: Option<Arc<dyn PrecedentStore>>,
}

impl TribunalBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: TribunalConfig::default(),
            registry: None,
            critics: Vec::new(),
            hooks: Vec::new(),
            precedents: None,
        }
    }

    /// Set the configuration.
    pub fn config(mut self, config: TribunalConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an existing critic registry.
    pub fn registry(mut self, registry: Arc<CriticRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Add a critic.
    pub fn with_critic(mut self, critic: Arc<dyn Critic>, metadata: CriticMetadata) -> Self {
        self.critics.push((critic, metadata));
        self
    }

    /// Add a feedback hook.
    pub fn with_hook(mut self, hook: Arc<dyn FeedbackHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Set the precedent store.
    pub fn precedent_store(mut self, store: Arc<dyn PrecedentStore>) -> Self {
        self.precedents = Some(store);
        self
    }

    /// Build the tribunal. Fails on invalid configuration or critic
    /// registration.
    pub async fn build(self) -> Result<Tribunal> {
        self.config.validate()?;

        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(CriticRegistry::new()));
        for (critic, metadata) in self.critics {
            registry.register(critic, metadata).await?;
        }
        if registry.is_empty().await {
            warn!("Tribunal built without critics; evaluations will fail until one is registered");
        }

        let aggregator_config = self.config.aggregator.clone();
        let mut aggregator = Aggregator::with_config(aggregator_config.clone());
        let mut escalation = EscalationManager::with_config(self.config.escalation.clone())
            .with_tie_policy(
                aggregator_config.tie_break_order.clone(),
                aggregator_config.tie_epsilon,
            );
        if let Some(store) = &self.precedents {
            aggregator = aggregator.with_precedent_store(Arc::clone(store));
            escalation = escalation.with_precedent_store(Arc::clone(store));
        }
        for hook in self.hooks {
            escalation.add_hook(hook).await;
        }

        let tribunal = Tribunal {
            collector: EvidenceCollector::with_config(self.config.collector.clone()),
            aggregator,
            escalation,
            explainer: ExplainabilityEngine::with_config(self.config.explain.clone(), &aggregator_config),
            audit: AuditLog::with_max_entries(self.config.general.audit_max_entries),
            registry,
            precedents: self.precedents,
            config: self.config,
        };

        info!(
            critics = tribunal.registry.len().await,
            precedent_store = tribunal.precedents.is_some(),
            "Tribunal initialized"
        );
        Ok(tribunal)
    }
}

impl Default for TribunalBuilder {
    fn default() -> Self {
        Self::new()
    }
}
