//! Escalation management.
//!
//! Packages decisions that need human review into escalation bundles,
//! keeps them in a prioritized review queue and resolves them from reviewer
//! feedback. Creation is idempotent per case: re-escalating a case updates
//! its pending bundle instead of adding another.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use evidence::{
    Decision, DisagreementType, EscalationTrigger, EvidenceBundle, Precedent, PrecedentMatch,
    PrecedentQuery, PrecedentStore, Verdict, SCHEMA_VERSION,
};

use crate::aggregator::tally;
use crate::config::{AggregatorConfig, EscalationConfig};
use crate::types::{Result, TribunalError};

/// Priority of an escalation bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl EscalationPriority {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Status of an escalation bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    /// Waiting for a reviewer
    Pending,
    /// Reviewer feedback received
    Resolved,
}

/// Feedback submitted by a human reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewerFeedback {
    /// Reviewer's verdict
    pub verdict: Verdict,
    /// Reviewer's confidence (0.0 - 1.0)
    pub confidence: f64,
    /// Reasoning
    pub reasoning: String,
    /// Reviewer identity
    #[serde(default)]
    pub reviewer_id: Option<String>,
}

impl ReviewerFeedback {
    /// Create new feedback.
    pub fn new(verdict: Verdict, confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            verdict,
            confidence,
            reasoning: reasoning.into(),
            reviewer_id: None,
        }
    }

    /// Set the reviewer.
    pub fn with_reviewer(mut self, reviewer_id: impl Into<String>) -> Self {
        self.reviewer_id = Some(reviewer_id.into());
        self
    }

    fn validate(&self) -> Result<()> {
        if self.verdict.is_error() {
            return Err(TribunalError::InvalidFeedback(
                "Reviewer verdict cannot be ERROR".to_string(),
            ));
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(TribunalError::InvalidFeedback(format!(
                "Confidence out of range: {}",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// A decision packaged for human review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationBundle {
    /// Bundle ID
    pub bundle_id: String,
    /// Schema version
    pub version: String,
    /// Case under review
    pub case_id: String,
    /// Review priority
    pub priority: EscalationPriority,
    /// Dissent index of the decision
    pub dissent_index: f64,
    /// Confidence of the decision
    pub confidence: f64,
    /// Shape of the disagreement
    pub disagreement_type: DisagreementType,
    /// Verdict the panel reached
    pub majority_verdict: Verdict,
    /// Count share of critics behind the majority
    pub split_ratio: f64,
    /// Related precedents
    pub similar_precedents: Vec<PrecedentMatch>,
    /// Short account of the strongest evidence
    pub explanation_summary: String,
    /// Why the decision was escalated
    pub escalation_triggers: Vec<EscalationTrigger>,
    /// The escalated decision
    pub decision: Decision,
    /// Status
    pub status: EscalationStatus,
    /// Reviewer feedback, once resolved
    pub resolution: Option<ReviewerFeedback>,
    /// When the bundle was created
    pub created_at: DateTime<Utc>,
    /// When the bundle last changed
    pub updated_at: DateTime<Utc>,
    /// When the bundle was resolved
    pub resolved_at: Option<DateTime<Utc>>,
    /// Fields from newer schema versions, preserved verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl EscalationBundle {
    /// Whether the bundle is awaiting review.
    pub fn is_pending(&self) -> bool {
        self.status == EscalationStatus::Pending
    }
}

/// Review queue filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueFilter {
    /// Every bundle
    #[default]
    All,
    /// Pending bundles
    Pending,
    /// Resolved bundles
    Resolved,
    /// Pending CRITICAL bundles
    Critical,
    /// Pending HIGH or CRITICAL bundles
    HighPriority,
}

impl QueueFilter {
    fn matches(&self, bundle: &EscalationBundle) -> bool {
        match self {
            Self::All => true,
            Self::Pending => bundle.is_pending(),
            Self::Resolved => bundle.status == EscalationStatus::Resolved,
            Self::Critical => bundle.is_pending() && bundle.priority == EscalationPriority::Critical,
            Self::HighPriority => bundle.is_pending() && bundle.priority >= EscalationPriority::High,
        }
    }
}

impl FromStr for QueueFilter {
    type Err = TribunalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(Self::All),
            "pending" => Ok(Self::Pending),
            "resolved" => Ok(Self::Resolved),
            "critical" => Ok(Self::Critical),
            "high_priority" => Ok(Self::HighPriority),
            other => Err(TribunalError::Config(format!("Unknown queue filter: {}", other))),
        }
    }
}

/// Review queue ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueSort {
    /// Highest priority first, then highest dissent
    #[default]
    PriorityDesc,
    /// Highest dissent first, then highest priority
    DissentDesc,
    /// Oldest first
    CreatedAsc,
}

impl FromStr for QueueSort {
    type Err = TribunalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "priority_desc" => Ok(Self::PriorityDesc),
            "dissent_desc" => Ok(Self::DissentDesc),
            "created_asc" => Ok(Self::CreatedAsc),
            other => Err(TribunalError::Config(format!("Unknown queue sort: {}", other))),
        }
    }
}

/// Acknowledgement of reviewer feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackAck {
    /// Resolved bundle
    pub bundle_id: String,
    /// Case of the bundle
    pub case_id: String,
    /// New status
    pub status: EscalationStatus,
    /// When the bundle was resolved
    pub resolved_at: DateTime<Utc>,
    /// Hooks that failed, with their errors
    pub hook_failures: Vec<String>,
}

/// Escalation queue statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EscalationStats {
    /// Bundles held
    pub total: usize,
    /// Pending bundles
    pub pending: usize,
    /// Resolved bundles
    pub resolved: usize,
    /// Pending bundles by priority
    pub pending_by_priority: BTreeMap<EscalationPriority, usize>,
    /// Bundles evicted to respect the queue bound
    pub evicted: u64,
}

/// Hook invoked when reviewer feedback resolves a bundle.
#[async_trait]
pub trait FeedbackHook: Send + Sync {
    /// Hook name, for logging.
    fn name(&self) -> &str;

    /// Called with the resolved bundle.
    async fn on_resolved(&self, bundle: &EscalationBundle) -> Result<()>;
}

/// Records reviewer-resolved cases as precedents.
pub struct PrecedentPromotionHook {
    store: Arc<dyn PrecedentStore>,
}

impl PrecedentPromotionHook {
    /// Create a hook appending to the given store.
    pub fn new(store: Arc<dyn PrecedentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl FeedbackHook for PrecedentPromotionHook {
    fn name(&self) -> &str {
        "precedent_promotion"
    }

    async fn on_resolved(&self, bundle: &EscalationBundle) -> Result<()> {
        let Some(feedback) = &bundle.resolution else {
            return Ok(());
        };
        let snapshot = bundle
            .decision
            .input_snapshot()
            .cloned()
            .ok_or_else(|| TribunalError::NoEvidence(bundle.case_id.clone()))?;

        let precedent_id = self
            .store
            .append(Precedent::new(snapshot, feedback.verdict, feedback.confidence))
            .await?;
        debug!(case_id = %bundle.case_id, precedent_id = %precedent_id, "Reviewer resolution promoted to precedent");
        Ok(())
    }
}

#[derive(Default)]
struct QueueState {
    /// Bundles by ID
    bundles: HashMap<String, EscalationBundle>,
    /// Case ID to bundle ID
    by_case: HashMap<String, String>,
    /// Bundle IDs in creation order
    order: VecDeque<String>,
    /// Evictions so far
    evicted: u64,
}

impl QueueState {
    fn remove(&mut self, bundle_id: &str) {
        if let Some(bundle) = self.bundles.remove(bundle_id) {
            self.by_case.remove(&bundle.case_id);
        }
        self.order.retain(|id| id != bundle_id);
        self.evicted += 1;
    }

    /// Drop the oldest resolved bundles until the queue fits. Pending
    /// bundles are never evicted; a queue full of them grows past `max`.
    fn enforce_bound(&mut self, max: usize) {
        while self.bundles.len() > max {
            let victim = self
                .order
                .iter()
                .find(|id| {
                    self.bundles
                        .get(*id)
                        .is_some_and(|b| b.status == EscalationStatus::Resolved)
                })
                .cloned();

            match victim {
                Some(id) => {
                    debug!(bundle_id = %id, "Escalation queue full, evicting resolved bundle");
                    self.remove(&id);
                }
                None => {
                    warn!(
                        pending = self.bundles.len(),
                        max_pending = max,
                        "Escalation queue over capacity with only pending bundles"
                    );
                    break;
                }
            }
        }
    }
}

/// Manages escalation bundles and the review queue.
pub struct EscalationManager {
    config: EscalationConfig,
    tie_order: Vec<Verdict>,
    tie_epsilon: f64,
    precedents: Option<Arc<dyn PrecedentStore>>,
    queue: Arc<RwLock<QueueState>>,
    hooks: Arc<RwLock<Vec<Arc<dyn FeedbackHook>>>>,
}

impl EscalationManager {
    /// Create a new escalation manager with default configuration.
    pub fn new() -> Self {
        Self::with_config(EscalationConfig::default())
    }

    /// Create with custom configuration.
    pub fn with_config(config: EscalationConfig) -> Self {
        let defaults = AggregatorConfig::default();
        Self {
            config,
            tie_order: defaults.tie_break_order,
            tie_epsilon: defaults.tie_epsilon,
            precedents: None,
            queue: Arc::new(RwLock::new(QueueState::default())),
            hooks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Tie policy used to name the dissenting verdict.
    pub fn with_tie_policy(mut self, tie_order: Vec<Verdict>, tie_epsilon: f64) -> Self {
        self.tie_order = tie_order;
        self.tie_epsilon = tie_epsilon;
        self
    }

    /// Re-consult a precedent store for similar cases.
    pub fn with_precedent_store(mut self, store: Arc<dyn PrecedentStore>) -> Self {
        self.precedents = Some(store);
        self
    }

    /// Register a feedback hook.
    pub async fn add_hook(&self, hook: Arc<dyn FeedbackHook>) {
        info!(hook = %hook.name(), "Feedback hook registered");
        self.hooks.write().await.push(hook);
    }

    /// Priority of a decision.
    ///
    /// CRITICAL when a mandatory critic returned ERROR or a critical risk
    /// flag is present; otherwise by the configured dissent and confidence
    /// bands.
    pub fn priority_for(&self, decision: &Decision, mandatory_critics: &BTreeSet<String>) -> EscalationPriority {
        let mandatory_failed = decision
            .evidence
            .iter()
            .any(|b| b.verdict.is_error() && mandatory_critics.contains(&b.critic_name));
        let critical_flag = self
            .config
            .critical_flags
            .iter()
            .any(|f| decision.has_flag(f));

        if mandatory_failed || critical_flag {
            EscalationPriority::Critical
        } else if decision.dissent_index > self.config.high_dissent
            || decision.confidence < self.config.high_low_confidence
        {
            EscalationPriority::High
        } else if decision.dissent_index > self.config.medium_dissent
            || decision.confidence < self.config.medium_low_confidence
        {
            EscalationPriority::Medium
        } else {
            EscalationPriority::Low
        }
    }

    /// Create or update the escalation bundle for a decision.
    ///
    /// Fails if the decision does not require escalation. A pending bundle
    /// for the same case is updated in place; a resolved one is returned
    /// unchanged.
    pub async fn create_escalation(
        &self,
        decision: &Decision,
        mandatory_critics: &BTreeSet<String>,
    ) -> Result<EscalationBundle> {
        if !decision.requires_escalation {
            return Err(TribunalError::EscalationNotRequired(decision.case_id.clone()));
        }

        let priority = self.priority_for(decision, mandatory_critics);
        let explanation_summary = self.summarize(decision);
        let similar_precedents = self.similar_precedents(decision).await;
        let now = Utc::now();

        let mut queue = self.queue.write().await;

        if let Some(existing_id) = queue.by_case.get(&decision.case_id).cloned() {
            if let Some(existing) = queue.bundles.get_mut(&existing_id) {
                if existing.status == EscalationStatus::Resolved {
                    debug!(bundle_id = %existing_id, case_id = %decision.case_id, "Case already resolved");
                    return Ok(existing.clone());
                }

                let mut stored = decision.clone();
                stored.escalation_ref = Some(existing_id.clone());

                existing.priority = priority;
                existing.dissent_index = decision.dissent_index;
                existing.confidence = decision.confidence;
                existing.disagreement_type = decision.disagreement_type;
                existing.majority_verdict = decision.final_verdict;
                existing.split_ratio = decision.split_ratio;
                existing.similar_precedents = similar_precedents;
                existing.explanation_summary = explanation_summary;
                existing.escalation_triggers = decision.escalation_triggers.clone();
                existing.decision = stored;
                existing.updated_at = now;

                info!(
                    bundle_id = %existing_id,
                    case_id = %decision.case_id,
                    priority = %priority.as_str(),
                    "Escalation updated"
                );
                return Ok(existing.clone());
            }
        }

        let bundle_id = uuid::Uuid::new_v4().to_string();
        let mut stored = decision.clone();
        stored.escalation_ref = Some(bundle_id.clone());

        let bundle = EscalationBundle {
            bundle_id: bundle_id.clone(),
            version: SCHEMA_VERSION.to_string(),
            case_id: decision.case_id.clone(),
            priority,
            dissent_index: decision.dissent_index,
            confidence: decision.confidence,
            disagreement_type: decision.disagreement_type,
            majority_verdict: decision.final_verdict,
            split_ratio: decision.split_ratio,
            similar_precedents,
            explanation_summary,
            escalation_triggers: decision.escalation_triggers.clone(),
            decision: stored,
            status: EscalationStatus::Pending,
            resolution: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
            extra: BTreeMap::new(),
        };

        queue.by_case.insert(bundle.case_id.clone(), bundle_id.clone());
        queue.order.push_back(bundle_id.clone());
        queue.bundles.insert(bundle_id.clone(), bundle.clone());
        queue.enforce_bound(self.config.max_pending);

        info!(
            bundle_id = %bundle_id,
            case_id = %bundle.case_id,
            priority = %priority.as_str(),
            dissent_index = bundle.dissent_index,
            "Escalation created"
        );

        Ok(bundle)
    }

    /// Submit reviewer feedback, resolving the bundle.
    pub async fn submit_feedback(&self, bundle_id: &str, feedback: ReviewerFeedback) -> Result<FeedbackAck> {
        feedback.validate()?;

        let resolved = {
            let mut queue = self.queue.write().await;
            let bundle = queue
                .bundles
                .get_mut(bundle_id)
                .ok_or_else(|| TribunalError::EscalationNotFound(bundle_id.to_string()))?;

            if bundle.status == EscalationStatus::Resolved {
                return Err(TribunalError::AlreadyResolved(bundle_id.to_string()));
            }

            let now = Utc::now();
            bundle.status = EscalationStatus::Resolved;
            bundle.resolution = Some(feedback);
            bundle.resolved_at = Some(now);
            bundle.updated_at = now;
            bundle.clone()
        };

        info!(
            bundle_id = %bundle_id,
            case_id = %resolved.case_id,
            reviewer = ?resolved.resolution.as_ref().and_then(|f| f.reviewer_id.as_deref()),
            "Escalation resolved"
        );

        let hooks = self.hooks.read().await.clone();
        let mut hook_failures = Vec::new();
        for hook in hooks {
            if let Err(e) = hook.on_resolved(&resolved).await {
                warn!(hook = %hook.name(), bundle_id = %bundle_id, error = %e, "Feedback hook failed");
                hook_failures.push(format!("{}: {}", hook.name(), e));
            }
        }

        Ok(FeedbackAck {
            bundle_id: resolved.bundle_id.clone(),
            case_id: resolved.case_id.clone(),
            status: resolved.status,
            resolved_at: resolved.resolved_at.unwrap_or(resolved.updated_at),
            hook_failures,
        })
    }

    /// Read-only view of the review queue.
    pub async fn review_queue(
        &self,
        filter: QueueFilter,
        sort: QueueSort,
        limit: Option<usize>,
    ) -> Vec<EscalationBundle> {
        let queue = self.queue.read().await;
        // Creation order; the sorts below are stable
        let mut bundles: Vec<EscalationBundle> = queue
            .order
            .iter()
            .filter_map(|id| queue.bundles.get(id))
            .filter(|b| filter.matches(b))
            .cloned()
            .collect();

        let by_created = |a: &EscalationBundle, b: &EscalationBundle| a.created_at.cmp(&b.created_at);
        let by_dissent = |a: &EscalationBundle, b: &EscalationBundle| {
            b.dissent_index
                .partial_cmp(&a.dissent_index)
                .unwrap_or(std::cmp::Ordering::Equal)
        };

        match sort {
            QueueSort::PriorityDesc => bundles.sort_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then_with(|| by_dissent(a, b))
                    .then_with(|| by_created(a, b))
            }),
            QueueSort::DissentDesc => bundles.sort_by(|a, b| {
                by_dissent(a, b)
                    .then_with(|| b.priority.cmp(&a.priority))
                    .then_with(|| by_created(a, b))
            }),
            QueueSort::CreatedAsc => bundles.sort_by(by_created),
        }

        if let Some(limit) = limit {
            bundles.truncate(limit);
        }
        bundles
    }

    /// Get a bundle by ID.
    pub async fn get(&self, bundle_id: &str) -> Option<EscalationBundle> {
        self.queue.read().await.bundles.get(bundle_id).cloned()
    }

    /// Get the bundle for a case.
    pub async fn get_by_case(&self, case_id: &str) -> Option<EscalationBundle> {
        let queue = self.queue.read().await;
        queue
            .by_case
            .get(case_id)
            .and_then(|id| queue.bundles.get(id))
            .cloned()
    }

    /// Get queue statistics.
    pub async fn stats(&self) -> EscalationStats {
        let queue = self.queue.read().await;
        let mut stats = EscalationStats {
            total: queue.bundles.len(),
            evicted: queue.evicted,
            ..Default::default()
        };

        for bundle in queue.bundles.values() {
            match bundle.status {
                EscalationStatus::Pending => {
                    stats.pending += 1;
                    *stats.pending_by_priority.entry(bundle.priority).or_insert(0) += 1;
                }
                EscalationStatus::Resolved => stats.resolved += 1,
            }
        }
        stats
    }

    /// Summary built from the two bundles pulling hardest for or against
    /// the dissenting verdict.
    fn summarize(&self, decision: &Decision) -> String {
        let vote = tally(
            &decision.evidence,
            &decision.critic_weights,
            &self.tie_order,
            self.tie_epsilon,
        );

        if vote.all_failed() {
            let failures: Vec<String> = decision
                .evidence
                .iter()
                .map(|b| {
                    let kind = b.failure_kind().map(|k| k.as_str()).unwrap_or("unknown");
                    format!("{} ({})", b.critic_name, kind)
                })
                .collect();
            return format!(
                "No critic produced usable evidence; failed critics: {}",
                failures.join(", ")
            );
        }

        let dissenting = vote.runner_up(&self.tie_order, self.tie_epsilon);
        let alignment = |bundle: &EvidenceBundle| -> f64 {
            if bundle.verdict.is_error() {
                0.0
            } else if Some(bundle.verdict) == dissenting {
                1.0
            } else if bundle.verdict == decision.final_verdict {
                -1.0
            } else {
                0.5
            }
        };

        let mut scored: Vec<(f64, &EvidenceBundle)> = decision
            .evidence
            .iter()
            .map(|b| {
                let weight = b.weight(decision.critic_weight(&b.critic_name));
                ((weight * alignment(b)).abs(), b)
            })
            .filter(|(score, _)| *score > 0.0)
            .collect();
        scored.sort_by(|(sa, a), (sb, b)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.critic_name.cmp(&b.critic_name))
        });

        let key_evidence: Vec<String> = scored
            .iter()
            .take(2)
            .map(|(_, b)| {
                format!(
                    "{} ({} {:.2}): {}",
                    b.critic_name, b.verdict, b.confidence, b.justification
                )
            })
            .collect();

        let mut summary = format!(
            "{} with confidence {:.2}, dissent {:.2} ({})",
            decision.final_verdict,
            decision.confidence,
            decision.dissent_index,
            decision.disagreement_type.as_str()
        );
        if let Some(dissenting) = dissenting {
            summary.push_str(&format!("; dissenting verdict {}", dissenting));
        }
        if !key_evidence.is_empty() {
            summary.push_str(&format!(". Key evidence: {}", key_evidence.join("; ")));
        }
        summary
    }

    async fn similar_precedents(&self, decision: &Decision) -> Vec<PrecedentMatch> {
        let (Some(store), Some(snapshot)) = (&self.precedents, decision.input_snapshot()) else {
            return Vec::new();
        };

        let query = PrecedentQuery::new(
            snapshot.clone(),
            self.config.similar_precedents,
            self.config.similar_min_similarity,
        );
        match store.search_hybrid(&query).await {
            Ok(matches) => matches,
            Err(e) => {
                warn!(case_id = %decision.case_id, error = %e, "Could not attach similar precedents");
                Vec::new()
            }
        }
    }
}

impl Default for EscalationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EscalationPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
