//! Aggregator - reduces evidence to one governed decision.
//!
//! The weighted vote lives in [`tally`], a pure function over an immutable
//! bundle list. The explainability engine re-runs the same function over
//! hypothetical bundle sets, so the two can never drift apart.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use evidence::{
    Decision, DecisionStatus, DisagreementType, EscalationTrigger, EvidenceBundle, InputSnapshot,
    PrecedentMatch, PrecedentQuery, PrecedentStore, Verdict, PRECEDENT_CONFLICT_FLAG,
    PRECEDENT_DEGRADED_FLAG,
};

use crate::config::AggregatorConfig;
use crate::types::{Result, TribunalError};

/// Dissent below this counts as unanimous.
const UNANIMOUS_DISSENT: f64 = 1e-6;
/// Share a verdict needs to count toward a chaotic vote.
const CHAOTIC_SHARE: f64 = 0.2;
/// Runner-up share that makes a two-way vote a split.
const SPLIT_SHARE: f64 = 0.4;

/// Outcome of the weighted vote over a bundle set.
#[derive(Debug, Clone, PartialEq)]
pub struct VoteTally {
    /// Summed weight per voting verdict present
    pub weights: BTreeMap<Verdict, f64>,
    /// Bundle count per voting verdict present
    pub counts: BTreeMap<Verdict, usize>,
    /// Total usable weight
    pub total_weight: f64,
    /// Non-error bundles
    pub usable: usize,
    /// ERROR bundles
    pub errors: usize,
    /// Winning verdict
    pub final_verdict: Verdict,
    /// Share of weight behind the winner
    pub confidence: f64,
    /// One minus the winner's share
    pub dissent_index: f64,
    /// Count share of bundles behind the winner
    pub split_ratio: f64,
    /// Whether the vote fell back to a head count (zero total weight)
    pub head_count: bool,
}

impl VoteTally {
    /// Whether no critic produced usable evidence.
    pub fn all_failed(&self) -> bool {
        self.usable == 0
    }

    /// Summed weight behind a verdict.
    pub fn weight_of(&self, verdict: Verdict) -> f64 {
        self.weights.get(&verdict).copied().unwrap_or(0.0)
    }

    /// Weights used for shares: real weights, or counts under a head count.
    fn share_basis(&self) -> BTreeMap<Verdict, f64> {
        if self.head_count {
            self.counts.iter().map(|(v, c)| (*v, *c as f64)).collect()
        } else {
            self.weights.clone()
        }
    }

    /// Strongest voting verdict other than the winner, tie-broken by
    /// `tie_order`.
    pub fn runner_up(&self, tie_order: &[Verdict], epsilon: f64) -> Option<Verdict> {
        let basis = self.share_basis();
        let rivals: BTreeMap<Verdict, f64> = basis
            .into_iter()
            .filter(|(v, _)| *v != self.final_verdict)
            .collect();
        pick_winner(&rivals, tie_order, epsilon)
    }

    /// Shape of the disagreement.
    pub fn disagreement_type(&self) -> DisagreementType {
        if self.all_failed() {
            return DisagreementType::Chaotic;
        }
        if self.dissent_index < UNANIMOUS_DISSENT {
            return DisagreementType::Unanimous;
        }

        let basis = self.share_basis();
        let total: f64 = basis.values().sum();
        if total <= 0.0 {
            return DisagreementType::Unanimous;
        }

        let mut shares: Vec<f64> = basis.values().map(|w| w / total).collect();
        shares.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

        let comparable = shares.iter().filter(|s| **s >= CHAOTIC_SHARE).count();
        if comparable >= 3 {
            DisagreementType::Chaotic
        } else if shares.get(1).copied().unwrap_or(0.0) >= SPLIT_SHARE {
            DisagreementType::Split
        } else {
            DisagreementType::Lopsided
        }
    }
}

/// Pick the heaviest verdict; weights within `epsilon` of the maximum are
/// tied and resolved by the first verdict in `tie_order`.
fn pick_winner(weights: &BTreeMap<Verdict, f64>, tie_order: &[Verdict], epsilon: f64) -> Option<Verdict> {
    let max = weights.values().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return None;
    }

    let tied: BTreeSet<Verdict> = weights
        .iter()
        .filter(|(_, w)| max - **w <= epsilon)
        .map(|(v, _)| *v)
        .collect();

    tie_order
        .iter()
        .find(|v| tied.contains(v))
        .copied()
        .or_else(|| tied.iter().next().copied())
}

/// Run the confidence-weighted vote.
///
/// Bundles are summed in critic-name order so that floating-point results
/// do not depend on arrival order. ERROR bundles carry no weight. When every
/// bundle is ERROR the result is ESCALATE with zero confidence. When usable
/// bundles exist but all weigh zero, verdict and dissent come from a head
/// count and confidence is zero.
pub fn tally(
    bundles: &[EvidenceBundle],
    critic_weights: &BTreeMap<String, f64>,
    tie_order: &[Verdict],
    epsilon: f64,
) -> VoteTally {
    let mut ordered: Vec<&EvidenceBundle> = bundles.iter().collect();
    ordered.sort_by(|a, b| {
        a.critic_name
            .cmp(&b.critic_name)
            .then_with(|| a.bundle_id.cmp(&b.bundle_id))
    });

    let mut weights: BTreeMap<Verdict, f64> = BTreeMap::new();
    let mut counts: BTreeMap<Verdict, usize> = BTreeMap::new();
    let mut errors = 0;

    for bundle in ordered {
        if bundle.verdict.is_error() {
            errors += 1;
            continue;
        }
        let critic_weight = critic_weights
            .get(&bundle.critic_name)
            .copied()
            .unwrap_or(1.0);
        *weights.entry(bundle.verdict).or_insert(0.0) += bundle.weight(critic_weight);
        *counts.entry(bundle.verdict).or_insert(0) += 1;
    }

    let usable: usize = counts.values().sum();
    let total_weight: f64 = weights.values().sum();

    if usable == 0 {
        return VoteTally {
            weights,
            counts,
            total_weight: 0.0,
            usable,
            errors,
            final_verdict: Verdict::Escalate,
            confidence: 0.0,
            dissent_index: 1.0,
            split_ratio: 0.0,
            head_count: false,
        };
    }

    let head_count = total_weight <= 0.0;
    let basis: BTreeMap<Verdict, f64> = if head_count {
        counts.iter().map(|(v, c)| (*v, *c as f64)).collect()
    } else {
        weights.clone()
    };
    let basis_total: f64 = basis.values().sum();

    let final_verdict = pick_winner(&basis, tie_order, epsilon).unwrap_or(Verdict::Escalate);
    let winner_share = (basis.get(&final_verdict).copied().unwrap_or(0.0) / basis_total).clamp(0.0, 1.0);
    let confidence = if head_count { 0.0 } else { winner_share };
    let dissent_index = (1.0 - winner_share).clamp(0.0, 1.0);
    let split_ratio = counts.get(&final_verdict).copied().unwrap_or(0) as f64 / usable as f64;

    VoteTally {
        weights,
        counts,
        total_weight,
        usable,
        errors,
        final_verdict,
        confidence,
        dissent_index,
        split_ratio,
        head_count,
    }
}

/// Result of consulting the precedent store.
#[derive(Debug, Clone, Default)]
struct PrecedentLookup {
    matches: Vec<PrecedentMatch>,
    degraded: bool,
}

/// Reduces evidence bundles into decisions.
pub struct Aggregator {
    config: AggregatorConfig,
    precedents: Option<Arc<dyn PrecedentStore>>,
}

impl Aggregator {
    /// Create a new aggregator with default configuration and no store.
    pub fn new() -> Self {
        Self::with_config(AggregatorConfig::default())
    }

    /// Create with custom configuration.
    pub fn with_config(config: AggregatorConfig) -> Self {
        Self {
            config,
            precedents: None,
        }
    }

    /// Consult a precedent store for conflict detection.
    pub fn with_precedent_store(mut self, store: Arc<dyn PrecedentStore>) -> Self {
        self.precedents = Some(store);
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Effective weights for a bundle set: `base` overridden by the
    /// configured critic weights.
    pub fn effective_weights(
        &self,
        bundles: &[EvidenceBundle],
        base: &BTreeMap<String, f64>,
    ) -> BTreeMap<String, f64> {
        bundles
            .iter()
            .map(|b| {
                let weight = self
                    .config
                    .critic_weights
                    .get(&b.critic_name)
                    .or_else(|| base.get(&b.critic_name))
                    .copied()
                    .unwrap_or(1.0);
                (b.critic_name.clone(), weight)
            })
            .collect()
    }

    /// Run the weighted vote with this aggregator's tie policy.
    pub fn simulate(&self, bundles: &[EvidenceBundle], critic_weights: &BTreeMap<String, f64>) -> VoteTally {
        tally(
            bundles,
            critic_weights,
            &self.config.tie_break_order,
            self.config.tie_epsilon,
        )
    }

    /// Aggregate using only the configured critic weights.
    pub async fn aggregate(&self, bundles: Vec<EvidenceBundle>) -> Result<Decision> {
        self.aggregate_weighted(bundles, &BTreeMap::new()).await
    }

    /// Aggregate bundles into a decision.
    ///
    /// `base_weights` (typically from the critic registry) apply to critics
    /// the configuration does not weight explicitly.
    pub async fn aggregate_weighted(
        &self,
        mut bundles: Vec<EvidenceBundle>,
        base_weights: &BTreeMap<String, f64>,
    ) -> Result<Decision> {
        let start = Instant::now();

        bundles.sort_by(|a, b| {
            a.critic_name
                .cmp(&b.critic_name)
                .then_with(|| a.bundle_id.cmp(&b.bundle_id))
        });

        let snapshot = bundles
            .first()
            .map(|b| b.input_snapshot.clone())
            .ok_or_else(|| TribunalError::NoEvidence("<unknown>".to_string()))?;

        let weights = self.effective_weights(&bundles, base_weights);
        let vote = self.simulate(&bundles, &weights);

        debug!(
            case_id = %snapshot.case_id,
            usable = vote.usable,
            errors = vote.errors,
            total_weight = vote.total_weight,
            "Vote tallied"
        );

        let lookup = self.consult_precedents(&snapshot).await;

        let mut risk_flags: BTreeSet<String> = bundles
            .iter()
            .flat_map(|b| b.risk_flags.iter().cloned())
            .collect();

        let mut dissent_index = vote.dissent_index;

        if lookup.degraded {
            risk_flags.insert(PRECEDENT_DEGRADED_FLAG.to_string());
        } else if let Some(top) = lookup.matches.first() {
            if top.decision.final_verdict != vote.final_verdict
                && top.similarity_score > self.config.precedent_conflict_similarity
            {
                warn!(
                    case_id = %snapshot.case_id,
                    precedent_id = %top.precedent_id,
                    precedent_verdict = %top.decision.final_verdict,
                    final_verdict = %vote.final_verdict,
                    similarity = top.similarity_score,
                    "Precedent conflict"
                );
                risk_flags.insert(PRECEDENT_CONFLICT_FLAG.to_string());
                dissent_index = (dissent_index + self.config.precedent_conflict_penalty).min(1.0);
            }
        }

        let mut triggers = Vec::new();
        if vote.all_failed() {
            triggers.push(EscalationTrigger::AllCriticsFailed);
        }
        if dissent_index > self.config.escalation_threshold {
            triggers.push(EscalationTrigger::HighDissent);
        }
        if vote.confidence < self.config.min_confidence {
            triggers.push(EscalationTrigger::LowConfidence);
        }
        if bundles
            .iter()
            .any(|b| b.has_flag(&self.config.mandatory_review_flag))
        {
            triggers.push(EscalationTrigger::MandatoryReview);
        }

        let status = if vote.all_failed() {
            DecisionStatus::Undecidable
        } else if vote.errors > 0 || lookup.degraded || vote.head_count {
            DecisionStatus::Degraded
        } else {
            DecisionStatus::Decided
        };

        let disagreement_type = vote.disagreement_type();
        let mut decision = Decision::new(
            snapshot.case_id.clone(),
            status,
            vote.final_verdict,
            vote.confidence,
            dissent_index,
            vote.split_ratio,
            disagreement_type,
            bundles,
        );
        decision.critic_weights = weights;
        decision.precedents_applied = lookup.matches.iter().map(|m| m.precedent_id.clone()).collect();
        decision.risk_flags = risk_flags;
        decision.requires_escalation = !triggers.is_empty();
        decision.escalation_triggers = triggers;
        decision.degraded_mode = lookup.degraded;
        decision.execution_time_ms = start.elapsed().as_millis() as u64;

        info!(
            case_id = %decision.case_id,
            final_verdict = %decision.final_verdict,
            confidence = decision.confidence,
            dissent_index = decision.dissent_index,
            disagreement = %decision.disagreement_type.as_str(),
            requires_escalation = decision.requires_escalation,
            "Decision reached"
        );

        Ok(decision)
    }

    async fn consult_precedents(&self, snapshot: &InputSnapshot) -> PrecedentLookup {
        let Some(store) = &self.precedents else {
            return PrecedentLookup::default();
        };

        let query = PrecedentQuery::new(
            snapshot.clone(),
            self.config.precedent_top_k,
            self.config.precedent_min_similarity,
        )
        .with_mode(self.config.precedent_search_mode);

        let timeout = Duration::from_millis(self.config.precedent_timeout_ms);
        match tokio::time::timeout(timeout, store.search_hybrid(&query)).await {
            Ok(Ok(matches)) => PrecedentLookup {
                matches,
                degraded: false,
            },
            Ok(Err(e)) => {
                warn!(case_id = %snapshot.case_id, error = %e, "Precedent store unavailable, continuing degraded");
                PrecedentLookup {
                    matches: Vec::new(),
                    degraded: true,
                }
            }
            Err(_) => {
                warn!(
                    case_id = %snapshot.case_id,
                    timeout_ms = self.config.precedent_timeout_ms,
                    "Precedent lookup timed out, continuing degraded"
                );
                PrecedentLookup {
                    matches: Vec::new(),
                    degraded: true,
                }
            }
        }
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evidence::{CaseInput, FailureKind, InMemoryPrecedentStore, Precedent};

    fn case() -> CaseInput {
        CaseInput::new("case-1", "Approve refund of 900 EUR to new account")
    }

    fn bundle(name: &str, verdict: Verdict, confidence: f64) -> EvidenceBundle {
        EvidenceBundle::new(name, verdict, confidence, &case())
    }

    fn failed(name: &str) -> EvidenceBundle {
        EvidenceBundle::error(name, FailureKind::CriticTimeout, "timed out", case().snapshot())
    }

    fn default_order() -> Vec<Verdict> {
        AggregatorConfig::default().tie_break_order
    }

    #[test]
    fn test_weighted_vote() {
        let bundles = vec![
            bundle("a", Verdict::Allow, 0.9),
            bundle("b", Verdict::Allow, 0.8),
            bundle("c", Verdict::Deny, 0.95),
        ];
        let vote = tally(&bundles, &BTreeMap::new(), &default_order(), 1e-6);

        assert_eq!(vote.final_verdict, Verdict::Allow);
        assert!((vote.weight_of(Verdict::Allow) - 1.7).abs() < 1e-9);
        assert!((vote.confidence - 1.7 / 2.65).abs() < 1e-9);
        assert!((vote.dissent_index - 0.95 / 2.65).abs() < 1e-9);
        assert!((vote.split_ratio - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(vote.disagreement_type(), DisagreementType::Lopsided);
        assert_eq!(vote.runner_up(&default_order(), 1e-6), Some(Verdict::Deny));
    }

    #[test]
    fn test_critic_weights_shift_the_vote() {
        let bundles = vec![bundle("a", Verdict::Allow, 0.9), bundle("b", Verdict::Deny, 0.6)];
        let mut weights = BTreeMap::new();
        weights.insert("b".to_string(), 2.0);

        let vote = tally(&bundles, &weights, &default_order(), 1e-6);
        assert_eq!(vote.final_verdict, Verdict::Deny);
        assert!((vote.total_weight - 2.1).abs() < 1e-9);
    }

    #[test]
    fn test_tie_resolved_conservatively() {
        let bundles = vec![bundle("a", Verdict::Allow, 0.7), bundle("b", Verdict::Deny, 0.7)];
        let vote = tally(&bundles, &BTreeMap::new(), &default_order(), 1e-6);
        assert_eq!(vote.final_verdict, Verdict::Deny);
        assert_eq!(vote.disagreement_type(), DisagreementType::Split);

        let order = vec![Verdict::Allow, Verdict::Abstain, Verdict::Escalate, Verdict::Deny];
        let vote = tally(&bundles, &BTreeMap::new(), &order, 1e-6);
        assert_eq!(vote.final_verdict, Verdict::Allow);
    }

    #[test]
    fn test_near_tie_within_epsilon() {
        let bundles = vec![
            bundle("a", Verdict::Allow, 0.7000000001),
            bundle("b", Verdict::Escalate, 0.7),
        ];
        let vote = tally(&bundles, &BTreeMap::new(), &default_order(), 1e-6);
        assert_eq!(vote.final_verdict, Verdict::Escalate);
    }

    #[test]
    fn test_chaotic_classification() {
        let bundles = vec![
            bundle("a", Verdict::Allow, 0.6),
            bundle("b", Verdict::Deny, 0.5),
            bundle("c", Verdict::Escalate, 0.4),
        ];
        let vote = tally(&bundles, &BTreeMap::new(), &default_order(), 1e-6);
        assert_eq!(vote.disagreement_type(), DisagreementType::Chaotic);
    }

    #[test]
    fn test_single_verdict_is_unanimous() {
        let bundles = vec![bundle("a", Verdict::Deny, 0.3), bundle("b", Verdict::Deny, 0.9)];
        let vote = tally(&bundles, &BTreeMap::new(), &default_order(), 1e-6);
        assert_eq!(vote.final_verdict, Verdict::Deny);
        assert_eq!(vote.dissent_index, 0.0);
        assert_eq!(vote.confidence, 1.0);
        assert_eq!(vote.disagreement_type(), DisagreementType::Unanimous);
        assert_eq!(vote.runner_up(&default_order(), 1e-6), None);
    }

    #[test]
    fn test_all_errors_escalate() {
        let bundles = vec![failed("a"), failed("b")];
        let vote = tally(&bundles, &BTreeMap::new(), &default_order(), 1e-6);
        assert!(vote.all_failed());
        assert_eq!(vote.final_verdict, Verdict::Escalate);
        assert_eq!(vote.confidence, 0.0);
        assert_eq!(vote.errors, 2);
    }

    #[test]
    fn test_zero_weight_falls_back_to_head_count() {
        let bundles = vec![
            bundle("a", Verdict::Allow, 0.0),
            bundle("b", Verdict::Allow, 0.0),
            bundle("c", Verdict::Deny, 0.0),
        ];
        let vote = tally(&bundles, &BTreeMap::new(), &default_order(), 1e-6);
        assert!(vote.head_count);
        assert_eq!(vote.final_verdict, Verdict::Allow);
        assert_eq!(vote.confidence, 0.0);
        assert!((vote.dissent_index - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_order_independent() {
        let a = vec![
            bundle("x", Verdict::Allow, 0.1),
            bundle("y", Verdict::Deny, 0.2),
            bundle("z", Verdict::Allow, 0.3),
        ];
        let mut b = a.clone();
        b.reverse();
        let va = tally(&a, &BTreeMap::new(), &default_order(), 1e-6);
        let vb = tally(&b, &BTreeMap::new(), &default_order(), 1e-6);
        assert_eq!(va.confidence.to_bits(), vb.confidence.to_bits());
        assert_eq!(va.dissent_index.to_bits(), vb.dissent_index.to_bits());
    }

    #[tokio::test]
    async fn test_aggregate_escalation_triggers() {
        let aggregator = Aggregator::new();
        let decision = aggregator
            .aggregate(vec![
                bundle("a", Verdict::Allow, 0.5),
                bundle("b", Verdict::Deny, 0.45),
            ])
            .await
            .unwrap();

        assert_eq!(decision.final_verdict, Verdict::Allow);
        assert!(decision.requires_escalation);
        assert!(decision.escalation_triggers.contains(&EscalationTrigger::HighDissent));
        assert_eq!(decision.status, DecisionStatus::Decided);
        assert_eq!(decision.evidence.len(), 2);
    }

    #[tokio::test]
    async fn test_mandatory_review_flag_forces_escalation() {
        let aggregator = Aggregator::new();
        let decision = aggregator
            .aggregate(vec![
                bundle("a", Verdict::Allow, 0.95),
                bundle("b", Verdict::Allow, 0.9).with_risk_flag("mandatory_review"),
            ])
            .await
            .unwrap();

        assert_eq!(decision.dissent_index, 0.0);
        assert!(decision.requires_escalation);
        assert_eq!(decision.escalation_triggers, vec![EscalationTrigger::MandatoryReview]);
        assert!(decision.has_flag("mandatory_review"));
    }

    #[tokio::test]
    async fn test_all_failed_is_undecidable() {
        let decision = Aggregator::new()
            .aggregate(vec![failed("a"), failed("b")])
            .await
            .unwrap();
        assert_eq!(decision.status, DecisionStatus::Undecidable);
        assert_eq!(decision.final_verdict, Verdict::Escalate);
        assert!(decision.requires_escalation);
        assert!(decision.escalation_triggers.contains(&EscalationTrigger::AllCriticsFailed));
    }

    #[tokio::test]
    async fn test_empty_bundles_rejected() {
        let result = Aggregator::new().aggregate(Vec::new()).await;
        assert!(matches!(result, Err(TribunalError::NoEvidence(_))));
    }

    #[tokio::test]
    async fn test_precedent_conflict_penalty() {
        let store = Arc::new(InMemoryPrecedentStore::new());
        store
            .append(Precedent::new(case().snapshot(), Verdict::Deny, 0.9))
            .await
            .unwrap();

        let aggregator = Aggregator::new().with_precedent_store(store);
        let decision = aggregator
            .aggregate(vec![
                bundle("a", Verdict::Allow, 0.9),
                bundle("b", Verdict::Allow, 0.8),
                bundle("c", Verdict::Deny, 0.3),
            ])
            .await
            .unwrap();

        let base_dissent = 0.3 / 2.0;
        assert!(decision.has_flag(PRECEDENT_CONFLICT_FLAG));
        assert!((decision.dissent_index - (base_dissent + 0.15)).abs() < 1e-9);
        assert_eq!(decision.precedents_applied.len(), 1);
        assert!(!decision.degraded_mode);
    }

    #[tokio::test]
    async fn test_conflict_bound_is_exclusive() {
        let store = Arc::new(InMemoryPrecedentStore::new());
        store
            .append(Precedent::new(case().snapshot(), Verdict::Deny, 0.9))
            .await
            .unwrap();

        // An exact match scores 1.0, which is not above a 1.0 bound
        let config = AggregatorConfig {
            precedent_conflict_similarity: 1.0,
            ..AggregatorConfig::default()
        };
        let aggregator = Aggregator::with_config(config).with_precedent_store(store);
        let decision = aggregator
            .aggregate(vec![bundle("a", Verdict::Allow, 0.9), bundle("b", Verdict::Allow, 0.8)])
            .await
            .unwrap();

        assert_eq!(decision.precedents_applied.len(), 1);
        assert!(!decision.has_flag(PRECEDENT_CONFLICT_FLAG));
        assert_eq!(decision.dissent_index, 0.0);
    }

    #[tokio::test]
    async fn test_degraded_precedent_store() {
        let store = Arc::new(InMemoryPrecedentStore::new());
        store.set_available(false);

        let aggregator = Aggregator::new().with_precedent_store(store);
        let decision = aggregator
            .aggregate(vec![bundle("a", Verdict::Allow, 0.9)])
            .await
            .unwrap();

        assert_eq!(decision.final_verdict, Verdict::Allow);
        assert!(decision.degraded_mode);
        assert_eq!(decision.status, DecisionStatus::Degraded);
        assert!(decision.has_flag(PRECEDENT_DEGRADED_FLAG));
    }

    #[tokio::test]
    async fn test_configured_weights_override_base() {
        let mut config = AggregatorConfig::default();
        config.critic_weights.insert("a".to_string(), 3.0);
        let aggregator = Aggregator::with_config(config);

        let mut base = BTreeMap::new();
        base.insert("a".to_string(), 0.1);
        base.insert("b".to_string(), 0.5);

        let bundles = vec![bundle("a", Verdict::Allow, 0.5), bundle("b", Verdict::Deny, 0.9)];
        let weights = aggregator.effective_weights(&bundles, &base);
        assert_eq!(weights["a"], 3.0);
        assert_eq!(weights["b"], 0.5);

        let decision = aggregator.aggregate_weighted(bundles, &base).await.unwrap();
        assert_eq!(decision.final_verdict, Verdict::Allow);
        assert_eq!(decision.critic_weight("a"), 3.0);
    }
}
