//! Counterfactual search over the evidence of a finalized decision.
//!
//! A counterfactual flips one or more critics to another verdict and
//! re-runs the weighted vote. Critics are never re-invoked; only
//! [`tally`](crate::aggregator::tally) is replayed over the edited bundles.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use evidence::{Decision, EvidenceBundle, Verdict};

use crate::aggregator::{tally, VoteTally};
use crate::types::{Result, TribunalError};

/// Counterfactual search strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CounterfactualMode {
    /// Single flip with the smallest winning margin
    #[default]
    Nearest,
    /// Fewest changed critics
    Minimal,
    /// Results from distinct strategies
    Diverse,
    /// Easiest flips first, ranked by 1 - confidence
    Plausible,
}

impl CounterfactualMode {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nearest => "NEAREST",
            Self::Minimal => "MINIMAL",
            Self::Diverse => "DIVERSE",
            Self::Plausible => "PLAUSIBLE",
        }
    }
}

impl fmt::Display for CounterfactualMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CounterfactualMode {
    type Err = TribunalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NEAREST" => Ok(Self::Nearest),
            "MINIMAL" => Ok(Self::Minimal),
            "DIVERSE" => Ok(Self::Diverse),
            "PLAUSIBLE" => Ok(Self::Plausible),
            _ => Err(TribunalError::Config(format!("Unknown counterfactual mode: {}", s))),
        }
    }
}

/// One hypothetical verdict change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChangedFactor {
    /// Critic whose verdict changes
    pub critic_name: String,
    /// Verdict the critic actually gave
    pub original_verdict: Verdict,
    /// Verdict it is assumed to give instead
    pub counterfactual_verdict: Verdict,
}

/// A hypothetical evidence edit that flips the final verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterfactualResult {
    /// Strategy that produced the result
    pub strategy: String,
    /// Changes applied, ordered by critic name
    pub changed_factors: Vec<ChangedFactor>,
    /// Final verdict of the original decision
    pub original_verdict: Verdict,
    /// Final verdict after the changes
    pub counterfactual_verdict: Verdict,
    /// Confidence after the changes
    pub counterfactual_confidence: f64,
    /// Changed weight as a share of total weight
    pub change_magnitude: f64,
    /// Mean of 1 - confidence over the changed critics
    pub plausibility_score: f64,
    /// New winner's weight minus the old winner's weight
    pub weight_margin: f64,
}

impl CounterfactualResult {
    /// Names of the changed critics.
    pub fn changed_critics(&self) -> BTreeSet<String> {
        self.changed_factors
            .iter()
            .map(|f| f.critic_name.clone())
            .collect()
    }
}

/// Outcome of a counterfactual search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterfactualReport {
    /// Case explained
    pub case_id: String,
    /// Search mode
    pub mode: CounterfactualMode,
    /// Final verdict of the decision
    pub original_verdict: Verdict,
    /// Confidence of the decision
    pub original_confidence: f64,
    /// Results, best first
    pub results: Vec<CounterfactualResult>,
    /// Simulations run
    pub candidates_evaluated: usize,
    /// False when the deadline cut the search short
    pub within_timeout: bool,
    /// Search time
    pub computation_time_ms: u64,
}

#[derive(Debug, Clone)]
struct Candidate {
    /// Position in the decision's evidence
    index: usize,
    critic_name: String,
    verdict: Verdict,
    weight: f64,
    confidence: f64,
}

/// Lexicographic k-combinations of `0..n`.
struct Combinations {
    indices: Vec<usize>,
    n: usize,
    first: bool,
}

impl Combinations {
    fn new(n: usize, k: usize) -> Self {
        Self {
            indices: (0..k).collect(),
            n,
            first: true,
        }
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let k = self.indices.len();
        if k == 0 || k > self.n {
            return None;
        }
        if self.first {
            self.first = false;
            return Some(self.indices.clone());
        }

        let mut i = k;
        while i > 0 {
            i -= 1;
            if self.indices[i] != i + self.n - k {
                self.indices[i] += 1;
                for j in i + 1..k {
                    self.indices[j] = self.indices[j - 1] + 1;
                }
                return Some(self.indices.clone());
            }
        }
        None
    }
}

/// One search over one decision.
struct Search<'a> {
    engine: &'a CounterfactualEngine,
    decision: &'a Decision,
    original: VoteTally,
    target: Verdict,
    candidates: Vec<Candidate>,
    max_changes: usize,
    deadline: Instant,
    expired: bool,
    evaluated: usize,
}

impl<'a> Search<'a> {
    fn new(
        engine: &'a CounterfactualEngine,
        decision: &'a Decision,
        max_changes: usize,
        deadline: Instant,
    ) -> Self {
        let original = engine.vote(&decision.evidence, decision);
        let target = original
            .runner_up(&engine.tie_order, engine.tie_epsilon)
            .or_else(|| {
                engine
                    .tie_order
                    .iter()
                    .copied()
                    .find(|v| *v != decision.final_verdict)
            })
            .unwrap_or(Verdict::Escalate);

        let mut candidates: Vec<Candidate> = decision
            .evidence
            .iter()
            .enumerate()
            .filter(|(_, b)| !b.verdict.is_error() && b.verdict != target)
            .map(|(index, b)| Candidate {
                index,
                critic_name: b.critic_name.clone(),
                verdict: b.verdict,
                weight: b.weight(decision.critic_weight(&b.critic_name)),
                confidence: b.confidence,
            })
            .filter(|c| original.head_count || c.weight > 0.0)
            .collect();
        candidates.sort_by(|a, b| a.critic_name.cmp(&b.critic_name));

        Self {
            engine,
            decision,
            original,
            target,
            candidates,
            max_changes,
            deadline,
            expired: false,
            evaluated: 0,
        }
    }

    fn max_size(&self) -> usize {
        self.max_changes.min(self.candidates.len())
    }

    /// Whether the deadline has passed. Latches once it has.
    fn out_of_time(&mut self) -> bool {
        if !self.expired && Instant::now() >= self.deadline {
            self.expired = true;
        }
        self.expired
    }

    /// Simulate flipping the given candidates; `None` if the verdict holds
    /// or the deadline passed.
    fn try_flip(&mut self, members: &[usize], strategy: &str) -> Option<CounterfactualResult> {
        if self.out_of_time() {
            return None;
        }
        self.evaluated += 1;

        let mut edited = self.decision.evidence.clone();
        for &m in members {
            edited[self.candidates[m].index].verdict = self.target;
        }
        let simulated = self.engine.vote(&edited, self.decision);
        if simulated.final_verdict == self.decision.final_verdict {
            return None;
        }

        let mut changed_factors: Vec<ChangedFactor> = members
            .iter()
            .map(|&m| ChangedFactor {
                critic_name: self.candidates[m].critic_name.clone(),
                original_verdict: self.candidates[m].verdict,
                counterfactual_verdict: self.target,
            })
            .collect();
        changed_factors.sort();

        let change_magnitude = if self.original.head_count || self.original.total_weight <= 0.0 {
            members.len() as f64 / self.original.usable.max(1) as f64
        } else {
            members.iter().map(|&m| self.candidates[m].weight).sum::<f64>() / self.original.total_weight
        };
        let plausibility_score = members
            .iter()
            .map(|&m| 1.0 - self.candidates[m].confidence)
            .sum::<f64>()
            / members.len().max(1) as f64;

        let basis = |v: Verdict| -> f64 {
            if simulated.head_count {
                simulated.counts.get(&v).copied().unwrap_or(0) as f64
            } else {
                simulated.weight_of(v)
            }
        };
        let weight_margin = basis(simulated.final_verdict) - basis(self.decision.final_verdict);

        Some(CounterfactualResult {
            strategy: strategy.to_string(),
            changed_factors,
            original_verdict: self.decision.final_verdict,
            counterfactual_verdict: simulated.final_verdict,
            counterfactual_confidence: simulated.confidence,
            change_magnitude: change_magnitude.clamp(0.0, 1.0),
            plausibility_score: plausibility_score.clamp(0.0, 1.0),
            weight_margin,
        })
    }

    /// Every flipping combination of the smallest size that has one.
    fn minimal(&mut self, strategy: &str) -> Vec<CounterfactualResult> {
        for k in 1..=self.max_size() {
            let mut found = Vec::new();
            for combo in Combinations::new(self.candidates.len(), k) {
                if self.out_of_time() {
                    break;
                }
                if let Some(result) = self.try_flip(&combo, strategy) {
                    found.push(result);
                }
            }
            if !found.is_empty() || self.expired {
                sort_by_margin(&mut found);
                return found;
            }
        }
        Vec::new()
    }

    /// Add candidates in the given order until the verdict flips.
    fn greedy(&mut self, order: &[usize], strategy: &str) -> Option<CounterfactualResult> {
        let mut members = Vec::new();
        for &m in order.iter().take(self.max_changes) {
            members.push(m);
            if let Some(result) = self.try_flip(&members, strategy) {
                return Some(result);
            }
            if self.expired {
                break;
            }
        }
        None
    }

    /// Flipping combinations with no smaller flipping subset.
    fn all_minimal_sets(&mut self, strategy: &str) -> Vec<CounterfactualResult> {
        let mut found: Vec<CounterfactualResult> = Vec::new();
        let mut found_sets: Vec<BTreeSet<usize>> = Vec::new();

        for k in 1..=self.max_size() {
            // Fewer than k candidates fail alone, so every k-set holds a single flip
            let single_flips = found_sets.iter().filter(|f| f.len() == 1).count();
            if self.candidates.len() - single_flips < k {
                break;
            }
            for combo in Combinations::new(self.candidates.len(), k) {
                if self.out_of_time() {
                    return found;
                }
                let set: BTreeSet<usize> = combo.iter().copied().collect();
                if found_sets.iter().any(|f| f.is_subset(&set)) {
                    continue;
                }
                if let Some(result) = self.try_flip(&combo, strategy) {
                    found.push(result);
                    found_sets.push(set);
                }
            }
        }
        found
    }
}

fn names(result: &CounterfactualResult) -> Vec<&str> {
    result
        .changed_factors
        .iter()
        .map(|f| f.critic_name.as_str())
        .collect()
}

fn sort_by_margin(results: &mut [CounterfactualResult]) {
    results.sort_by(|a, b| {
        a.weight_margin
            .partial_cmp(&b.weight_margin)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| names(a).cmp(&names(b)))
    });
}

/// Counterfactual search engine.
#[derive(Debug, Clone)]
pub struct CounterfactualEngine {
    tie_order: Vec<Verdict>,
    tie_epsilon: f64,
}

impl CounterfactualEngine {
    /// Create an engine using the aggregator's tie policy.
    pub fn new(tie_order: Vec<Verdict>, tie_epsilon: f64) -> Self {
        Self {
            tie_order,
            tie_epsilon,
        }
    }

    fn vote(&self, bundles: &[EvidenceBundle], decision: &Decision) -> VoteTally {
        tally(bundles, &decision.critic_weights, &self.tie_order, self.tie_epsilon)
    }

    /// Search for counterfactuals. Stops adding candidates at the deadline
    /// and reports `within_timeout = false` instead of failing.
    pub fn search(
        &self,
        decision: &Decision,
        mode: CounterfactualMode,
        max_counterfactuals: usize,
        max_changes: usize,
        timeout: Duration,
    ) -> CounterfactualReport {
        let start = Instant::now();
        let mut search = Search::new(self, decision, max_changes.max(1), start + timeout);

        debug!(
            case_id = %decision.case_id,
            mode = %mode,
            target = %search.target,
            candidates = search.candidates.len(),
            "Counterfactual search started"
        );

        let results = match mode {
            CounterfactualMode::Nearest => {
                let mut singles: Vec<CounterfactualResult> = (0..search.candidates.len())
                    .filter_map(|i| search.try_flip(&[i], "nearest"))
                    .collect();
                if singles.is_empty() && !search.expired {
                    singles = search.minimal("nearest");
                }
                sort_by_margin(&mut singles);
                singles.truncate(1);
                singles
            }
            CounterfactualMode::Minimal => {
                let mut found = search.minimal("minimal");
                found.truncate(max_counterfactuals);
                found
            }
            CounterfactualMode::Diverse => {
                let mut by_weight: Vec<usize> = (0..search.candidates.len()).collect();
                by_weight.sort_by(|&a, &b| {
                    let (ca, cb) = (&search.candidates[a], &search.candidates[b]);
                    cb.weight
                        .partial_cmp(&ca.weight)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| ca.critic_name.cmp(&cb.critic_name))
                });
                let mut by_confidence: Vec<usize> = (0..search.candidates.len()).collect();
                by_confidence.sort_by(|&a, &b| {
                    let (ca, cb) = (&search.candidates[a], &search.candidates[b]);
                    ca.confidence
                        .partial_cmp(&cb.confidence)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| ca.critic_name.cmp(&cb.critic_name))
                });

                let mut pool = Vec::new();
                pool.extend(search.greedy(&by_weight, "highest_weight"));
                pool.extend(search.greedy(&by_confidence, "lowest_confidence"));
                pool.extend(search.minimal("bounded_combination"));

                let mut seen: BTreeSet<BTreeSet<String>> = BTreeSet::new();
                pool.into_iter()
                    .filter(|r| seen.insert(r.changed_critics()))
                    .take(max_counterfactuals)
                    .collect()
            }
            CounterfactualMode::Plausible => {
                let mut found = search.all_minimal_sets("plausible");
                found.sort_by(|a, b| {
                    b.plausibility_score
                        .partial_cmp(&a.plausibility_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.changed_factors.len().cmp(&b.changed_factors.len()))
                        .then_with(|| {
                            a.weight_margin
                                .partial_cmp(&b.weight_margin)
                                .unwrap_or(std::cmp::Ordering::Equal)
                        })
                        .then_with(|| names(a).cmp(&names(b)))
                });
                found.truncate(max_counterfactuals);
                found
            }
        };

        if search.expired {
            warn!(
                case_id = %decision.case_id,
                mode = %mode,
                evaluated = search.evaluated,
                found = results.len(),
                "Counterfactual search hit its deadline, returning partial results"
            );
        }

        CounterfactualReport {
            case_id: decision.case_id.clone(),
            mode,
            original_verdict: decision.final_verdict,
            original_confidence: decision.confidence,
            results,
            candidates_evaluated: search.evaluated,
            within_timeout: !search.expired,
            computation_time_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Re-apply changed factors to the decision's evidence and re-run the
    /// vote.
    pub fn replay(&self, decision: &Decision, changed_factors: &[ChangedFactor]) -> Result<VoteTally> {
        let mut edited = decision.evidence.clone();
        for factor in changed_factors {
            let bundle = edited
                .iter_mut()
                .find(|b| b.critic_name == factor.critic_name)
                .ok_or_else(|| {
                    TribunalError::InvalidCounterfactual(format!(
                        "Critic {} is not part of case {}",
                        factor.critic_name, decision.case_id
                    ))
                })?;
            if bundle.verdict != factor.original_verdict {
                return Err(TribunalError::InvalidCounterfactual(format!(
                    "Critic {} gave {}, not {}",
                    factor.critic_name, bundle.verdict, factor.original_verdict
                )));
            }
            bundle.verdict = factor.counterfactual_verdict;
        }
        Ok(self.vote(&edited, decision))
    }

    /// A counterfactual is valid iff it changes at least one critic, every
    /// changed critic exists in the decision's evidence and each simulated
    /// verdict differs from the critic's actual verdict.
    pub fn is_valid(&self, decision: &Decision, result: &CounterfactualResult) -> bool {
        !result.changed_factors.is_empty()
            && result.changed_factors.iter().all(|factor| {
                decision
                    .evidence_for(&factor.critic_name)
                    .is_some_and(|b| {
                        b.verdict == factor.original_verdict
                            && factor.counterfactual_verdict != b.verdict
                            && !factor.counterfactual_verdict.is_error()
                    })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::Aggregator;
    use evidence::{CaseInput, FailureKind};

    fn engine() -> CounterfactualEngine {
        CounterfactualEngine::new(
            vec![Verdict::Deny, Verdict::Escalate, Verdict::Abstain, Verdict::Allow],
            1e-6,
        )
    }

    async fn decide(bundles: Vec<(&str, Verdict, f64)>) -> Decision {
        let input = CaseInput::new("case-cf", "Rotate signing keys during business hours");
        let bundles = bundles
            .into_iter()
            .map(|(name, verdict, conf)| EvidenceBundle::new(name, verdict, conf, &input))
            .collect();
        Aggregator::new().aggregate(bundles).await.unwrap()
    }

    fn long() -> Duration {
        Duration::from_secs(5)
    }

    #[test]
    fn test_combinations() {
        let all: Vec<Vec<usize>> = Combinations::new(4, 2).collect();
        assert_eq!(all.len(), 6);
        assert_eq!(all[0], vec![0, 1]);
        assert_eq!(all[5], vec![2, 3]);
        assert_eq!(Combinations::new(2, 3).count(), 0);
        assert_eq!(Combinations::new(3, 0).count(), 0);
    }

    #[tokio::test]
    async fn test_nearest_picks_smallest_margin() {
        let decision = decide(vec![
            ("a", Verdict::Allow, 0.9),
            ("b", Verdict::Allow, 0.8),
            ("c", Verdict::Deny, 0.95),
        ])
        .await;

        let report = engine().search(&decision, CounterfactualMode::Nearest, 3, 3, long());
        assert!(report.within_timeout);
        assert_eq!(report.results.len(), 1);

        let result = &report.results[0];
        assert_eq!(names(result), vec!["b"]);
        assert_eq!(result.counterfactual_verdict, Verdict::Deny);
        assert!((result.weight_margin - 0.85).abs() < 1e-9);
        assert!((result.counterfactual_confidence - 1.75 / 2.65).abs() < 1e-9);
        assert!((result.change_magnitude - 0.8 / 2.65).abs() < 1e-9);
        assert!((result.plausibility_score - 0.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_minimal_prefers_single_flips() {
        let decision = decide(vec![
            ("a", Verdict::Allow, 0.9),
            ("b", Verdict::Allow, 0.8),
            ("c", Verdict::Deny, 0.95),
        ])
        .await;

        let report = engine().search(&decision, CounterfactualMode::Minimal, 3, 3, long());
        assert_eq!(report.results.len(), 2);
        assert!(report.results.iter().all(|r| r.changed_factors.len() == 1));
        assert_eq!(names(&report.results[0]), vec!["b"]);
    }

    #[tokio::test]
    async fn test_minimal_needs_combination() {
        let decision = decide(vec![
            ("a", Verdict::Allow, 0.9),
            ("b", Verdict::Allow, 0.9),
            ("c", Verdict::Allow, 0.9),
            ("d", Verdict::Deny, 0.2),
        ])
        .await;

        let report = engine().search(&decision, CounterfactualMode::Minimal, 5, 3, long());
        assert!(!report.results.is_empty());
        assert!(report.results.iter().all(|r| r.changed_factors.len() == 2));

        let report = engine().search(&decision, CounterfactualMode::Minimal, 5, 1, long());
        assert!(report.results.is_empty());
        assert!(report.within_timeout);
    }

    #[tokio::test]
    async fn test_diverse_deduplicates() {
        let decision = decide(vec![
            ("a", Verdict::Allow, 0.9),
            ("b", Verdict::Allow, 0.3),
            ("c", Verdict::Allow, 0.6),
            ("d", Verdict::Deny, 0.95),
        ])
        .await;

        let report = engine().search(&decision, CounterfactualMode::Diverse, 3, 3, long());
        assert!(!report.results.is_empty());
        assert!(report.results.len() <= 3);

        let sets: BTreeSet<BTreeSet<String>> = report.results.iter().map(|r| r.changed_critics()).collect();
        assert_eq!(sets.len(), report.results.len());
        assert_eq!(report.results[0].strategy, "highest_weight");
        assert_eq!(names(&report.results[0]), vec!["a"]);
    }

    #[tokio::test]
    async fn test_plausible_ranks_low_confidence_first() {
        let decision = decide(vec![
            ("a", Verdict::Allow, 0.9),
            ("b", Verdict::Allow, 0.7),
            ("c", Verdict::Deny, 0.5),
        ])
        .await;

        let report = engine().search(&decision, CounterfactualMode::Plausible, 3, 2, long());
        assert_eq!(report.results.len(), 2);
        assert_eq!(names(&report.results[0]), vec!["b"]);
        assert!(report.results[0].plausibility_score > report.results[1].plausibility_score);
    }

    #[tokio::test]
    async fn test_replay_round_trip() {
        let decision = decide(vec![
            ("a", Verdict::Allow, 0.9),
            ("b", Verdict::Allow, 0.8),
            ("c", Verdict::Deny, 0.95),
            ("d", Verdict::Abstain, 0.4),
        ])
        .await;

        let engine = engine();
        for mode in [
            CounterfactualMode::Nearest,
            CounterfactualMode::Minimal,
            CounterfactualMode::Diverse,
            CounterfactualMode::Plausible,
        ] {
            let report = engine.search(&decision, mode, 3, 3, long());
            for result in &report.results {
                assert!(engine.is_valid(&decision, result));
                let replayed = engine.replay(&decision, &result.changed_factors).unwrap();
                assert_eq!(replayed.final_verdict, result.counterfactual_verdict);
                assert_eq!(
                    replayed.confidence.to_bits(),
                    result.counterfactual_confidence.to_bits()
                );
            }
        }
    }

    #[tokio::test]
    async fn test_validity_rules() {
        let decision = decide(vec![("a", Verdict::Allow, 0.9), ("b", Verdict::Deny, 0.5)]).await;
        let engine = engine();

        let mut result = engine
            .search(&decision, CounterfactualMode::Nearest, 1, 1, long())
            .results
            .remove(0);
        assert!(engine.is_valid(&decision, &result));

        result.changed_factors[0].critic_name = "ghost".to_string();
        assert!(!engine.is_valid(&decision, &result));
        assert!(engine.replay(&decision, &result.changed_factors).is_err());

        result.changed_factors[0].critic_name = "a".to_string();
        result.changed_factors[0].counterfactual_verdict = Verdict::Allow;
        assert!(!engine.is_valid(&decision, &result));

        result.changed_factors.clear();
        assert!(!engine.is_valid(&decision, &result));
    }

    #[tokio::test]
    async fn test_deadline_returns_partial() {
        let decision = decide(vec![("a", Verdict::Allow, 0.9), ("b", Verdict::Deny, 0.5)]).await;
        let report = engine().search(&decision, CounterfactualMode::Diverse, 3, 3, Duration::ZERO);
        assert!(!report.within_timeout);
        assert!(report.results.is_empty());
        assert_eq!(report.candidates_evaluated, 0);
    }

    /// Thirty light ALLOWs against three DENYs. No single flip changes the
    /// verdict but every pair does, so the combination space is huge.
    async fn wide_panel() -> Decision {
        let mut bundles: Vec<(String, Verdict, f64)> = (0..30)
            .map(|i| (format!("allow-{:02}", i), Verdict::Allow, 0.1))
            .collect();
        for i in 0..3 {
            bundles.push((format!("deny-{}", i), Verdict::Deny, 0.9));
        }
        decide(bundles.iter().map(|(n, v, c)| (n.as_str(), *v, *c)).collect()).await
    }

    #[tokio::test]
    async fn test_plausible_respects_deadline() {
        let decision = wide_panel().await;
        assert_eq!(decision.final_verdict, Verdict::Allow);

        let started = Instant::now();
        let report = engine().search(
            &decision,
            CounterfactualMode::Plausible,
            3,
            12,
            Duration::from_millis(100),
        );
        let elapsed = started.elapsed();

        assert!(!report.within_timeout);
        assert!(elapsed < Duration::from_secs(2), "search ran for {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_deadline_mid_search_keeps_found_sets() {
        let decision = wide_panel().await;
        let engine = engine();
        let report = engine.search(
            &decision,
            CounterfactualMode::Plausible,
            5,
            12,
            Duration::from_millis(250),
        );

        assert!(!report.within_timeout);
        assert!(!report.results.is_empty());
        assert!(report.candidates_evaluated > 0);
        for result in &report.results {
            assert_eq!(result.changed_factors.len(), 2);
            assert!(engine.is_valid(&decision, result));
            let replayed = engine.replay(&decision, &result.changed_factors).unwrap();
            assert_eq!(replayed.final_verdict, Verdict::Deny);
        }
    }

    #[tokio::test]
    async fn test_plausible_stops_when_every_single_flips() {
        let mut bundles: Vec<(String, Verdict, f64)> = (0..20)
            .map(|i| (format!("allow-{:02}", i), Verdict::Allow, 0.1))
            .collect();
        for i in 0..3 {
            bundles.push((format!("deny-{}", i), Verdict::Deny, 0.65));
        }
        let decision = decide(bundles.iter().map(|(n, v, c)| (n.as_str(), *v, *c)).collect()).await;

        let report = engine().search(&decision, CounterfactualMode::Plausible, 3, 10, long());
        assert!(report.within_timeout);
        assert_eq!(report.candidates_evaluated, 20);
        assert_eq!(report.results.len(), 3);
        assert!(report.results.iter().all(|r| r.changed_factors.len() == 1));
    }

    #[tokio::test]
    async fn test_unanimous_targets_tie_order() {
        let decision = decide(vec![("a", Verdict::Allow, 0.9), ("b", Verdict::Allow, 0.6)]).await;
        let report = engine().search(&decision, CounterfactualMode::Nearest, 1, 3, long());
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].counterfactual_verdict, Verdict::Deny);
    }

    #[tokio::test]
    async fn test_all_error_decision_has_no_counterfactuals() {
        let input = CaseInput::new("case-cf", "anything");
        let decision = Aggregator::new()
            .aggregate(vec![EvidenceBundle::error(
                "a",
                FailureKind::CriticFailed,
                "down",
                input.snapshot(),
            )])
            .await
            .unwrap();

        let report = engine().search(&decision, CounterfactualMode::Minimal, 3, 3, long());
        assert!(report.results.is_empty());
        assert!(report.within_timeout);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("nearest".parse::<CounterfactualMode>().unwrap(), CounterfactualMode::Nearest);
        assert_eq!(CounterfactualMode::Plausible.to_string(), "PLAUSIBLE");
        assert!("closest".parse::<CounterfactualMode>().is_err());
    }
}
