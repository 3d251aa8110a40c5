//! Heuristic feature attribution.
//!
//! For every critic and every context feature of the case:
//! `importance = (base + bonus if the justification mentions the feature)
//! × confidence`, positive when the critic agrees with the final verdict and
//! negative otherwise. A feature's attribution is the mean over non-error
//! critics. This is a cheap approximation and makes no Shapley guarantees.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::debug;

use evidence::{content_hash, Decision, EvidenceBundle, Verdict};

use crate::config::ExplainConfig;

/// Attribution for one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureAttribution {
    /// Context key
    pub feature: String,
    /// Mean signed importance across critics
    pub importance: f64,
    /// Signed importance per critic
    pub contributions: BTreeMap<String, f64>,
}

/// Attribution over every feature of a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionReport {
    /// Case explained
    pub case_id: String,
    /// Verdict being explained
    pub final_verdict: Verdict,
    /// Features by descending absolute importance, then name
    pub features: Vec<FeatureAttribution>,
    /// Critics that contributed
    pub critics_considered: usize,
    /// Whether every critic contribution came from the cache
    pub cached: bool,
    /// Computation time
    pub computation_time_ms: u64,
}

impl AttributionReport {
    /// Attribution for a feature.
    pub fn feature(&self, name: &str) -> Option<&FeatureAttribution> {
        self.features.iter().find(|f| f.feature == name)
    }
}

struct CacheEntry {
    contributions: BTreeMap<String, f64>,
    sequence: u64,
}

/// Heuristic attribution engine with a content-addressed cache.
pub struct AttributionEngine {
    base: f64,
    mention_bonus: f64,
    capacity: usize,
    cache: DashMap<String, CacheEntry>,
    sequence: AtomicU64,
}

impl AttributionEngine {
    /// Create a new engine with default configuration.
    pub fn new() -> Self {
        Self::with_config(&ExplainConfig::default())
    }

    /// Create with custom configuration.
    pub fn with_config(config: &ExplainConfig) -> Self {
        Self {
            base: config.attribution_base,
            mention_bonus: config.attribution_mention_bonus,
            capacity: config.cache_capacity,
            cache: DashMap::new(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Number of cached critic entries.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Clear the cache.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Attribute the decision's final verdict to the case features.
    pub fn attribute(&self, decision: &Decision) -> AttributionReport {
        let start = Instant::now();
        let features = decision
            .input_snapshot()
            .map(|s| s.features())
            .unwrap_or_default();

        let critics: Vec<&EvidenceBundle> = decision
            .evidence
            .iter()
            .filter(|b| !b.verdict.is_error())
            .collect();

        let mut per_critic: Vec<(String, BTreeMap<String, f64>)> = Vec::with_capacity(critics.len());
        let mut hits = 0;
        for bundle in &critics {
            let agrees = bundle.verdict == decision.final_verdict;
            let (contributions, hit) = self.critic_contributions(bundle, &features, agrees);
            if hit {
                hits += 1;
            }
            per_critic.push((bundle.critic_name.clone(), contributions));
        }

        let mut attributions: Vec<FeatureAttribution> = features
            .iter()
            .map(|feature| {
                let contributions: BTreeMap<String, f64> = per_critic
                    .iter()
                    .map(|(critic, values)| {
                        (critic.clone(), values.get(feature).copied().unwrap_or(0.0))
                    })
                    .collect();
                let importance = if contributions.is_empty() {
                    0.0
                } else {
                    contributions.values().sum::<f64>() / contributions.len() as f64
                };
                FeatureAttribution {
                    feature: feature.clone(),
                    importance,
                    contributions,
                }
            })
            .collect();

        attributions.sort_by(|a, b| {
            b.importance
                .abs()
                .partial_cmp(&a.importance.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.feature.cmp(&b.feature))
        });

        let cached = !critics.is_empty() && hits == critics.len();
        debug!(
            case_id = %decision.case_id,
            features = attributions.len(),
            critics = critics.len(),
            cached = cached,
            "Attribution computed"
        );

        AttributionReport {
            case_id: decision.case_id.clone(),
            final_verdict: decision.final_verdict,
            features: attributions,
            critics_considered: critics.len(),
            cached,
            computation_time_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Signed importance of each feature for one critic, and whether it was
    /// served from the cache.
    fn critic_contributions(
        &self,
        bundle: &EvidenceBundle,
        features: &[String],
        agrees: bool,
    ) -> (BTreeMap<String, f64>, bool) {
        let key = content_hash(&(
            &bundle.critic_name,
            features,
            &bundle.justification,
            bundle.confidence.to_bits(),
            agrees,
        ));

        if let Some(entry) = self.cache.get(&key) {
            return (entry.contributions.clone(), true);
        }

        let justification = bundle.justification.to_lowercase();
        let sign = if agrees { 1.0 } else { -1.0 };
        let contributions: BTreeMap<String, f64> = features
            .iter()
            .map(|feature| {
                let lowered = feature.to_lowercase();
                let mentioned = justification.contains(&lowered)
                    || justification.contains(&lowered.replace('_', " "));
                let raw = self.base + if mentioned { self.mention_bonus } else { 0.0 };
                (feature.clone(), sign * raw * bundle.confidence)
            })
            .collect();

        self.insert(key, contributions.clone());
        (contributions, false)
    }

    fn insert(&self, key: String, contributions: BTreeMap<String, f64>) {
        if self.capacity == 0 {
            return;
        }
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);

        // Drop the older half once full
        if self.cache.len() >= self.capacity {
            let cutoff = sequence.saturating_sub((self.capacity / 2) as u64);
            self.cache.retain(|_, entry| entry.sequence >= cutoff);
        }

        self.cache.insert(
            key,
            CacheEntry {
                contributions,
                sequence,
            },
        );
    }
}

impl Default for AttributionEngine {
    fn default() -> Self {
        Self::new()
    }
}
