//! Evidence collector - runs the critic panel.
//!
//! Each critic runs in its own task with its own timeout. Whatever happens
//! inside a critic (timeout, error, malformed bundle, panic) the collector
//! returns exactly one bundle per critic, in registry order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, warn};

use critic::{CriticError, RegisteredCritic};
use evidence::{CaseInput, EvidenceBundle, FailureKind, InputSnapshot, Verdict};

use crate::config::CollectorConfig;

/// Timing of one critic invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticTiming {
    /// Critic name
    pub critic_name: String,
    /// Case evaluated
    pub case_id: String,
    /// Wall-clock duration
    pub duration_ms: u64,
    /// Verdict recorded (ERROR on failure)
    pub verdict: Verdict,
    /// Failure kind, if the critic failed
    pub failure: Option<FailureKind>,
    /// When the invocation finished
    pub timestamp: DateTime<Utc>,
}

/// Collector statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectorStats {
    /// Collections performed
    pub collections: u64,
    /// Critic invocations
    pub critic_calls: u64,
    /// Invocations that timed out
    pub timeouts: u64,
    /// Invocations that returned malformed bundles
    pub malformed: u64,
    /// Invocations that errored or panicked
    pub failures: u64,
}

/// Runs critics concurrently and normalizes their output.
pub struct EvidenceCollector {
    config: CollectorConfig,
    semaphore: Arc<Semaphore>,
    timings: Arc<RwLock<VecDeque<CriticTiming>>>,
    stats: Arc<RwLock<CollectorStats>>,
}

impl EvidenceCollector {
    /// Create a new collector with default configuration.
    pub fn new() -> Self {
        Self::with_config(CollectorConfig::default())
    }

    /// Create with custom configuration.
    pub fn with_config(config: CollectorConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            config,
            semaphore,
            timings: Arc::new(RwLock::new(VecDeque::new())),
            stats: Arc::new(RwLock::new(CollectorStats::default())),
        }
    }

    /// Collect evidence using the configured per-critic timeout.
    pub async fn collect_default(
        &self,
        input: &CaseInput,
        critics: &[RegisteredCritic],
    ) -> Vec<EvidenceBundle> {
        let timeout = Duration::from_millis(self.config.timeout_per_critic_ms);
        self.collect(input, critics, timeout).await
    }

    /// Collect evidence from every critic.
    ///
    /// A critic's own `timeout_ms` override takes precedence over
    /// `timeout_per_critic`. The result has one bundle per critic, in the
    /// order the critics were given.
    pub async fn collect(
        &self,
        input: &CaseInput,
        critics: &[RegisteredCritic],
        timeout_per_critic: Duration,
    ) -> Vec<EvidenceBundle> {
        let snapshot = input.snapshot();
        let shared_input = Arc::new(input.clone());

        let handles: Vec<_> = critics
            .iter()
            .map(|registered| {
                let critic = Arc::clone(&registered.critic);
                let input = Arc::clone(&shared_input);
                let semaphore = Arc::clone(&self.semaphore);
                let timeout = registered
                    .metadata
                    .timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(timeout_per_critic);

                debug!(critic = %registered.name(), case_id = %input.case_id, "Invoking critic");

                tokio::spawn(async move {
                    // The semaphore is never closed, so a failed acquire only
                    // drops the concurrency bound.
                    let _permit = semaphore.acquire_owned().await.ok();
                    let start = Instant::now();
                    let outcome = tokio::time::timeout(timeout, critic.evaluate(&input)).await;
                    (outcome, start.elapsed(), timeout)
                })
            })
            .collect();

        let joined = futures::future::join_all(handles).await;

        let mut bundles = Vec::with_capacity(critics.len());
        let mut timings = Vec::with_capacity(critics.len());
        let mut stats = CollectorStats {
            collections: 1,
            critic_calls: critics.len() as u64,
            ..Default::default()
        };

        for (registered, result) in critics.iter().zip(joined) {
            let name = registered.name();
            let (bundle, duration_ms) = match result {
                Ok((Ok(Ok(bundle)), elapsed, _)) => {
                    let elapsed_ms = elapsed.as_millis() as u64;
                    (Self::check_bundle(name, bundle, &snapshot, elapsed_ms), elapsed_ms)
                }
                Ok((Ok(Err(e)), elapsed, _)) => {
                    let kind = match &e {
                        CriticError::Timeout(_) => FailureKind::CriticTimeout,
                        CriticError::MalformedOutput(_) => FailureKind::CriticMalformedOutput,
                        CriticError::Unavailable(_) | CriticError::EvaluationFailed(_) => {
                            FailureKind::CriticFailed
                        }
                    };
                    warn!(critic = %name, error = %e, "Critic returned an error");
                    let elapsed_ms = elapsed.as_millis() as u64;
                    let bundle = EvidenceBundle::error(name, kind, e.to_string(), snapshot.clone())
                        .with_execution_time(elapsed_ms);
                    (bundle, elapsed_ms)
                }
                Ok((Err(_), elapsed, timeout)) => {
                    warn!(critic = %name, timeout_ms = timeout.as_millis() as u64, "Critic timed out");
                    let elapsed_ms = elapsed.as_millis() as u64;
                    let bundle = EvidenceBundle::error(
                        name,
                        FailureKind::CriticTimeout,
                        format!("Critic exceeded its {}ms timeout", timeout.as_millis()),
                        snapshot.clone(),
                    )
                    .with_execution_time(elapsed_ms);
                    (bundle, elapsed_ms)
                }
                Err(join_error) => {
                    let reason = if join_error.is_panic() {
                        "Critic panicked during evaluation".to_string()
                    } else {
                        format!("Critic task aborted: {}", join_error)
                    };
                    warn!(critic = %name, reason = %reason, "Critic task failed");
                    let bundle =
                        EvidenceBundle::error(name, FailureKind::CriticFailed, reason, snapshot.clone());
                    (bundle, 0)
                }
            };

            match bundle.failure_kind() {
                Some(FailureKind::CriticTimeout) => stats.timeouts += 1,
                Some(FailureKind::CriticMalformedOutput) => stats.malformed += 1,
                Some(FailureKind::CriticFailed) => stats.failures += 1,
                None => {}
            }

            debug!(
                critic = %name,
                duration_ms = duration_ms,
                verdict = %bundle.verdict,
                "Critic finished"
            );

            timings.push(CriticTiming {
                critic_name: name.to_string(),
                case_id: input.case_id.clone(),
                duration_ms,
                verdict: bundle.verdict,
                failure: bundle.failure_kind(),
                timestamp: Utc::now(),
            });
            bundles.push(bundle);
        }

        self.record(timings, stats).await;
        bundles
    }

    /// Validate a returned bundle, replacing it with an ERROR bundle if it
    /// violates the schema or describes a different input.
    fn check_bundle(
        name: &str,
        bundle: EvidenceBundle,
        snapshot: &InputSnapshot,
        elapsed_ms: u64,
    ) -> EvidenceBundle {
        let violation = match bundle.validate(name) {
            Err(v) => Some(v.to_string()),
            Ok(()) if bundle.verdict.is_error() => {
                Some("Critic reported ERROR without a failure".to_string())
            }
            Ok(()) if bundle.input_snapshot.content_hash != snapshot.content_hash => {
                Some("Bundle input snapshot does not match the case".to_string())
            }
            Ok(()) => None,
        };

        match violation {
            Some(reason) => {
                warn!(critic = %name, reason = %reason, "Critic returned malformed output");
                EvidenceBundle::error(
                    name,
                    FailureKind::CriticMalformedOutput,
                    reason,
                    snapshot.clone(),
                )
                .with_execution_time(elapsed_ms)
            }
            None if bundle.metadata.execution_time_ms == 0 => bundle.with_execution_time(elapsed_ms),
            None => bundle,
        }
    }

    async fn record(&self, timings: Vec<CriticTiming>, delta: CollectorStats) {
        {
            let mut history = self.timings.write().await;
            history.extend(timings);
            while history.len() > self.config.timing_history {
                history.pop_front();
            }
        }

        let mut stats = self.stats.write().await;
        stats.collections += delta.collections;
        stats.critic_calls += delta.critic_calls;
        stats.timeouts += delta.timeouts;
        stats.malformed += delta.malformed;
        stats.failures += delta.failures;
    }

    /// Recent critic timings, oldest first.
    pub async fn timings(&self) -> Vec<CriticTiming> {
        self.timings.read().await.iter().cloned().collect()
    }

    /// Timings for one critic.
    pub async fn timings_for(&self, critic_name: &str) -> Vec<CriticTiming> {
        self.timings
            .read()
            .await
            .iter()
            .filter(|t| t.critic_name == critic_name)
            .cloned()
            .collect()
    }

    /// Get collector statistics.
    pub async fn stats(&self) -> CollectorStats {
        self.stats.read().await.clone()
    }
}

impl Default for EvidenceCollector {
    fn default() -> Self {
        Self::new()
    }
}
