//! End-to-end tests driving the tribunal with mock critics.

use std::sync::Arc;
use std::time::Duration;

use critic::{CriticMetadata, MockCritic};
use evidence::{
    CaseInput, DecisionStatus, EscalationTrigger, EvidenceBundle, FailureKind,
    InMemoryPrecedentStore, Precedent, PrecedentStore, Verdict, PRECEDENT_CONFLICT_FLAG,
    PRECEDENT_DEGRADED_FLAG,
};
use tribunal::{
    Aggregator, CounterfactualMode, EscalationPriority, EscalationStatus, Explanation,
    ExplanationRequest, PrecedentPromotionHook, QueueFilter, QueueSort, ReviewerFeedback,
    Tribunal, TribunalConfig, TribunalError,
};

fn scenario_a_critics() -> Vec<MockCritic> {
    vec![
        MockCritic::new("alpha", Verdict::Allow, 0.9),
        MockCritic::new("bravo", Verdict::Allow, 0.8),
        MockCritic::new("charlie", Verdict::Deny, 0.95)
            .with_justification("Amount exceeds the reviewer's signing authority"),
    ]
}

async fn tribunal_with(critics: Vec<MockCritic>) -> Tribunal {
    let mut builder = Tribunal::builder();
    for critic in critics {
        builder = builder.with_critic(Arc::new(critic), CriticMetadata::default());
    }
    builder.build().await.unwrap()
}

fn case(id: &str) -> CaseInput {
    CaseInput::new(id, "Approve a 40,000 EUR vendor payment")
        .with_context("amount", 40_000)
        .with_context("vendor_age_days", 3)
}

#[tokio::test]
async fn test_scenario_a_weighted_vote() {
    let tribunal = tribunal_with(scenario_a_critics()).await;
    let decision = tribunal.evaluate(&case("scenario-a")).await.unwrap();

    assert_eq!(decision.final_verdict, Verdict::Allow);
    assert!((decision.confidence - 1.7 / 2.65).abs() < 1e-9);
    assert!((decision.dissent_index - 0.95 / 2.65).abs() < 1e-9);
    assert!((decision.confidence - 0.642).abs() < 1e-3);
    assert!((decision.dissent_index - 0.358).abs() < 1e-3);
    assert_eq!(decision.status, DecisionStatus::Decided);
    assert!(!decision.requires_escalation);
    assert_eq!(decision.evidence.len(), 3);
}

#[tokio::test]
async fn test_scenario_b_all_critics_fail() {
    let tribunal = tribunal_with(vec![
        MockCritic::new("alpha", Verdict::Allow, 0.9).failing("model offline"),
        MockCritic::new("bravo", Verdict::Allow, 0.9).failing("quota exhausted"),
    ])
    .await;

    let decision = tribunal.evaluate(&case("scenario-b")).await.unwrap();

    assert_eq!(decision.final_verdict, Verdict::Escalate);
    assert_eq!(decision.confidence, 0.0);
    assert!(decision.requires_escalation);
    assert_eq!(decision.status, DecisionStatus::Undecidable);
    assert!(decision.escalation_triggers.contains(&EscalationTrigger::AllCriticsFailed));
    assert!(decision
        .evidence
        .iter()
        .all(|b| b.failure_kind() == Some(FailureKind::CriticFailed)));

    let bundle = tribunal.escalation_for("scenario-b").await.unwrap();
    assert!(bundle.priority >= EscalationPriority::High);
    assert_eq!(bundle.status, EscalationStatus::Pending);
}

#[tokio::test]
async fn test_scenario_c_nearest_counterfactual() {
    let tribunal = tribunal_with(scenario_a_critics()).await;
    let decision = tribunal.evaluate(&case("scenario-c")).await.unwrap();

    let request = ExplanationRequest::counterfactual(CounterfactualMode::Nearest);
    let Explanation::Counterfactual(report) = tribunal.explain(&decision, &request).unwrap() else {
        panic!("expected a counterfactual report");
    };

    assert!(report.within_timeout);
    assert_eq!(report.results.len(), 1);
    let nearest = &report.results[0];
    assert_eq!(nearest.counterfactual_verdict, Verdict::Deny);
    assert_eq!(nearest.changed_factors.len(), 1);
    assert_eq!(nearest.changed_factors[0].critic_name, "bravo");
    assert!((nearest.weight_margin - 0.85).abs() < 1e-9);
    assert!(tribunal.explainer().counterfactuals().is_valid(&decision, nearest));
}

#[tokio::test]
async fn test_counterfactual_round_trip() {
    let tribunal = tribunal_with(scenario_a_critics()).await;
    let decision = tribunal.evaluate(&case("round-trip")).await.unwrap();

    for mode in [
        CounterfactualMode::Nearest,
        CounterfactualMode::Minimal,
        CounterfactualMode::Diverse,
        CounterfactualMode::Plausible,
    ] {
        let request = ExplanationRequest::counterfactual(mode);
        let Explanation::Counterfactual(report) = tribunal.explain(&decision, &request).unwrap() else {
            panic!("expected a counterfactual report");
        };
        assert!(!report.results.is_empty(), "{} found nothing", mode);

        for result in &report.results {
            let replayed = tribunal
                .explainer()
                .counterfactuals()
                .replay(&decision, &result.changed_factors)
                .unwrap();
            assert_eq!(replayed.final_verdict, result.counterfactual_verdict);
            assert_eq!(
                replayed.confidence.to_bits(),
                result.counterfactual_confidence.to_bits()
            );
        }
    }
}

#[tokio::test]
async fn test_attribution_is_stable() {
    let tribunal = tribunal_with(scenario_a_critics()).await;
    let decision = tribunal.evaluate(&case("attribution")).await.unwrap();

    let Explanation::Attribution(first) = tribunal
        .explain(&decision, &ExplanationRequest::attribution())
        .unwrap()
    else {
        panic!("expected an attribution report");
    };
    let Explanation::Attribution(second) = tribunal
        .explain(&decision, &ExplanationRequest::attribution())
        .unwrap()
    else {
        panic!("expected an attribution report");
    };

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.features, second.features);
    // charlie mentions the amount and disagrees with ALLOW
    let amount = first.feature("amount").unwrap();
    assert!(amount.contributions["charlie"] < 0.0);
}

#[tokio::test]
async fn test_aggregation_is_deterministic() {
    let input = case("determinism");
    let bundles = vec![
        EvidenceBundle::new("alpha", Verdict::Allow, 0.7, &input),
        EvidenceBundle::new("bravo", Verdict::Deny, 0.6, &input),
        EvidenceBundle::new("charlie", Verdict::Abstain, 0.3, &input),
        EvidenceBundle::error("delta", FailureKind::CriticTimeout, "timed out", input.snapshot()),
    ];
    let mut reversed = bundles.clone();
    reversed.reverse();

    let aggregator = Aggregator::new();
    let a = aggregator.aggregate(bundles).await.unwrap();
    let b = aggregator.aggregate(reversed).await.unwrap();

    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_eq!(a.evidence, b.evidence);
    assert_eq!(a.confidence.to_bits(), b.confidence.to_bits());
}

#[tokio::test]
async fn test_single_verdict_has_no_dissent() {
    let aggregator = Aggregator::new();
    let input = case("single");

    for verdict in [Verdict::Allow, Verdict::Deny, Verdict::Abstain, Verdict::Escalate] {
        for confidences in [vec![0.9], vec![0.2, 0.4], vec![1.0, 0.5, 0.01]] {
            let bundles = confidences
                .iter()
                .enumerate()
                .map(|(i, c)| EvidenceBundle::new(format!("critic-{}", i), verdict, *c, &input))
                .collect();
            let decision = aggregator.aggregate(bundles).await.unwrap();
            assert_eq!(decision.final_verdict, verdict);
            assert_eq!(decision.dissent_index, 0.0);
        }
    }
}

#[tokio::test]
async fn test_scores_stay_in_bounds() {
    let aggregator = Aggregator::new();
    let input = case("bounds");
    let verdicts = [Verdict::Allow, Verdict::Deny, Verdict::Abstain, Verdict::Escalate];

    for seed in 0..40usize {
        let bundles: Vec<EvidenceBundle> = (0..(seed % 5 + 1))
            .map(|i| {
                let verdict = verdicts[(seed + i * 3) % verdicts.len()];
                let confidence = ((seed * 7 + i * 13) % 11) as f64 / 10.0;
                EvidenceBundle::new(format!("critic-{}", i), verdict, confidence.min(1.0), &input)
            })
            .collect();

        let decision = aggregator.aggregate(bundles).await.unwrap();
        assert!((0.0..=1.0).contains(&decision.confidence));
        assert!((0.0..=1.0).contains(&decision.dissent_index));
        assert_ne!(decision.final_verdict, Verdict::Error);
    }
}

#[tokio::test]
async fn test_escalation_is_idempotent_per_case() {
    let tribunal = tribunal_with(vec![
        MockCritic::new("alpha", Verdict::Allow, 0.6),
        MockCritic::new("bravo", Verdict::Deny, 0.5),
    ])
    .await;

    let first = tribunal.evaluate(&case("split")).await.unwrap();
    let second = tribunal.evaluate(&case("split")).await.unwrap();
    assert!(first.requires_escalation);
    assert_eq!(first.escalation_ref, second.escalation_ref);

    let again = tribunal.escalate(&second).await.unwrap();
    assert_eq!(Some(again.bundle_id.clone()), first.escalation_ref);

    let queue = tribunal
        .review_queue(QueueFilter::All, QueueSort::PriorityDesc, None)
        .await;
    assert_eq!(queue.len(), 1);
    assert_eq!(tribunal.escalation_stats().await.total, 1);
}

#[tokio::test]
async fn test_escalation_exists_only_when_required() {
    let tribunal = tribunal_with(scenario_a_critics()).await;
    let decision = tribunal.evaluate(&case("no-escalation")).await.unwrap();

    assert!(!decision.requires_escalation);
    assert!(tribunal.escalation_for("no-escalation").await.is_none());
    assert!(matches!(
        tribunal.escalate(&decision).await,
        Err(TribunalError::EscalationNotRequired(_))
    ));
}

#[tokio::test]
async fn test_feedback_promotes_precedent() {
    let store = Arc::new(InMemoryPrecedentStore::new());
    let tribunal = Tribunal::builder()
        .with_critic(
            Arc::new(MockCritic::new("alpha", Verdict::Allow, 0.6)),
            CriticMetadata::default(),
        )
        .with_critic(
            Arc::new(MockCritic::new("bravo", Verdict::Deny, 0.5)),
            CriticMetadata::default(),
        )
        .precedent_store(store.clone())
        .with_hook(Arc::new(PrecedentPromotionHook::new(store.clone())))
        .build()
        .await
        .unwrap();

    let decision = tribunal.evaluate(&case("reviewed")).await.unwrap();
    let bundle_id = decision.escalation_ref.clone().unwrap();

    let ack = tribunal
        .submit_feedback(
            &bundle_id,
            ReviewerFeedback::new(Verdict::Deny, 0.95, "Vendor is not yet verified").with_reviewer("r-17"),
        )
        .await
        .unwrap();
    assert_eq!(ack.status, EscalationStatus::Resolved);
    assert!(ack.hook_failures.is_empty());
    assert_eq!(store.count().await, 1);

    assert!(tribunal
        .review_queue(QueueFilter::Pending, QueueSort::PriorityDesc, None)
        .await
        .is_empty());
    assert!(matches!(
        tribunal
            .submit_feedback(&bundle_id, ReviewerFeedback::new(Verdict::Allow, 0.5, "Second opinion"))
            .await,
        Err(TribunalError::AlreadyResolved(_))
    ));
}

#[tokio::test]
async fn test_precedent_conflict_raises_dissent() {
    let store = Arc::new(InMemoryPrecedentStore::new());
    let input = case("conflict");
    store
        .append(Precedent::new(input.snapshot(), Verdict::Deny, 0.9))
        .await
        .unwrap();

    let mut builder = Tribunal::builder().precedent_store(store.clone());
    for critic in scenario_a_critics() {
        builder = builder.with_critic(Arc::new(critic), CriticMetadata::default());
    }
    let tribunal = builder.build().await.unwrap();

    let decision = tribunal.evaluate(&input).await.unwrap();
    assert_eq!(decision.final_verdict, Verdict::Allow);
    assert!(decision.has_flag(PRECEDENT_CONFLICT_FLAG));
    assert!((decision.dissent_index - (0.95 / 2.65 + 0.15)).abs() < 1e-9);
    assert!(decision.requires_escalation);
    assert_eq!(decision.precedents_applied.len(), 1);
}

#[tokio::test]
async fn test_precedent_store_outage_degrades() {
    let store = Arc::new(InMemoryPrecedentStore::new());
    store.set_available(false);

    let mut builder = Tribunal::builder().precedent_store(store.clone());
    for critic in scenario_a_critics() {
        builder = builder.with_critic(Arc::new(critic), CriticMetadata::default());
    }
    let tribunal = builder.build().await.unwrap();

    let decision = tribunal.evaluate(&case("outage")).await.unwrap();
    assert_eq!(decision.final_verdict, Verdict::Allow);
    assert!(decision.degraded_mode);
    assert_eq!(decision.status, DecisionStatus::Degraded);
    assert!(decision.has_flag(PRECEDENT_DEGRADED_FLAG));
}

#[tokio::test]
async fn test_slow_and_malformed_critics_degrade() {
    let tribunal = Tribunal::builder()
        .with_critic(
            Arc::new(MockCritic::new("steady", Verdict::Deny, 0.8)),
            CriticMetadata::default(),
        )
        .with_critic(
            Arc::new(MockCritic::new("slow", Verdict::Allow, 0.9).with_delay(Duration::from_millis(500))),
            CriticMetadata::default().with_timeout_ms(20),
        )
        .with_critic(
            Arc::new(MockCritic::new("garbled", Verdict::Allow, 0.9).with_raw_confidence(1.7)),
            CriticMetadata::default(),
        )
        .with_critic(
            Arc::new(MockCritic::new("crashy", Verdict::Allow, 0.9).panicking()),
            CriticMetadata::default(),
        )
        .build()
        .await
        .unwrap();

    let decision = tribunal.evaluate(&case("flaky")).await.unwrap();

    assert_eq!(decision.final_verdict, Verdict::Deny);
    assert_eq!(decision.status, DecisionStatus::Degraded);
    assert_eq!(decision.error_count(), 3);
    assert_eq!(
        decision.evidence_for("slow").and_then(|b| b.failure_kind()),
        Some(FailureKind::CriticTimeout)
    );
    assert_eq!(
        decision.evidence_for("garbled").and_then(|b| b.failure_kind()),
        Some(FailureKind::CriticMalformedOutput)
    );
    assert_eq!(
        decision.evidence_for("crashy").and_then(|b| b.failure_kind()),
        Some(FailureKind::CriticFailed)
    );

    let stats = tribunal.collector_stats().await;
    assert_eq!(stats.timeouts, 1);
    assert_eq!(stats.malformed, 1);
}

#[tokio::test]
async fn test_mandatory_critic_failure_is_critical() {
    let tribunal = Tribunal::builder()
        .with_critic(
            Arc::new(MockCritic::new("safety", Verdict::Allow, 0.9).failing("classifier crashed")),
            CriticMetadata::mandatory(),
        )
        .with_critic(
            Arc::new(MockCritic::new("ops", Verdict::Allow, 0.4)),
            CriticMetadata::default(),
        )
        .build()
        .await
        .unwrap();

    let decision = tribunal.evaluate(&case("mandatory")).await.unwrap();
    assert!(decision.requires_escalation);

    let bundle = tribunal.escalation_for("mandatory").await.unwrap();
    assert_eq!(bundle.priority, EscalationPriority::Critical);
}

#[test]
fn test_invalid_configuration_is_fatal() {
    let yaml = r#"
aggregator:
  tie_break_order: [DENY, ALLOW]
"#;
    assert!(matches!(TribunalConfig::load(yaml), Err(TribunalError::Config(_))));

    let mut config = TribunalConfig::default();
    config.explain.max_counterfactuals = 0;
    let result = tokio_test::block_on(Tribunal::builder().config(config).build());
    assert!(matches!(result, Err(TribunalError::Config(_))));
}
