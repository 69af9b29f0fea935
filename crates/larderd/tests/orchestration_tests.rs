//! Deterministic orchestration tests.
//!
//! These tests use FakeCapability, FakeContextProvider and RecordingSink to
//! verify orchestration flows without any network or model calls.

use larder_shared::capability::CapabilityKind;
use larder_shared::error::LarderError;
use larder_shared::pipeline::PipelineState;
use larder_shared::request::{Request, RequestInput};
use larder_shared::validation::{ValidationLevel, ValidationOutcome};
use larderd::capability::{Capability, CapabilityPolicy, Registry};
use larderd::fakes::{FakeCapability, FakeContextProvider, FakeReply, RecordingSink};
use larderd::orchestrator::Orchestrator;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const SALSA_JSON: &str = r#"{"title": "Salsa", "ingredients": ["2 tomatoes", "1 onion", "1 clove garlic"]}"#;
const CHEESY_JSON: &str = r#"{"title": "Salsa", "ingredients": ["tomato", "onion", "cheese"]}"#;

struct Harness {
    orchestrator: Orchestrator,
    sink: RecordingSink,
    capability: Arc<FakeCapability>,
    provider: Arc<FakeContextProvider>,
}

fn harness(capability: FakeCapability, policy: CapabilityPolicy, provider: FakeContextProvider) -> Harness {
    let capability = Arc::new(capability);
    let provider = Arc::new(provider);
    let sink = RecordingSink::new();

    let mut registry = Registry::new();
    registry.register_with_policy(capability.name().to_string(), capability.clone(), policy);

    let orchestrator = Orchestrator::new(Arc::new(registry), provider.clone(), Arc::new(sink.clone()));
    Harness {
        orchestrator,
        sink,
        capability,
        provider,
    }
}

fn pantry() -> FakeContextProvider {
    FakeContextProvider::inventory(&["tomato", "onion", "garlic"])
}

fn recipe_request(level: ValidationLevel) -> Request {
    Request::new("session-1", RequestInput::text("What can I cook?"), level).with_hint("recipe")
}

fn policy(timeout_ms: u64, retries: u32, fallback_safe: bool) -> CapabilityPolicy {
    CapabilityPolicy {
        timeout_ms,
        retries,
        fallback_safe,
    }
}

// ============================================================================
// Outcomes
// ============================================================================

#[tokio::test]
async fn test_grounded_recipe_passes_through() {
    let h = harness(
        FakeCapability::replying("recipe", CapabilityKind::Recipe, SALSA_JSON),
        CapabilityPolicy::default(),
        pantry(),
    );

    let response = h.orchestrator.handle(&recipe_request(ValidationLevel::Strict)).await.unwrap();
    assert_eq!(response.outcome, ValidationOutcome::Pass);
    assert_eq!(response.confidence, 1.0);
    assert_eq!(response.text, SALSA_JSON);
    assert_eq!(response.capability, "recipe");

    assert_eq!(
        h.sink.states(),
        vec![
            PipelineState::Received,
            PipelineState::Resolved,
            PipelineState::Generating,
            PipelineState::Extracting,
            PipelineState::Validating,
            PipelineState::Responding(ValidationOutcome::Pass),
            PipelineState::Done,
        ]
    );
    let events = h.sink.validation_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].level, ValidationLevel::Strict);
    assert_eq!(events[0].capability, "recipe");
    assert!(events[0].reason.is_none());
}

#[tokio::test]
async fn test_strict_ungrounded_claim_falls_back() {
    let h = harness(
        FakeCapability::replying("recipe", CapabilityKind::Recipe, CHEESY_JSON),
        CapabilityPolicy::default(),
        pantry(),
    );

    let response = h.orchestrator.handle(&recipe_request(ValidationLevel::Strict)).await.unwrap();
    assert_eq!(response.outcome, ValidationOutcome::Fallback);
    assert!(!response.text.to_lowercase().contains("cheese"));
    assert!(response.text.contains("tomato, onion, garlic"));
    assert_eq!(response.flagged_claims.len(), 1);

    let events = h.sink.validation_events();
    assert_eq!(events[0].reason.as_deref(), Some("validation_failed"));
}

#[tokio::test]
async fn test_lenient_flags_but_passes() {
    let h = harness(
        FakeCapability::replying("recipe", CapabilityKind::Recipe, CHEESY_JSON),
        CapabilityPolicy::default(),
        pantry(),
    );

    let response = h.orchestrator.handle(&recipe_request(ValidationLevel::Lenient)).await.unwrap();
    assert_eq!(response.outcome, ValidationOutcome::Pass);
    assert_eq!(response.text, CHEESY_JSON);
    assert!((response.confidence - 0.6667).abs() < 1e-3);
    assert_eq!(response.flagged_claims[0].claim.key, "cheese");
}

#[tokio::test]
async fn test_moderate_repairs_structured_output() {
    let text = "Tomato salad\n\n- 2 tomatoes\n- 1 onion\n- 1 cup feta cheese\n\nToss and serve.";
    let h = harness(
        FakeCapability::scripted(
            "recipe",
            CapabilityKind::Recipe,
            vec![FakeReply::Structured(
                text.to_string(),
                json!({"ingredients": ["tomato", "onion", "feta cheese"]}),
            )],
        ),
        CapabilityPolicy::default(),
        pantry(),
    );

    let response = h.orchestrator.handle(&recipe_request(ValidationLevel::Moderate)).await.unwrap();
    assert_eq!(response.outcome, ValidationOutcome::Repaired);
    assert!(!response.text.to_lowercase().contains("feta"));
    assert!(response.text.contains("- 1 onion"));
    assert!(response.text.contains("Toss and serve."));
    for flagged in &response.flagged_claims {
        assert!(!response.text.to_lowercase().contains(&flagged.claim.key));
    }
    assert!(h.sink.states().contains(&PipelineState::Responding(ValidationOutcome::Repaired)));
}

#[tokio::test]
async fn test_unrepairable_text_falls_back() {
    let h = harness(
        FakeCapability::scripted(
            "recipe",
            CapabilityKind::Recipe,
            vec![FakeReply::Structured(
                "Use tomato, onion and cheese together.".to_string(),
                json!({"ingredients": ["tomato", "onion", "cheese"]}),
            )],
        ),
        CapabilityPolicy::default(),
        pantry(),
    );

    let response = h.orchestrator.handle(&recipe_request(ValidationLevel::Moderate)).await.unwrap();
    assert_eq!(response.outcome, ValidationOutcome::Fallback);
    assert!(!response.text.contains("cheese"));
    assert_eq!(h.sink.validation_events()[0].reason.as_deref(), Some("repair_failed"));
}

#[tokio::test]
async fn test_conversation_prose_lenient_passes_with_zero_confidence() {
    let h = harness(
        FakeCapability::replying("conversation", CapabilityKind::Conversation, "Happy cooking!"),
        CapabilityPolicy::default(),
        pantry(),
    );
    let request = Request::new("s", RequestInput::text("thanks"), ValidationLevel::Lenient);

    let response = h.orchestrator.handle(&request).await.unwrap();
    assert_eq!(response.outcome, ValidationOutcome::Pass);
    assert_eq!(response.confidence, 0.0);
    assert_eq!(response.text, "Happy cooking!");
}

#[tokio::test]
async fn test_conversation_prose_strict_falls_back() {
    let h = harness(
        FakeCapability::replying("conversation", CapabilityKind::Conversation, "Happy cooking!"),
        CapabilityPolicy::default(),
        pantry(),
    );
    let request = Request::new("s", RequestInput::text("thanks"), ValidationLevel::Strict);

    let response = h.orchestrator.handle(&request).await.unwrap();
    assert_eq!(response.outcome, ValidationOutcome::Fallback);
    assert_ne!(response.text, "Happy cooking!");
    assert_eq!(h.sink.validation_events()[0].reason.as_deref(), Some("no_claims"));
}

// ============================================================================
// Capability failures
// ============================================================================

/// Scenario C: deadline exceeded on a fallback-safe capability
#[tokio::test]
async fn test_timeout_on_fallback_safe_capability_degrades() {
    let h = harness(
        FakeCapability::slow("recipe", CapabilityKind::Recipe, 500, SALSA_JSON),
        policy(50, 0, true),
        pantry(),
    );

    let response = h.orchestrator.handle(&recipe_request(ValidationLevel::Strict)).await.unwrap();
    assert_eq!(response.outcome, ValidationOutcome::Fallback);
    assert_eq!(response.confidence, 0.0);

    let events = h.sink.validation_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].reason.as_deref(), Some("timeout"));
    assert_eq!(events[0].outcome, ValidationOutcome::Fallback);

    let states = h.sink.states();
    assert!(!states.contains(&PipelineState::Validating));
    assert_eq!(
        &states[states.len() - 3..],
        &[
            PipelineState::Generating,
            PipelineState::Responding(ValidationOutcome::Fallback),
            PipelineState::Done,
        ]
    );
}

#[tokio::test]
async fn test_timeout_surfaces_when_not_fallback_safe() {
    let h = harness(
        FakeCapability::slow("recipe", CapabilityKind::Recipe, 500, SALSA_JSON),
        policy(50, 3, false),
        pantry(),
    );

    let err = h.orchestrator.handle(&recipe_request(ValidationLevel::Strict)).await.unwrap_err();
    assert!(matches!(err, LarderError::CapabilityTimeout { timeout_ms: 50, .. }));
    assert_eq!(h.capability.calls(), 1, "timeouts are never retried");
    assert!(h.sink.validation_events().is_empty());
    assert_eq!(h.sink.states().last(), Some(&PipelineState::Failed));
}

#[tokio::test]
async fn test_capability_error_is_retried() {
    let h = harness(
        FakeCapability::scripted(
            "recipe",
            CapabilityKind::Recipe,
            vec![FakeReply::fail("connection reset"), FakeReply::text(SALSA_JSON)],
        ),
        policy(1_000, 1, false),
        pantry(),
    );

    let response = h.orchestrator.handle(&recipe_request(ValidationLevel::Strict)).await.unwrap();
    assert_eq!(response.outcome, ValidationOutcome::Pass);
    assert_eq!(h.capability.calls(), 2);
}

#[tokio::test]
async fn test_capability_error_surfaces_after_retries() {
    let h = harness(
        FakeCapability::failing("recipe", CapabilityKind::Recipe, "model not loaded"),
        policy(1_000, 2, false),
        pantry(),
    );

    let err = h.orchestrator.handle(&recipe_request(ValidationLevel::Strict)).await.unwrap_err();
    assert!(matches!(err, LarderError::CapabilityError { .. }));
    assert_eq!(h.capability.calls(), 3);

    let states = h.sink.states();
    assert!(!states.contains(&PipelineState::Validating));
    assert_eq!(&states[states.len() - 2..], &[PipelineState::Generating, PipelineState::Failed]);
    let last = h.sink.transitions().pop().unwrap();
    assert_eq!(last.reason.as_deref(), Some("capability_error"));
}

#[tokio::test]
async fn test_capability_error_on_fallback_safe_degrades() {
    let h = harness(
        FakeCapability::failing("recipe", CapabilityKind::Recipe, "model not loaded"),
        policy(1_000, 0, true),
        pantry(),
    );

    let response = h.orchestrator.handle(&recipe_request(ValidationLevel::Moderate)).await.unwrap();
    assert!(response.is_fallback());
    assert_eq!(
        h.sink.validation_events()[0].reason.as_deref(),
        Some("capability_error")
    );
}

// ============================================================================
// Resolution and context
// ============================================================================

/// Scenario D: unknown hint and no default capability
#[tokio::test]
async fn test_unknown_capability_fails_without_validation_event() {
    let h = harness(
        FakeCapability::replying("recipe", CapabilityKind::Recipe, SALSA_JSON),
        CapabilityPolicy::default(),
        pantry(),
    );
    let request = Request::new("s", RequestInput::text("weather?"), ValidationLevel::Strict)
        .with_hint("weather");

    let err = h.orchestrator.handle(&request).await.unwrap_err();
    assert!(matches!(err, LarderError::CapabilityNotFound));
    assert!(h.sink.validation_events().is_empty());
    assert_eq!(h.sink.states(), vec![PipelineState::Received, PipelineState::Failed]);
    assert_eq!(h.capability.calls(), 0);
}

#[tokio::test]
async fn test_context_unavailable_fails_before_generation() {
    let h = harness(
        FakeCapability::replying("recipe", CapabilityKind::Recipe, SALSA_JSON),
        policy(1_000, 0, true),
        FakeContextProvider::unavailable("pantry store down"),
    );

    let err = h.orchestrator.handle(&recipe_request(ValidationLevel::Strict)).await.unwrap_err();
    assert!(matches!(err, LarderError::ContextUnavailable(_)));
    assert_eq!(h.capability.calls(), 0);
    assert_eq!(h.provider.fetches(), 1);
    assert_eq!(
        h.sink.states(),
        vec![PipelineState::Received, PipelineState::Resolved, PipelineState::Failed]
    );
}

// ============================================================================
// Cancellation and concurrency
// ============================================================================

#[tokio::test]
async fn test_cancellation_stops_the_pipeline() {
    let h = harness(
        FakeCapability::slow("recipe", CapabilityKind::Recipe, 5_000, SALSA_JSON),
        policy(10_000, 0, true),
        pantry(),
    );

    let cancel = tokio::time::sleep(Duration::from_millis(20));
    let err = h
        .orchestrator
        .handle_until(&recipe_request(ValidationLevel::Strict), cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, LarderError::Cancelled));

    let last = h.sink.transitions().pop().unwrap();
    assert_eq!(last.from, PipelineState::Generating);
    assert_eq!(last.to, PipelineState::Failed);
    assert_eq!(last.reason.as_deref(), Some("cancelled"));
    assert!(h.sink.validation_events().is_empty());
}

#[tokio::test]
async fn test_handle_until_completes_when_not_cancelled() {
    let h = harness(
        FakeCapability::replying("recipe", CapabilityKind::Recipe, SALSA_JSON),
        CapabilityPolicy::default(),
        pantry(),
    );

    let response = h
        .orchestrator
        .handle_until(&recipe_request(ValidationLevel::Strict), std::future::pending())
        .await
        .unwrap();
    assert_eq!(response.outcome, ValidationOutcome::Pass);
}

#[tokio::test]
async fn test_concurrent_requests_keep_their_own_level() {
    let h = harness(
        FakeCapability::replying("recipe", CapabilityKind::Recipe, CHEESY_JSON),
        CapabilityPolicy::default(),
        pantry(),
    );
    let strict = recipe_request(ValidationLevel::Strict);
    let lenient = recipe_request(ValidationLevel::Lenient);

    let (a, b) = tokio::join!(h.orchestrator.handle(&strict), h.orchestrator.handle(&lenient));
    assert_eq!(a.unwrap().outcome, ValidationOutcome::Fallback);
    assert_eq!(b.unwrap().outcome, ValidationOutcome::Pass);

    let events = h.sink.validation_events();
    assert_eq!(events.len(), 2);
    assert!(events.iter().any(|e| e.request_id == strict.id && e.level == ValidationLevel::Strict));
    assert!(events.iter().any(|e| e.request_id == lenient.id && e.level == ValidationLevel::Lenient));
}
