//! Request orchestrator.
//!
//! Drives one request through the pipeline:
//! resolve → fetch context → generate → extract → validate → respond.
//!
//! # Failure Rules
//!
//! - Resolution failure, context failure: FAILED, error surfaced
//! - Generation error or timeout: FAILED, unless the capability is
//!   fallback-safe, in which case the request degrades to FALLBACK
//! - Everything after generation resolves to a normal response
//!
//! Each request is an independent unit of work. The registry, validator and
//! fallback generator are shared read-only; no lock is taken anywhere.

use crate::capability::{Registry, Resolved};
use crate::context_provider::ContextProvider;
use crate::sink::EventSink;
use chrono::Utc;
use larder_shared::capability::{CapabilityKind, CapabilityOutput};
use larder_shared::claims::{extract, Claim};
use larder_shared::context::GroundTruthContext;
use larder_shared::error::LarderError;
use larder_shared::event::{MonitorEvent, StateTransition, ValidationEvent};
use larder_shared::fallback::{FallbackGenerator, FallbackReason};
use larder_shared::pipeline::PipelineState;
use larder_shared::repair::strip_claims;
use larder_shared::request::Request;
use larder_shared::response::Response;
use larder_shared::validation::{ValidationOutcome, ValidationVerdict, Validator, VerdictReason};
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct Orchestrator {
    registry: Arc<Registry>,
    validator: Arc<Validator>,
    fallback: FallbackGenerator,
    provider: Arc<dyn ContextProvider>,
    sink: Arc<dyn EventSink>,
}

/// Per-request bookkeeping: current state, start time, resolved name.
struct Run<'a> {
    request: &'a Request,
    sink: &'a dyn EventSink,
    state: &'a AtomicU8,
    started: Instant,
    capability: Option<String>,
}

impl Run<'_> {
    fn state(&self) -> PipelineState {
        PipelineState::from_code(self.state.load(Ordering::SeqCst)).unwrap_or(PipelineState::Failed)
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Move to `next` and emit the transition.
    fn advance(
        &self,
        next: PipelineState,
        verdict: Option<(ValidationOutcome, f32)>,
        reason: Option<&str>,
    ) -> Result<(), LarderError> {
        let from = self.state();
        let next = from.step(next)?;
        self.state.store(next.code(), Ordering::SeqCst);
        self.sink.emit(MonitorEvent::Transition(StateTransition {
            request_id: self.request.id.clone(),
            from,
            to: next,
            level: self.request.validation_level,
            capability: self.capability.clone(),
            outcome: verdict.map(|(o, _)| o),
            confidence: verdict.map(|(_, c)| c),
            elapsed_ms: self.elapsed_ms(),
            reason: reason.map(str::to_string),
            timestamp: Utc::now(),
        }));
        Ok(())
    }

    /// Record a surfaced error as FAILED and hand it back.
    fn fail(&self, err: LarderError) -> LarderError {
        if let Err(e) = self.advance(PipelineState::Failed, None, Some(err.reason())) {
            warn!("[{}] {}", self.request.id, e);
        }
        err
    }

    fn emit_validation(&self, event: ValidationEvent) {
        self.sink.emit(MonitorEvent::Validation(event));
    }
}

impl Orchestrator {
    pub fn new(
        registry: Arc<Registry>,
        provider: Arc<dyn ContextProvider>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            registry,
            validator: Arc::new(Validator::new()),
            fallback: FallbackGenerator::default(),
            provider,
            sink,
        }
    }

    pub fn with_validator(mut self, validator: Arc<Validator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackGenerator) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Handle one request. Dropping the future abandons the request.
    pub async fn handle(&self, request: &Request) -> Result<Response, LarderError> {
        let state = AtomicU8::new(PipelineState::Received.code());
        self.run(request, &state, Instant::now()).await
    }

    /// Handle one request unless `cancel` completes first.
    ///
    /// On cancellation the pipeline is dropped, a FAILED transition with
    /// reason `cancelled` is emitted and `LarderError::Cancelled` returned.
    pub async fn handle_until<F>(&self, request: &Request, cancel: F) -> Result<Response, LarderError>
    where
        F: Future<Output = ()>,
    {
        let state = AtomicU8::new(PipelineState::Received.code());
        let started = Instant::now();
        tokio::select! {
            result = self.run(request, &state, started) => result,
            _ = cancel => {
                info!("[{}] cancelled", request.id);
                let run = Run {
                    request,
                    sink: self.sink.as_ref(),
                    state: &state,
                    started,
                    capability: self.registry.resolve(request).ok().map(|r| r.name),
                };
                if !run.state().is_terminal() {
                    run.fail(LarderError::Cancelled);
                }
                Err(LarderError::Cancelled)
            }
        }
    }

    async fn run(
        &self,
        request: &Request,
        state: &AtomicU8,
        started: Instant,
    ) -> Result<Response, LarderError> {
        let mut run = Run {
            request,
            sink: self.sink.as_ref(),
            state,
            started,
            capability: None,
        };
        debug!("[{}] received, level {}", request.id, request.validation_level);

        // RECEIVED → RESOLVED
        let resolved = match self.registry.resolve(request) {
            Ok(r) => r,
            Err(e) => {
                info!("[{}] no capability for request", request.id);
                return Err(run.fail(e));
            }
        };
        run.capability = Some(resolved.name.clone());
        run.advance(PipelineState::Resolved, None, None)?;
        let kind = resolved.kind();

        let context = match self.provider.fetch_context(request, kind).await {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!("[{}] context unavailable: {}", request.id, e);
                return Err(run.fail(e));
            }
        };
        debug!("[{}] {} context with {} items", request.id, context.kind, context.len());

        // RESOLVED → GENERATING
        run.advance(PipelineState::Generating, None, None)?;
        let output = match self.invoke(&resolved, request, &context).await {
            Ok(output) => output,
            Err(e) if resolved.policy.fallback_safe => {
                warn!("[{}] {} failed, degrading to fallback: {}", request.id, resolved.name, e);
                let reason = match e {
                    LarderError::CapabilityTimeout { .. } => FallbackReason::Timeout,
                    _ => FallbackReason::CapabilityError,
                };
                return self.degrade(&run, &resolved, kind, &context, reason);
            }
            Err(e) => {
                warn!("[{}] {} failed: {}", request.id, resolved.name, e);
                return Err(run.fail(e));
            }
        };

        // GENERATING → EXTRACTING
        run.advance(PipelineState::Extracting, None, None)?;
        let extraction = extract(&output, kind);
        debug!(
            "[{}] {} claims extracted (unparseable: {})",
            request.id,
            extraction.claims.len(),
            extraction.unparseable
        );

        // EXTRACTING → VALIDATING
        run.advance(PipelineState::Validating, None, None)?;
        let verdict = self
            .validator
            .check_extraction(&extraction, &context, request.validation_level);

        let (verdict, text) = match verdict.outcome {
            ValidationOutcome::Pass => {
                let text = output.text.clone();
                (verdict, text)
            }
            ValidationOutcome::Repaired => {
                let flagged: Vec<Claim> = verdict.flagged_claims().cloned().collect();
                let kept: Vec<Claim> = extraction
                    .claims
                    .iter()
                    .filter(|c| !flagged.contains(c))
                    .cloned()
                    .collect();
                match strip_claims(&output.text, &flagged, &kept) {
                    Ok(repaired) => {
                        debug!("[{}] repaired, {} lines removed", request.id, repaired.removed_lines);
                        (verdict, repaired.text)
                    }
                    Err(e) => {
                        debug!("[{}] repair rejected: {}", request.id, e);
                        let verdict = verdict.repair_failed();
                        let text = self.fallback_text(kind, &context, &verdict);
                        (verdict, text)
                    }
                }
            }
            ValidationOutcome::Fallback => {
                let text = self.fallback_text(kind, &context, &verdict);
                (verdict, text)
            }
        };

        self.respond(&run, &resolved, &output, verdict, text)
    }

    /// Call the capability under its policy: retries inside one deadline.
    async fn invoke(
        &self,
        resolved: &Resolved,
        request: &Request,
        context: &GroundTruthContext,
    ) -> Result<CapabilityOutput, LarderError> {
        let policy = resolved.policy;
        let attempts = async {
            let mut attempt = 0u32;
            loop {
                let started = Instant::now();
                match resolved.capability.generate(request, context).await {
                    Ok(mut output) => {
                        if output.latency_ms == 0 {
                            output.latency_ms = started.elapsed().as_millis() as u64;
                        }
                        return Ok(output);
                    }
                    Err(e) if attempt < policy.retries => {
                        attempt += 1;
                        warn!(
                            "[{}] {} attempt {} failed, retrying: {}",
                            request.id, resolved.name, attempt, e
                        );
                    }
                    Err(e) => {
                        return Err(LarderError::CapabilityError {
                            capability: resolved.name.clone(),
                            message: e.to_string(),
                        })
                    }
                }
            }
        };

        match tokio::time::timeout(Duration::from_millis(policy.timeout_ms), attempts).await {
            Ok(result) => result,
            Err(_) => Err(LarderError::CapabilityTimeout {
                capability: resolved.name.clone(),
                timeout_ms: policy.timeout_ms,
            }),
        }
    }

    fn fallback_text(
        &self,
        kind: CapabilityKind,
        context: &GroundTruthContext,
        verdict: &ValidationVerdict,
    ) -> String {
        let reason = verdict.reason.unwrap_or(VerdictReason::UngroundedClaims);
        self.fallback
            .generate(kind, context, FallbackReason::Validation(reason))
    }

    /// VALIDATING → RESPONDING → DONE
    fn respond(
        &self,
        run: &Run<'_>,
        resolved: &Resolved,
        output: &CapabilityOutput,
        verdict: ValidationVerdict,
        text: String,
    ) -> Result<Response, LarderError> {
        let request = run.request;
        let reason = verdict.reason.map(|r| r.as_str());
        run.advance(
            PipelineState::Responding(verdict.outcome),
            Some((verdict.outcome, verdict.confidence)),
            reason,
        )?;

        run.emit_validation(ValidationEvent {
            request_id: request.id.clone(),
            level: request.validation_level,
            outcome: verdict.outcome,
            confidence: verdict.confidence,
            latency_ms: output.latency_ms,
            capability: resolved.name.clone(),
            total_claims: verdict.total_claims,
            flagged_claims: verdict.flagged.len(),
            unparseable: verdict.unparseable,
            reason: reason.map(str::to_string),
            timestamp: Utc::now(),
        });

        run.advance(
            PipelineState::Done,
            Some((verdict.outcome, verdict.confidence)),
            None,
        )?;
        info!(
            "[{}] {} {} ({:.2}) in {}ms",
            request.id,
            resolved.name,
            verdict.outcome,
            verdict.confidence,
            run.elapsed_ms()
        );

        Ok(Response::from_verdict(
            request.id.clone(),
            resolved.name.clone(),
            text,
            &verdict,
        ))
    }

    /// GENERATING → RESPONDING(FALLBACK) → DONE for a fallback-safe failure.
    fn degrade(
        &self,
        run: &Run<'_>,
        resolved: &Resolved,
        kind: CapabilityKind,
        context: &GroundTruthContext,
        reason: FallbackReason,
    ) -> Result<Response, LarderError> {
        let request = run.request;
        let outcome = ValidationOutcome::Fallback;
        run.advance(
            PipelineState::Responding(outcome),
            Some((outcome, 0.0)),
            Some(reason.as_str()),
        )?;

        run.emit_validation(ValidationEvent {
            request_id: request.id.clone(),
            level: request.validation_level,
            outcome,
            confidence: 0.0,
            latency_ms: run.elapsed_ms(),
            capability: resolved.name.clone(),
            total_claims: 0,
            flagged_claims: 0,
            unparseable: false,
            reason: Some(reason.as_str().to_string()),
            timestamp: Utc::now(),
        });

        run.advance(PipelineState::Done, Some((outcome, 0.0)), None)?;

        let text = self.fallback.generate(kind, context, reason);
        Ok(Response::fallback(
            request.id.clone(),
            resolved.name.clone(),
            text,
            request.validation_level,
        ))
    }
}
