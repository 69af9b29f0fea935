//! Fake collaborators for deterministic testing.
//!
//! No network and no model: capabilities replay a script, the context
//! provider returns a fixed context and the sink records every event.
//!
//! ```rust,ignore
//! let cap = FakeCapability::scripted("recipe", CapabilityKind::Recipe, vec![
//!     FakeReply::fail("connection reset"),
//!     FakeReply::text(r#"{"ingredients": ["tomato"]}"#),
//! ]);
//! ```

use crate::capability::{Capability, CapabilityFailure};
use crate::context_provider::ContextProvider;
use crate::sink::EventSink;
use async_trait::async_trait;
use larder_shared::capability::{CapabilityKind, CapabilityOutput};
use larder_shared::context::GroundTruthContext;
use larder_shared::error::LarderError;
use larder_shared::event::{MonitorEvent, StateTransition, ValidationEvent};
use larder_shared::pipeline::PipelineState;
use larder_shared::request::Request;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Fake Capability
// ============================================================================

/// One scripted generation result
#[derive(Debug, Clone)]
pub enum FakeReply {
    Text(String),
    Structured(String, serde_json::Value),
    Fail(String),
    /// Wait, then reply
    Delay(Duration, Box<FakeReply>),
}

impl FakeReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }

    pub fn delayed(ms: u64, reply: FakeReply) -> Self {
        Self::Delay(Duration::from_millis(ms), Box::new(reply))
    }
}

/// Capability replaying a script, then repeating its last reply.
pub struct FakeCapability {
    name: String,
    kind: CapabilityKind,
    script: Mutex<VecDeque<FakeReply>>,
    last: Mutex<FakeReply>,
    calls: AtomicUsize,
}

impl FakeCapability {
    pub fn scripted(name: &str, kind: CapabilityKind, replies: Vec<FakeReply>) -> Self {
        let last = replies
            .last()
            .cloned()
            .unwrap_or_else(|| FakeReply::text(""));
        Self {
            name: name.to_string(),
            kind,
            script: Mutex::new(replies.into()),
            last: Mutex::new(last),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always replies with `text`
    pub fn replying(name: &str, kind: CapabilityKind, text: &str) -> Self {
        Self::scripted(name, kind, vec![FakeReply::text(text)])
    }

    /// Always fails with `message`
    pub fn failing(name: &str, kind: CapabilityKind, message: &str) -> Self {
        Self::scripted(name, kind, vec![FakeReply::fail(message)])
    }

    /// Replies with `text` after `ms` milliseconds
    pub fn slow(name: &str, kind: CapabilityKind, ms: u64, text: &str) -> Self {
        Self::scripted(name, kind, vec![FakeReply::delayed(ms, FakeReply::text(text))])
    }

    /// Number of generate calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> FakeReply {
        match lock(&self.script).pop_front() {
            Some(reply) => {
                *lock(&self.last) = reply.clone();
                reply
            }
            None => lock(&self.last).clone(),
        }
    }
}

#[async_trait]
impl Capability for FakeCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> CapabilityKind {
        self.kind
    }

    async fn generate(
        &self,
        _request: &Request,
        _context: &GroundTruthContext,
    ) -> Result<CapabilityOutput, CapabilityFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut reply = self.next_reply();
        loop {
            match reply {
                FakeReply::Delay(wait, inner) => {
                    tokio::time::sleep(wait).await;
                    reply = *inner;
                }
                FakeReply::Text(text) => return Ok(CapabilityOutput::text(self.name.clone(), text)),
                FakeReply::Structured(text, value) => {
                    return Ok(CapabilityOutput::text(self.name.clone(), text).with_structured(value))
                }
                FakeReply::Fail(message) => return Err(CapabilityFailure::Other(message)),
            }
        }
    }
}

// ============================================================================
// Fake Context Provider
// ============================================================================

/// Provider returning a fixed context, or failing.
pub struct FakeContextProvider {
    result: Result<GroundTruthContext, String>,
    fetches: AtomicUsize,
}

impl FakeContextProvider {
    pub fn new(context: GroundTruthContext) -> Self {
        Self {
            result: Ok(context),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn inventory(items: &[&str]) -> Self {
        Self::new(GroundTruthContext::inventory(items.iter().copied()))
    }

    pub fn unavailable(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContextProvider for FakeContextProvider {
    async fn fetch_context(
        &self,
        _request: &Request,
        _kind: CapabilityKind,
    ) -> Result<GroundTruthContext, LarderError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.result
            .clone()
            .map_err(LarderError::ContextUnavailable)
    }
}

// ============================================================================
// Recording Sink
// ============================================================================

/// Sink keeping every event in memory. Clones share the same record.
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<MonitorEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MonitorEvent> {
        lock(&self.events).clone()
    }

    pub fn validation_events(&self) -> Vec<ValidationEvent> {
        lock(&self.events)
            .iter()
            .filter_map(|e| e.as_validation().cloned())
            .collect()
    }

    pub fn transitions(&self) -> Vec<StateTransition> {
        lock(&self.events)
            .iter()
            .filter_map(|e| e.as_transition().cloned())
            .collect()
    }

    /// States entered, in order, starting from RECEIVED
    pub fn states(&self) -> Vec<PipelineState> {
        let transitions = self.transitions();
        let mut states: Vec<PipelineState> = transitions.first().map(|t| t.from).into_iter().collect();
        states.extend(transitions.iter().map(|t| t.to));
        states
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: MonitorEvent) {
        lock(&self.events).push(event);
    }
}
