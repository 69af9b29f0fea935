//! Capability trait and registry.
//!
//! Every response-generating agent implements [`Capability`]. The
//! [`Registry`] is built once at startup and shared read-only; resolution is
//! deterministic and never falls through to an arbitrary entry.

use async_trait::async_trait;
use larder_shared::capability::{CapabilityKind, CapabilityOutput};
use larder_shared::context::GroundTruthContext;
use larder_shared::error::LarderError;
use larder_shared::request::Request;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Why a single generation attempt failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityFailure {
    #[error("backend unreachable: {0}")]
    Unavailable(String),

    #[error("backend returned status {0}")]
    Status(u16),

    #[error("backend response unreadable: {0}")]
    Decode(String),

    #[error("{0}")]
    Other(String),
}

/// Uniform generate contract.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Registry name
    fn name(&self) -> &str;

    fn kind(&self) -> CapabilityKind;

    /// Generate a response grounded in `context`. No internal timeout: the
    /// orchestrator owns the deadline.
    async fn generate(
        &self,
        request: &Request,
        context: &GroundTruthContext,
    ) -> Result<CapabilityOutput, CapabilityFailure>;
}

/// Per-capability invocation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityPolicy {
    /// Deadline covering every attempt
    pub timeout_ms: u64,
    /// Extra attempts after a failure
    pub retries: u32,
    /// Failure degrades to a fallback response
    pub fallback_safe: bool,
}

impl Default for CapabilityPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            retries: 0,
            fallback_safe: false,
        }
    }
}

/// A resolved registry entry.
#[derive(Clone)]
pub struct Resolved {
    pub name: String,
    pub capability: Arc<dyn Capability>,
    pub policy: CapabilityPolicy,
}

impl Resolved {
    pub fn kind(&self) -> CapabilityKind {
        self.capability.kind()
    }
}

/// Name-keyed capability set.
#[derive(Default, Clone)]
pub struct Registry {
    entries: BTreeMap<String, (Arc<dyn Capability>, CapabilityPolicy)>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under `name` with the default policy. Replaces any entry of the same name.
    pub fn register(&mut self, name: impl Into<String>, capability: Arc<dyn Capability>) {
        self.register_with_policy(name, capability, CapabilityPolicy::default());
    }

    pub fn register_with_policy(
        &mut self,
        name: impl Into<String>,
        capability: Arc<dyn Capability>,
        policy: CapabilityPolicy,
    ) {
        self.entries.insert(name.into(), (capability, policy));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Resolve a request to exactly one capability.
    ///
    /// Order: hint as a registered name, hint as a capability kind, then the
    /// kind inferred from the request shape (OCR text ⇒ receipt, search
    /// results ⇒ search, ingredient list ⇒ recipe, anything else ⇒
    /// conversation).
    pub fn resolve(&self, request: &Request) -> Result<Resolved, LarderError> {
        if let Some(hint) = request.capability_hint.as_deref() {
            if let Some(resolved) = self.by_name(hint) {
                return Ok(resolved);
            }
            if let Some(resolved) = CapabilityKind::from_str(hint).and_then(|k| self.by_kind(k)) {
                return Ok(resolved);
            }
            debug!("Capability hint '{}' not registered, inferring from request", hint);
        }

        let kind = infer_kind(request);
        self.by_kind(kind).ok_or(LarderError::CapabilityNotFound)
    }

    fn by_name(&self, name: &str) -> Option<Resolved> {
        self.entries.get(name).map(|(capability, policy)| Resolved {
            name: name.to_string(),
            capability: Arc::clone(capability),
            policy: *policy,
        })
    }

    /// Entry named after the kind, else the first entry of that kind by name.
    fn by_kind(&self, kind: CapabilityKind) -> Option<Resolved> {
        if let Some(resolved) = self.by_name(kind.default_name()) {
            if resolved.kind() == kind {
                return Some(resolved);
            }
        }
        self.entries
            .iter()
            .find(|(_, (capability, _))| capability.kind() == kind)
            .map(|(name, (capability, policy))| Resolved {
                name: name.clone(),
                capability: Arc::clone(capability),
                policy: *policy,
            })
    }
}

/// Default capability kind for a request without a usable hint.
pub fn infer_kind(request: &Request) -> CapabilityKind {
    if request.input.ocr_text().is_some() {
        CapabilityKind::Receipt
    } else if request.input.search_results().is_some() {
        CapabilityKind::Search
    } else if request.input.ingredients().is_some() {
        CapabilityKind::Recipe
    } else {
        CapabilityKind::Conversation
    }
}
