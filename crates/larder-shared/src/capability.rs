//! Capability kinds and the output contract every capability returns.

use crate::context::ContextKind;
use serde::{Deserialize, Serialize};

/// Domain a registered capability answers for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    /// General chat, default when nothing else applies
    Conversation,
    /// Recipe generation from the pantry inventory
    Recipe,
    /// Answers synthesized from search results
    Search,
    /// Line-item analysis of an OCR'd receipt
    Receipt,
}

impl CapabilityKind {
    pub const ALL: [CapabilityKind; 4] = [
        CapabilityKind::Conversation,
        CapabilityKind::Recipe,
        CapabilityKind::Search,
        CapabilityKind::Receipt,
    ];

    /// Conventional registry name for this kind.
    pub fn default_name(&self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Recipe => "recipe",
            Self::Search => "search",
            Self::Receipt => "receipt",
        }
    }

    /// Kind of ground truth the kind's claims are checked against.
    pub fn context_kind(&self) -> ContextKind {
        match self {
            Self::Conversation | Self::Recipe => ContextKind::Inventory,
            Self::Search => ContextKind::SearchResults,
            Self::Receipt => ContextKind::DocumentText,
        }
    }

    /// Parse from string (config and request hints)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "conversation" | "chat" => Some(Self::Conversation),
            "recipe" => Some(Self::Recipe),
            "search" => Some(Self::Search),
            "receipt" => Some(Self::Receipt),
            _ => None,
        }
    }
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.default_name())
    }
}

/// What a capability produced for one request.
///
/// Owned by the orchestrator for the lifetime of the request only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityOutput {
    /// Raw model text
    pub text: String,
    /// Partially structured data, if the capability already parsed some
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<serde_json::Value>,
    /// Registry name of the capability that produced this
    pub capability: String,
    /// Wall time of the generation call in milliseconds
    pub latency_ms: u64,
}

impl CapabilityOutput {
    pub fn text(capability: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            structured: None,
            capability: capability.into(),
            latency_ms: 0,
        }
    }

    pub fn with_structured(mut self, value: serde_json::Value) -> Self {
        self.structured = Some(value);
        self
    }

    pub fn with_latency(mut self, ms: u64) -> Self {
        self.latency_ms = ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_name() {
        for kind in CapabilityKind::ALL {
            assert_eq!(CapabilityKind::from_str(kind.default_name()), Some(kind));
        }
        assert_eq!(CapabilityKind::from_str(" Chat "), Some(CapabilityKind::Conversation));
        assert_eq!(CapabilityKind::from_str("weather"), None);
    }

    #[test]
    fn context_kind_mapping() {
        assert_eq!(CapabilityKind::Recipe.context_kind(), ContextKind::Inventory);
        assert_eq!(CapabilityKind::Receipt.context_kind(), ContextKind::DocumentText);
        assert_eq!(CapabilityKind::Search.context_kind(), ContextKind::SearchResults);
    }
}
