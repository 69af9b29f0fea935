//! Fallback generator: safe substitute responses.
//!
//! Built only from fixed templates plus ground-truth context items, so the
//! result needs no validation and never carries text from a rejected
//! capability output. Deterministic for a given (kind, context).

use crate::capability::CapabilityKind;
use crate::context::GroundTruthContext;
use crate::normalize::normalize_key;
use crate::validation::VerdictReason;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Most context items echoed back in a fallback.
pub const DEFAULT_MAX_ECHO_ITEMS: usize = 20;

/// Why the fallback was issued. Internal only, never shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// Validation could not certify the output
    Validation(VerdictReason),
    /// Fallback-safe capability missed its deadline
    Timeout,
    /// Fallback-safe capability errored after its retries
    CapabilityError,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation(reason) => reason.as_str(),
            Self::Timeout => "timeout",
            Self::CapabilityError => "capability_error",
        }
    }

    fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Template-based fallback generator.
#[derive(Debug, Clone)]
pub struct FallbackGenerator {
    max_echo_items: usize,
}

impl Default for FallbackGenerator {
    fn default() -> Self {
        Self {
            max_echo_items: DEFAULT_MAX_ECHO_ITEMS,
        }
    }
}

impl FallbackGenerator {
    pub fn new(max_echo_items: usize) -> Self {
        Self {
            max_echo_items: max_echo_items.max(1),
        }
    }

    /// Safe response for a capability kind, echoing only grounded context.
    pub fn generate(
        &self,
        kind: CapabilityKind,
        context: &GroundTruthContext,
        reason: FallbackReason,
    ) -> String {
        let opener = if reason.is_validation() {
            "I couldn't double-check that answer"
        } else {
            "I couldn't finish that answer"
        };

        match kind {
            CapabilityKind::Recipe => {
                let items = self.echo_items(context);
                if items.is_empty() {
                    format!(
                        "{}. Tell me which ingredients you have and I'll suggest something using only those.",
                        opener
                    )
                } else {
                    format!(
                        "{}. I can only suggest using the ingredients you listed: {}.",
                        opener,
                        items.join(", ")
                    )
                }
            }
            CapabilityKind::Receipt => {
                let lines = self.echo_items(context);
                if lines.is_empty() {
                    format!(
                        "{}. I couldn't read this receipt clearly. Could you send a sharper photo?",
                        opener
                    )
                } else {
                    format!(
                        "{}. Here is the receipt text I could read:\n{}",
                        opener,
                        lines.join("\n")
                    )
                }
            }
            CapabilityKind::Search => {
                let titles = self.echo_titles(context);
                if titles.is_empty() {
                    format!("{}. I didn't find sources I could rely on for this.", opener)
                } else {
                    format!(
                        "{}. These sources may help: {}.",
                        opener,
                        titles.join("; ")
                    )
                }
            }
            CapabilityKind::Conversation => format!(
                "{}. Could you rephrase or give me a bit more detail?",
                opener
            ),
        }
    }

    /// Context items in order, deduplicated by normalized key.
    fn echo_items(&self, context: &GroundTruthContext) -> Vec<String> {
        dedup_keep_order(context.terms().into_iter(), self.max_echo_items)
    }

    fn echo_titles(&self, context: &GroundTruthContext) -> Vec<String> {
        dedup_keep_order(context.source.titles.iter().cloned(), self.max_echo_items)
    }
}

fn dedup_keep_order(items: impl Iterator<Item = String>, limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(normalize_key(s)))
        .take(limit)
        .collect()
}
