//! Grounded prompt building for the Ollama capabilities.
//!
//! Enforces a prompt size cap: context items are dropped from the end until
//! the prompt fits, and the number of dropped items is reported.

use larder_shared::capability::CapabilityKind;
use larder_shared::context::GroundTruthContext;
use larder_shared::request::Request;

/// Prompt size cap in characters
pub const MAX_PROMPT_CHARS: usize = 12_000;

/// A built prompt
#[derive(Debug, Clone)]
pub struct PromptParts {
    pub system: String,
    pub prompt: String,
    /// Ask the backend for JSON output
    pub json: bool,
    /// Context items left out to respect the cap
    pub dropped_items: usize,
}

/// Grounding rules suffix (constant size, always included)
const GROUNDING_RULES: &str = r#"

=== GROUNDING RULES (MANDATORY) ===
1. Use ONLY the reference data above. Never invent items, prices or facts.
2. If the reference data is not enough, say what is missing.
3. Keep the answer short and concrete.
=== END RULES ==="#;

fn system_prompt(kind: CapabilityKind) -> &'static str {
    match kind {
        CapabilityKind::Conversation => {
            "You are a friendly kitchen assistant. When you mention ingredients, list each one on its own line starting with \"- \"."
        }
        CapabilityKind::Recipe => {
            "You are a recipe assistant. Reply with JSON only: {\"title\": string, \"ingredients\": [string], \"steps\": [string]}. Use only ingredients from the pantry list."
        }
        CapabilityKind::Search => {
            "You are a research assistant. Answer in plain declarative sentences, each supported by the search results provided."
        }
        CapabilityKind::Receipt => {
            "You analyse shopping receipts. Reply with JSON only: {\"items\": [{\"name\": string, \"price\": number}], \"total\": number}. Copy names and prices exactly as they appear in the receipt text."
        }
    }
}

fn context_heading(kind: CapabilityKind) -> &'static str {
    match kind {
        CapabilityKind::Conversation | CapabilityKind::Recipe => "=== PANTRY ===",
        CapabilityKind::Search => "=== SEARCH RESULTS ===",
        CapabilityKind::Receipt => "=== RECEIPT TEXT ===",
    }
}

/// Build the prompt for one request.
pub fn build_prompt(
    kind: CapabilityKind,
    request: &Request,
    context: &GroundTruthContext,
) -> PromptParts {
    let question = format!("\n\n=== REQUEST ===\n{}", request.input.text.trim());
    let heading = context_heading(kind);
    let fixed = heading.len() + question.len() + GROUNDING_RULES.len() + 1;
    let budget = MAX_PROMPT_CHARS.saturating_sub(fixed);

    let mut body = String::new();
    let mut dropped_items = 0;
    let terms = context.terms();
    for (i, item) in terms.iter().enumerate() {
        let line = format!("\n- {}", item);
        if body.len() + line.len() > budget {
            dropped_items = terms.len() - i;
            break;
        }
        body.push_str(&line);
    }
    if terms.is_empty() {
        body.push_str("\n(none)");
    }

    PromptParts {
        system: system_prompt(kind).to_string(),
        prompt: format!("{}{}{}{}", heading, body, question, GROUNDING_RULES),
        json: matches!(kind, CapabilityKind::Recipe | CapabilityKind::Receipt),
        dropped_items,
    }
}
