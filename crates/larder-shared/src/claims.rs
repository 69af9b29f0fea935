//! Claim extraction from capability output.
//!
//! Turns raw model text into an ordered list of checkable claims. Every
//! capability kind has its own strategy but the output shape is uniform.
//!
//! # Strategies
//!
//! - **Recipe**: structured `{"ingredients": [...]}` first, else the bullet
//!   lines under an "Ingredients" heading, else every bullet line.
//! - **Receipt**: structured `{"items": [{"name", "price"}]}` first, else
//!   lines shaped like `NAME ... 1.99`.
//! - **Search**: structured claim lists when present, else one factual
//!   statement per declarative sentence.
//! - **Conversation**: structured claim lists when present, else bullet
//!   lines, read as ingredient mentions.
//!
//! Recipe and receipt capabilities are asked for JSON. When that parse fails
//! the permissive pass still runs and the result is marked `unparseable`;
//! extraction itself never fails.

use crate::capability::{CapabilityKind, CapabilityOutput};
use crate::normalize::normalize_key;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::LazyLock;

/// What a claim asserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimCategory {
    /// An ingredient the response uses
    Ingredient,
    /// A receipt line item
    LineItem,
    /// A cited or stated fact
    FactualStatement,
}

impl std::fmt::Display for ClaimCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ingredient => write!(f, "ingredient"),
            Self::LineItem => write!(f, "line_item"),
            Self::FactualStatement => write!(f, "factual_statement"),
        }
    }
}

/// An atomic, checkable assertion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Claim {
    /// Surface text as it appeared in the output
    pub text: String,
    pub category: ClaimCategory,
    /// Normalized key used for matching
    pub key: String,
}

impl Claim {
    pub fn new(text: impl Into<String>, category: ClaimCategory) -> Self {
        let text = text.into();
        let key = normalize_key(&text);
        Self {
            text,
            category,
            key,
        }
    }

    pub fn ingredient(text: impl Into<String>) -> Self {
        Self::new(text, ClaimCategory::Ingredient)
    }

    pub fn line_item(text: impl Into<String>) -> Self {
        Self::new(text, ClaimCategory::LineItem)
    }

    pub fn statement(text: impl Into<String>) -> Self {
        Self::new(text, ClaimCategory::FactualStatement)
    }
}

/// Extractor result: claims plus the malformed-output signal.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub claims: Vec<Claim>,
    /// Structured parse failed and the permissive pass was used
    pub unparseable: bool,
}

impl ExtractionResult {
    fn new(claims: Vec<Claim>, unparseable: bool) -> Self {
        Self {
            claims: dedup_claims(claims),
            unparseable,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

// === Patterns ===

static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*•·]|\d{1,2}[.)])\s+(.+?)\s*$").unwrap());

static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:#+\s*)?\**\s*(ingredients|instructions|directions|method|steps|preparation|notes?|tips?)\b").unwrap()
});

static QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:about\s+|approx\.?\s+)?[\d½¼¾⅓⅔⅛/.,\s-]+").unwrap()
});

static UNIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:cups?|c|tbsp|tbs|tablespoons?|tsp|teaspoons?|g|grams?|kg|ml|l|liters?|litres?|oz|ounces?|lbs?|pounds?|pinch(?:es)?|dash(?:es)?|cloves?|cans?|jars?|slices?|handfuls?|bunch(?:es)?|sprigs?|pieces?|sticks?|heads?)\.?\s+(?:of\s+)?",
    )
    .unwrap()
});

static PREP_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:fresh|freshly|chopped|diced|minced|sliced|grated|shredded|crushed|peeled|finely|roughly|thinly|large|medium|small|optional|to taste)\b",
    )
    .unwrap()
});

static PRICE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*•]\s*)?([A-Za-z][A-Za-z0-9%&'./ ]*?)\s*[:\-–]?\s*[$€£]?\s*(\d+[.,]\d{2})\s*[A-Z]?\s*$").unwrap()
});

static CITATION_MARK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\[\d+(?:\s*,\s*\d+)*\]").unwrap());

static SENTENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^.!?\n]+[.!?]*").unwrap());

static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.+?)\s*```").unwrap());

// === Entry point ===

/// Extract claims from a capability's output.
pub fn extract(output: &CapabilityOutput, kind: CapabilityKind) -> ExtractionResult {
    let structured = output.structured.clone().or_else(|| match kind {
        CapabilityKind::Search => parse_json_payload(&CITATION_MARK.replace_all(&output.text, "")),
        _ => parse_json_payload(&output.text),
    });

    match kind {
        CapabilityKind::Recipe => extract_recipe(&output.text, structured.as_ref()),
        CapabilityKind::Receipt => extract_receipt(&output.text, structured.as_ref()),
        CapabilityKind::Search => extract_statements(&output.text, structured.as_ref()),
        CapabilityKind::Conversation => extract_conversation(&output.text, structured.as_ref()),
    }
}

fn extract_recipe(text: &str, structured: Option<&Value>) -> ExtractionResult {
    if let Some(items) = structured.and_then(|v| json_list(v, &["ingredients"])) {
        let claims = items
            .iter()
            .filter_map(|v| json_item_name(v, &["name", "ingredient", "item"]))
            .filter_map(|name| clean_ingredient(&name))
            .map(Claim::ingredient)
            .collect();
        return ExtractionResult::new(claims, false);
    }

    ExtractionResult::new(heuristic_ingredients(text), true)
}

fn extract_receipt(text: &str, structured: Option<&Value>) -> ExtractionResult {
    if let Some(items) = structured.and_then(|v| json_list(v, &["items", "line_items"])) {
        let claims = items
            .iter()
            .filter_map(|v| {
                let name = json_item_name(v, &["name", "item", "description"])?;
                let price = v.get("price").and_then(json_scalar);
                Some(match price {
                    Some(p) => Claim::line_item(format!("{} {}", name.trim(), p)),
                    None => Claim::line_item(name.trim()),
                })
            })
            .collect();
        return ExtractionResult::new(claims, false);
    }

    let claims = text
        .lines()
        .filter_map(|line| PRICE_LINE.captures(line))
        .map(|caps| {
            let name = caps[1].trim().trim_end_matches(['.', ':', '-']).trim();
            Claim::line_item(format!("{} {}", name, &caps[2]))
        })
        .collect();
    ExtractionResult::new(claims, true)
}

fn extract_statements(text: &str, structured: Option<&Value>) -> ExtractionResult {
    if let Some(items) = structured.and_then(|v| json_list(v, &["claims", "citations", "facts"])) {
        let claims = items
            .iter()
            .filter_map(|v| json_item_name(v, &["text", "claim", "fact"]))
            .map(|s| Claim::statement(CITATION_MARK.replace_all(&s, "").trim()))
            .collect();
        return ExtractionResult::new(claims, false);
    }

    let stripped = CITATION_MARK.replace_all(text, "");
    let claims = SENTENCE
        .find_iter(&stripped)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.ends_with('?'))
        .map(|s| match BULLET.captures(s) {
            Some(c) => c[1].to_string(),
            None => s.to_string(),
        })
        .map(|s| s.trim_end_matches(['.', '!']).trim().to_string())
        .filter(|s| normalize_key(s).split_whitespace().count() >= 3)
        .map(Claim::statement)
        .collect();
    ExtractionResult::new(claims, false)
}

fn extract_conversation(text: &str, structured: Option<&Value>) -> ExtractionResult {
    if let Some(items) = structured.and_then(|v| json_list(v, &["claims", "ingredients"])) {
        let claims = items
            .iter()
            .filter_map(|v| json_item_name(v, &["name", "text", "claim"]))
            .filter_map(|s| clean_ingredient(&s))
            .map(Claim::ingredient)
            .collect();
        return ExtractionResult::new(claims, false);
    }

    let claims = text
        .lines()
        .filter_map(|l| BULLET.captures(l).map(|c| c[1].to_string()))
        .filter_map(|s| clean_ingredient(&s))
        .map(Claim::ingredient)
        .collect();
    ExtractionResult::new(claims, false)
}

// === Heuristics ===

/// Bullet lines under an ingredients heading, else every bullet line.
fn heuristic_ingredients(text: &str) -> Vec<Claim> {
    let mut in_section = false;
    let mut saw_heading = false;
    let mut section = Vec::new();
    let mut all_bullets = Vec::new();

    for line in text.lines() {
        if let Some(caps) = HEADING.captures(line) {
            in_section = caps[1].eq_ignore_ascii_case("ingredients");
            saw_heading |= in_section;
            // "Ingredients: tomato, onion" on one line
            if in_section {
                if let Some((_, rest)) = line.split_once(':') {
                    section.extend(
                        rest.split(',')
                            .filter(|s| !s.trim().is_empty())
                            .map(str::to_string),
                    );
                }
            }
            continue;
        }
        if let Some(caps) = BULLET.captures(line) {
            let item = caps[1].to_string();
            if in_section {
                section.push(item.clone());
            }
            all_bullets.push(item);
        } else if in_section && line.trim().is_empty() && !section.is_empty() {
            in_section = false;
        }
    }

    let source = if saw_heading && !section.is_empty() {
        section
    } else {
        all_bullets
    };

    source
        .iter()
        .filter_map(|s| clean_ingredient(s))
        .map(Claim::ingredient)
        .collect()
}

/// Strip quantities, units, prep words and trailing notes from an ingredient line.
fn clean_ingredient(raw: &str) -> Option<String> {
    let mut s = raw.trim().trim_start_matches(['-', '*', '•']).trim().to_string();

    // "onion, diced" / "butter (softened)"
    if let Some(idx) = s.find(['(', ',', ';']) {
        s.truncate(idx);
    }
    s = strip_markup(&s);
    s = QUANTITY.replace(&s, "").to_string();
    loop {
        let next = UNIT.replace(&s, "").to_string();
        if next == s {
            break;
        }
        s = next;
    }
    s = PREP_WORDS.replace_all(&s, " ").to_string();
    let cleaned = s.split_whitespace().collect::<Vec<_>>().join(" ");

    if normalize_key(&cleaned).is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn strip_markup(s: &str) -> String {
    s.replace("**", "").replace('`', "").replace('_', " ")
}

// === JSON helpers ===

/// Find a JSON payload in model text: whole text, fenced block, or outermost braces.
///
/// Only objects and non-empty arrays of strings or objects count; anything
/// else (`[1]`, `[]`, a bare number) is left to the heuristic pass.
pub fn parse_json_payload(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    let parse = |candidate: &str| {
        serde_json::from_str::<Value>(candidate)
            .ok()
            .filter(is_payload)
    };

    if let Some(v) = parse(trimmed) {
        return Some(v);
    }
    if let Some(v) = FENCED_JSON.captures(trimmed).and_then(|caps| parse(&caps[1])) {
        return Some(v);
    }
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close)) {
            if start < end {
                if let Some(v) = parse(&trimmed[start..=end]) {
                    return Some(v);
                }
            }
        }
    }
    None
}

fn is_payload(value: &Value) -> bool {
    match value {
        Value::Object(_) => true,
        Value::Array(items) => {
            !items.is_empty() && items.iter().all(|i| i.is_string() || i.is_object())
        }
        _ => false,
    }
}

/// A top-level array, or an array under one of `keys`.
fn json_list<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Vec<Value>> {
    if let Some(arr) = value.as_array() {
        return Some(arr);
    }
    keys.iter().find_map(|k| value.get(*k).and_then(Value::as_array))
}

/// A string entry, or the first string field found under `fields`.
fn json_item_name(value: &Value, fields: &[&str]) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(_) => fields
            .iter()
            .find_map(|f| value.get(*f).and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    }
}

fn json_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => n.as_f64().map(|f| format!("{:.2}", f)),
        _ => None,
    }
}

/// Drop repeated keys, keeping first occurrence order.
fn dedup_claims(claims: Vec<Claim>) -> Vec<Claim> {
    let mut seen = HashSet::new();
    claims
        .into_iter()
        .filter(|c| !c.key.is_empty() && seen.insert((c.category, c.key.clone())))
        .collect()
}
