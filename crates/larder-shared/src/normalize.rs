//! Key normalization and claim-to-reference matching.
//!
//! Normalization is case-, diacritic- and whitespace-insensitive and folds
//! simple English plurals, so "Tomatoes", "tomato" and "TOMATÓ" share a key.
//! Both sides of every comparison go through the same pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Words ignored by token-overlap matching.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "have", "in", "is",
    "it", "its", "of", "on", "or", "that", "the", "this", "to", "was", "were", "with",
];

/// Built-in (canonical, alias) pairs.
const DEFAULT_SYNONYMS: &[(&str, &str)] = &[
    ("green onion", "scallion"),
    ("green onion", "spring onion"),
    ("coriander", "cilantro"),
    ("chickpea", "garbanzo"),
    ("chickpea", "garbanzo bean"),
    ("eggplant", "aubergine"),
    ("zucchini", "courgette"),
    ("bell pepper", "capsicum"),
    ("arugula", "rocket"),
    ("cornstarch", "cornflour"),
    ("powdered sugar", "icing sugar"),
    ("shrimp", "prawn"),
    ("ground beef", "minced beef"),
    ("heavy cream", "double cream"),
    ("beet", "beetroot"),
];

/// Normalize free text into a matching key.
pub fn normalize_key(text: &str) -> String {
    let folded: Vec<char> = text
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .chars()
        .collect();

    let spaced: String = folded
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            if c.is_alphanumeric() {
                c
            } else if is_decimal_point(&folded, i) {
                '.'
            } else {
                ' '
            }
        })
        .collect();

    spaced
        .split_whitespace()
        .map(fold_plural)
        .collect::<Vec<_>>()
        .join(" ")
}

/// A `.` or `,` between two digits, as in `1.99` or `1,99`.
fn is_decimal_point(chars: &[char], i: usize) -> bool {
    matches!(chars[i], '.' | ',')
        && i > 0
        && chars[i - 1].is_ascii_digit()
        && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit())
}

/// Value of a decimal token such as `1.99`.
pub fn decimal_value(token: &str) -> Option<f64> {
    if !token.contains('.') || !token.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    token.parse().ok()
}

/// Fold a simple English plural to its singular.
fn fold_plural(word: &str) -> String {
    if word.len() <= 3 || !word.chars().all(|c| c.is_alphabetic()) {
        return word.to_string();
    }
    if word.ends_with("ss") || word.ends_with("us") || word.ends_with("is") {
        return word.to_string();
    }
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{}y", stem);
    }
    for suffix in ["oes", "ches", "shes", "xes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if let Some(stem) = word.strip_suffix('s') {
        return stem.to_string();
    }
    word.to_string()
}

/// Split a normalized key into tokens.
pub fn tokens(key: &str) -> Vec<&str> {
    key.split_whitespace().collect()
}

/// True when `needle` occurs as a contiguous token run in `haystack`.
fn contains_run(haystack: &[&str], needle: &[&str]) -> bool {
    if needle.is_empty() || needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Synonym table mapping alias phrases to a canonical phrase.
#[derive(Debug, Clone, Default)]
pub struct SynonymTable {
    /// normalized alias -> normalized canonical, longest alias first on lookup
    aliases: BTreeMap<String, String>,
}

impl SynonymTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table seeded with the built-in culinary synonyms.
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        for (canonical, alias) in DEFAULT_SYNONYMS {
            table.insert(canonical, alias);
        }
        table
    }

    /// Register `alias` as another name for `canonical`.
    pub fn insert(&mut self, canonical: &str, alias: &str) {
        let canonical = normalize_key(canonical);
        let alias = normalize_key(alias);
        if canonical.is_empty() || alias.is_empty() || canonical == alias {
            return;
        }
        self.aliases.insert(alias, canonical);
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// Rewrite every alias token run in a normalized key to its canonical form.
    pub fn canonicalize(&self, key: &str) -> String {
        if self.aliases.is_empty() {
            return key.to_string();
        }

        let mut ordered: Vec<(&String, &String)> = self.aliases.iter().collect();
        ordered.sort_by(|a, b| {
            let la = a.0.split_whitespace().count();
            let lb = b.0.split_whitespace().count();
            lb.cmp(&la).then_with(|| a.0.cmp(b.0))
        });

        let mut words: Vec<String> = key.split_whitespace().map(str::to_string).collect();
        for (alias, canonical) in ordered {
            let alias_tokens: Vec<&str> = alias.split_whitespace().collect();
            let mut i = 0;
            while i + alias_tokens.len() <= words.len() {
                let window: Vec<&str> = words[i..i + alias_tokens.len()]
                    .iter()
                    .map(String::as_str)
                    .collect();
                if window == alias_tokens {
                    let replacement: Vec<String> =
                        canonical.split_whitespace().map(str::to_string).collect();
                    let step = replacement.len();
                    words.splice(i..i + alias_tokens.len(), replacement);
                    i += step;
                } else {
                    i += 1;
                }
            }
        }
        words.join(" ")
    }
}

/// How a claim key is compared to a reference item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Keys equal after normalization and synonym rewrite
    Exact,
    /// Claim occurs as a whole-word run inside the item
    Substring,
    /// Either side occurs as a whole-word run inside the other
    Containment,
    /// Enough of the claim's content words occur in one item
    TokenOverlap { min_ratio: f32 },
    /// Claim name as a whole-word run, followed in the same item by the
    /// claimed amounts in order
    PricedLine,
}

impl Default for MatchStrategy {
    fn default() -> Self {
        Self::Substring
    }
}

impl MatchStrategy {
    /// Compare canonical claim tokens against canonical item tokens.
    pub fn matches(&self, claim: &[&str], item: &[&str]) -> bool {
        if claim.is_empty() || item.is_empty() {
            return false;
        }
        if claim == item {
            return true;
        }
        match self {
            Self::Exact => false,
            Self::Substring => contains_run(item, claim),
            Self::Containment => contains_run(item, claim) || contains_run(claim, item),
            Self::TokenOverlap { min_ratio } => {
                let content: Vec<&str> = claim
                    .iter()
                    .copied()
                    .filter(|t| !STOP_WORDS.contains(t))
                    .collect();
                if content.is_empty() {
                    return false;
                }
                let hits = content.iter().filter(|t| item.contains(*t)).count();
                hits as f32 / content.len() as f32 >= *min_ratio
            }
            Self::PricedLine => priced_line_matches(claim, item),
        }
    }
}

fn same_amount(a: f64, b: f64) -> bool {
    (a - b).abs() < 0.005
}

/// Each occurrence of the name is paired with the amounts that follow it.
fn priced_line_matches(claim: &[&str], item: &[&str]) -> bool {
    let name: Vec<&str> = claim
        .iter()
        .copied()
        .filter(|t| decimal_value(t).is_none())
        .collect();
    let amounts: Vec<f64> = claim.iter().filter_map(|t| decimal_value(t)).collect();

    if amounts.is_empty() {
        return contains_run(item, &name);
    }
    if name.is_empty() {
        return amounts.iter().all(|a| {
            item.iter()
                .filter_map(|t| decimal_value(t))
                .any(|b| same_amount(*a, b))
        });
    }

    (0..item.len())
        .filter(|&i| item[i..].starts_with(name.as_slice()))
        .any(|i| {
            let following: Vec<f64> = item[i + name.len()..]
                .iter()
                .filter_map(|t| decimal_value(t))
                .take(amounts.len())
                .collect();
            following.len() == amounts.len()
                && following.iter().zip(&amounts).all(|(a, b)| same_amount(*a, *b))
        })
}
