//! Ground-truth context: the reference facts a response is checked against.
//!
//! Built fresh per request by whichever collaborator owns the domain
//! (pantry store, search client, OCR pipeline). Read-only to the core.

use crate::request::SearchSnippet;
use serde::{Deserialize, Serialize};

/// Kind of reference data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    Inventory,
    SearchResults,
    DocumentText,
}

impl std::fmt::Display for ContextKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inventory => write!(f, "inventory"),
            Self::SearchResults => write!(f, "search_results"),
            Self::DocumentText => write!(f, "document_text"),
        }
    }
}

/// A single reference item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReferenceItem {
    /// Plain term or passage ("tomato", a snippet, an OCR line)
    Term(String),
    /// Key-value fact ("total" = "12.40")
    Fact { key: String, value: String },
}

impl ReferenceItem {
    /// Text the matcher sees for this item.
    pub fn match_text(&self) -> String {
        match self {
            Self::Term(t) => t.clone(),
            Self::Fact { key, value } => format!("{} {}", key, value),
        }
    }
}

/// Where the reference data came from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Collaborator that produced the context ("pantry", "search", "ocr")
    pub origin: String,
    /// Human-readable source labels (search result titles)
    #[serde(default)]
    pub titles: Vec<String>,
    /// Producer confidence, e.g. OCR confidence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// Reference facts for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthContext {
    pub kind: ContextKind,
    pub items: Vec<ReferenceItem>,
    #[serde(default)]
    pub source: SourceMetadata,
}

impl GroundTruthContext {
    /// Pantry inventory, one item per listed ingredient.
    pub fn inventory<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: ContextKind::Inventory,
            items: items
                .into_iter()
                .map(|s| ReferenceItem::Term(s.into()))
                .filter(|i| !i.match_text().trim().is_empty())
                .collect(),
            source: SourceMetadata {
                origin: "pantry".to_string(),
                ..Default::default()
            },
        }
    }

    /// Document text, one item per non-empty line.
    pub fn document_text(text: &str, confidence: Option<f32>) -> Self {
        Self {
            kind: ContextKind::DocumentText,
            items: text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(|l| ReferenceItem::Term(l.to_string()))
                .collect(),
            source: SourceMetadata {
                origin: "ocr".to_string(),
                titles: Vec::new(),
                confidence,
            },
        }
    }

    /// Search results, one item per snippet (title and snippet joined).
    pub fn search_results(results: &[SearchSnippet]) -> Self {
        Self {
            kind: ContextKind::SearchResults,
            items: results
                .iter()
                .map(|r| ReferenceItem::Term(format!("{}. {}", r.title, r.snippet)))
                .collect(),
            source: SourceMetadata {
                origin: "search".to_string(),
                titles: results.iter().map(|r| r.title.clone()).collect(),
                confidence: None,
            },
        }
    }

    pub fn with_fact(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.items.push(ReferenceItem::Fact {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Plain item texts, in order.
    pub fn terms(&self) -> Vec<String> {
        self.items.iter().map(|i| i.match_text()).collect()
    }
}
