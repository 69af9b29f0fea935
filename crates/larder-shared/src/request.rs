//! Inbound request model.
//!
//! A request is immutable once built: the builder methods consume `self`
//! and nothing in the pipeline takes it by `&mut`.

use crate::validation::ValidationLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One search hit handed to the search capability by its client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSnippet {
    pub title: String,
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl SearchSnippet {
    pub fn new(title: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            snippet: snippet.into(),
            link: None,
        }
    }
}

/// Structured data attached to a request by the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Attachment {
    /// Pantry inventory the user listed
    Ingredients { items: Vec<String> },
    /// Text produced by the OCR pipeline from a receipt photo
    OcrText { text: String, confidence: f32 },
    /// Results already fetched by the search client
    SearchResults { results: Vec<SearchSnippet> },
}

/// Raw user input: free text plus attachments.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RequestInput {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl RequestInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn ingredients(&self) -> Option<&[String]> {
        self.attachments.iter().find_map(|a| match a {
            Attachment::Ingredients { items } => Some(items.as_slice()),
            _ => None,
        })
    }

    pub fn ocr_text(&self) -> Option<(&str, f32)> {
        self.attachments.iter().find_map(|a| match a {
            Attachment::OcrText { text, confidence } => Some((text.as_str(), *confidence)),
            _ => None,
        })
    }

    pub fn search_results(&self) -> Option<&[SearchSnippet]> {
        self.attachments.iter().find_map(|a| match a {
            Attachment::SearchResults { results } => Some(results.as_slice()),
            _ => None,
        })
    }
}

/// A single user request routed through the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability_hint: Option<String>,
    pub input: RequestInput,
    pub session_id: String,
    /// Carried per request; there is no process-wide default level.
    pub validation_level: ValidationLevel,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Request {
    /// Build a request with a fresh v4 id and the current time.
    pub fn new(session_id: impl Into<String>, input: RequestInput, level: ValidationLevel) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            capability_hint: None,
            input,
            session_id: session_id.into(),
            validation_level: level,
            timestamp: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.capability_hint = Some(hint.into());
        self
    }
}
