//! Ground-truth context providers.
//!
//! A provider owns any fetching its domain needs; the orchestrator awaits it
//! once, before generation, and never re-fetches mid-validation.

use async_trait::async_trait;
use larder_shared::capability::CapabilityKind;
use larder_shared::context::GroundTruthContext;
use larder_shared::error::LarderError;
use larder_shared::request::Request;

#[async_trait]
pub trait ContextProvider: Send + Sync {
    /// Reference facts for `request` as handled by a `kind` capability.
    async fn fetch_context(
        &self,
        request: &Request,
        kind: CapabilityKind,
    ) -> Result<GroundTruthContext, LarderError>;
}

/// Builds context from the request's own attachments.
///
/// The transport layer has already fetched everything (pantry list, OCR
/// text, search hits), so this provider does no I/O.
#[derive(Debug, Default, Clone)]
pub struct AttachmentContextProvider;

impl AttachmentContextProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ContextProvider for AttachmentContextProvider {
    async fn fetch_context(
        &self,
        request: &Request,
        kind: CapabilityKind,
    ) -> Result<GroundTruthContext, LarderError> {
        let input = &request.input;
        match kind {
            CapabilityKind::Conversation => Ok(GroundTruthContext::inventory(
                input.ingredients().unwrap_or_default().iter().cloned(),
            )),
            CapabilityKind::Recipe => input
                .ingredients()
                .map(|items| GroundTruthContext::inventory(items.iter().cloned()))
                .ok_or_else(|| LarderError::ContextUnavailable("no pantry inventory attached".to_string())),
            CapabilityKind::Receipt => input
                .ocr_text()
                .filter(|(text, _)| !text.trim().is_empty())
                .map(|(text, confidence)| GroundTruthContext::document_text(text, Some(confidence)))
                .ok_or_else(|| LarderError::ContextUnavailable("no receipt text attached".to_string())),
            CapabilityKind::Search => input
                .search_results()
                .map(GroundTruthContext::search_results)
                .ok_or_else(|| LarderError::ContextUnavailable("no search results attached".to_string())),
        }
    }
}
