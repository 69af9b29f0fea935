//! Error types for Larder.
//!
//! Only resolution, generation and context failures escape the pipeline.
//! Malformed capability output never becomes an error: the claim extractor
//! reports it through `ExtractionResult::unparseable` instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LarderError {
    /// The known capability names are deliberately left out of the message.
    #[error("No capability can handle this request")]
    CapabilityNotFound,

    #[error("Capability '{capability}' timed out after {timeout_ms}ms")]
    CapabilityTimeout { capability: String, timeout_ms: u64 },

    #[error("Capability '{capability}' failed: {message}")]
    CapabilityError { capability: String, message: String },

    #[error("Ground-truth context unavailable: {0}")]
    ContextUnavailable(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LarderError {
    pub fn code(&self) -> i32 {
        match self {
            LarderError::CapabilityNotFound => -32001,
            LarderError::CapabilityTimeout { .. } => -32002,
            LarderError::CapabilityError { .. } => -32003,
            LarderError::ContextUnavailable(_) => -32004,
            LarderError::Cancelled => -32005,
            LarderError::Config(_) => -32010,
            LarderError::Io(_) => -32006,
            LarderError::Json(_) => -32700,
            LarderError::Internal(_) => -32603,
        }
    }

    /// Fixed, non-technical text safe to show to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            LarderError::CapabilityNotFound => {
                "Sorry, I can't help with that kind of request."
            }
            LarderError::CapabilityTimeout { .. } => {
                "Sorry, that took too long. Please try again in a moment."
            }
            LarderError::CapabilityError { .. } => {
                "Sorry, something went wrong while preparing an answer. Please try again."
            }
            LarderError::ContextUnavailable(_) => {
                "Sorry, I couldn't get the information I need to check an answer. Please try again."
            }
            LarderError::Cancelled => "The request was cancelled.",
            LarderError::Config(_)
            | LarderError::Io(_)
            | LarderError::Json(_)
            | LarderError::Internal(_) => "Sorry, something went wrong. Please try again.",
        }
    }

    /// Short machine reason attached to monitoring events.
    pub fn reason(&self) -> &'static str {
        match self {
            LarderError::CapabilityNotFound => "capability_not_found",
            LarderError::CapabilityTimeout { .. } => "timeout",
            LarderError::CapabilityError { .. } => "capability_error",
            LarderError::ContextUnavailable(_) => "context_unavailable",
            LarderError::Cancelled => "cancelled",
            LarderError::Config(_) => "config",
            LarderError::Io(_) => "io",
            LarderError::Json(_) => "json",
            LarderError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_never_leaks_internals() {
        let err = LarderError::CapabilityError {
            capability: "recipe".to_string(),
            message: "connection refused on 127.0.0.1:11434".to_string(),
        };
        assert!(err.to_string().contains("127.0.0.1"));
        assert!(!err.user_message().contains("127.0.0.1"));
        assert!(!err.user_message().contains("recipe"));
    }

    #[test]
    fn not_found_message_omits_capability_names() {
        let err = LarderError::CapabilityNotFound;
        assert!(!err.to_string().contains("conversation"));
        assert_eq!(err.reason(), "capability_not_found");
    }

    #[test]
    fn codes_are_distinct() {
        let errors = [
            LarderError::CapabilityNotFound,
            LarderError::CapabilityTimeout {
                capability: "x".to_string(),
                timeout_ms: 1,
            },
            LarderError::CapabilityError {
                capability: "x".to_string(),
                message: "y".to_string(),
            },
            LarderError::ContextUnavailable("z".to_string()),
            LarderError::Cancelled,
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
