//! Outbound response and user-facing error payloads.

use crate::error::LarderError;
use crate::validation::{FlaggedClaim, ValidationLevel, ValidationOutcome, ValidationVerdict};
use serde::{Deserialize, Serialize};

/// What the caller receives for a request that did not fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub request_id: String,
    pub text: String,
    pub outcome: ValidationOutcome,
    pub confidence: f32,
    #[serde(default)]
    pub flagged_claims: Vec<FlaggedClaim>,
    pub level: ValidationLevel,
    /// Registry name of the capability that handled the request
    pub capability: String,
}

impl Response {
    /// Response shaped by a validation verdict.
    pub fn from_verdict(
        request_id: impl Into<String>,
        capability: impl Into<String>,
        text: impl Into<String>,
        verdict: &ValidationVerdict,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            text: text.into(),
            outcome: verdict.outcome,
            confidence: verdict.confidence,
            flagged_claims: verdict.flagged.clone(),
            level: verdict.level,
            capability: capability.into(),
        }
    }

    /// Fallback issued without a verdict (fallback-safe capability failure).
    pub fn fallback(
        request_id: impl Into<String>,
        capability: impl Into<String>,
        text: impl Into<String>,
        level: ValidationLevel,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            text: text.into(),
            outcome: ValidationOutcome::Fallback,
            confidence: 0.0,
            flagged_claims: Vec::new(),
            level,
            capability: capability.into(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.outcome == ValidationOutcome::Fallback
    }
}

/// User-facing error body. Carries no internal detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

impl ErrorResponse {
    pub fn from_error(request_id: impl Into<String>, err: &LarderError) -> Self {
        Self {
            request_id: request_id.into(),
            error: ErrorBody {
                code: err.code(),
                message: err.user_message().to_string(),
            },
        }
    }
}
