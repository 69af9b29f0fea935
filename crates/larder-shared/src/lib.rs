//! Shared types and pure pipeline stages for Larder components.
//!
//! Everything here is synchronous and free of I/O except the event log.

pub mod capability;
pub mod claims;
pub mod context;
pub mod error;
pub mod event;
pub mod fallback;
pub mod normalize;
pub mod pipeline;
pub mod repair;
pub mod request;
pub mod response;
pub mod validation;

pub use capability::{CapabilityKind, CapabilityOutput};
pub use claims::{Claim, ClaimCategory, ExtractionResult};
pub use context::{ContextKind, GroundTruthContext, ReferenceItem, SourceMetadata};
pub use error::LarderError;
pub use event::{EventLog, MonitorEvent, StateTransition, ValidationEvent};
pub use fallback::{FallbackGenerator, FallbackReason};
pub use normalize::{MatchStrategy, SynonymTable};
pub use pipeline::PipelineState;
pub use request::{Attachment, Request, RequestInput, SearchSnippet};
pub use response::{ErrorResponse, Response};
pub use validation::{
    Disposition, FlagReason, FlaggedClaim, MatchingPolicy, ValidationLevel, ValidationOutcome,
    ValidationVerdict, Validator, VerdictReason,
};

/// Version of the shared crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
