//! Larder daemon library: capabilities, context providers, monitoring sinks
//! and the request orchestrator.

pub mod capability;
pub mod config;
pub mod context_provider;
pub mod fakes;
pub mod ollama;
pub mod orchestrator;
pub mod prompts;
pub mod sink;

pub use capability::{Capability, CapabilityFailure, CapabilityPolicy, Registry};
pub use config::Config;
pub use context_provider::{AttachmentContextProvider, ContextProvider};
pub use orchestrator::Orchestrator;
pub use sink::{ChannelSink, EventSink, MultiSink, NoopSink, TracingSink};
