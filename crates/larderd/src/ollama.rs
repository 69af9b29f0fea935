//! Ollama-backed capabilities.
//!
//! One shared HTTP client talks to `/api/generate`; each capability adds its
//! kind-specific grounded prompt and model.

use crate::capability::{Capability, CapabilityFailure, Registry};
use crate::config::Config;
use crate::prompts::build_prompt;
use async_trait::async_trait;
use larder_shared::capability::{CapabilityKind, CapabilityOutput};
use larder_shared::context::GroundTruthContext;
use larder_shared::error::LarderError;
use larder_shared::request::Request;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Thin client for the Ollama generate endpoint
pub struct OllamaClient {
    http: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, LarderError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LarderError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Single non-streaming generation
    pub async fn generate(
        &self,
        model: &str,
        system: &str,
        prompt: &str,
        json: bool,
    ) -> Result<String, CapabilityFailure> {
        let body = GenerateRequest {
            model,
            prompt,
            system,
            stream: false,
            format: json.then_some("json"),
            options: GenerateOptions { temperature: 0.2 },
        };

        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| CapabilityFailure::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CapabilityFailure::Status(response.status().as_u16()));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| CapabilityFailure::Decode(e.to_string()))?;
        Ok(parsed.response)
    }
}

/// A capability answered by an Ollama model
pub struct OllamaCapability {
    name: String,
    kind: CapabilityKind,
    model: String,
    client: Arc<OllamaClient>,
}

impl OllamaCapability {
    pub fn new(
        name: impl Into<String>,
        kind: CapabilityKind,
        model: impl Into<String>,
        client: Arc<OllamaClient>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            model: model.into(),
            client,
        }
    }
}

#[async_trait]
impl Capability for OllamaCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> CapabilityKind {
        self.kind
    }

    async fn generate(
        &self,
        request: &Request,
        context: &GroundTruthContext,
    ) -> Result<CapabilityOutput, CapabilityFailure> {
        let parts = build_prompt(self.kind, request, context);
        if parts.dropped_items > 0 {
            warn!(
                "[{}] prompt capped, {} context items left out",
                self.name, parts.dropped_items
            );
        }

        let started = Instant::now();
        let text = self
            .client
            .generate(&self.model, &parts.system, &parts.prompt, parts.json)
            .await?;
        let latency_ms = started.elapsed().as_millis() as u64;
        debug!("[{}] {} chars from {} in {}ms", self.name, text.len(), self.model, latency_ms);

        Ok(CapabilityOutput::text(self.name.clone(), text).with_latency(latency_ms))
    }
}

/// Register one Ollama capability per configured entry.
pub fn register_configured(registry: &mut Registry, config: &Config) -> Result<(), LarderError> {
    let client = Arc::new(OllamaClient::new(
        &config.llm.base_url,
        config.llm.http_timeout_secs,
    )?);

    for (name, cap) in &config.capabilities {
        let model = config.model_for(name);
        info!("Registering capability '{}' ({}) on {}", name, cap.kind, model);
        registry.register_with_policy(
            name.clone(),
            Arc::new(OllamaCapability::new(name.clone(), cap.kind, model, Arc::clone(&client))),
            cap.policy(),
        );
    }

    if registry.is_empty() {
        return Err(LarderError::Config("no capabilities configured".to_string()));
    }
    Ok(())
}
