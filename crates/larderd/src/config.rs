//! Configuration management for larderd.
//!
//! Loads settings from /etc/larder/config.toml, then
//! /var/lib/larder/config.toml, or uses defaults. Read once at startup and
//! never mutated afterwards.

use crate::capability::CapabilityPolicy;
use anyhow::Result;
use larder_shared::capability::CapabilityKind;
use larder_shared::context::ContextKind;
use larder_shared::normalize::SynonymTable;
use larder_shared::validation::{
    BasicAllowList, MatchingPolicy, Validator, DEFAULT_MAX_REPAIR_FRACTION,
    DEFAULT_UNPARSEABLE_PENALTY,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/larder/config.toml";

/// Default config file path for fallback
pub const DEFAULT_CONFIG_PATH: &str = "/var/lib/larder/config.toml";

/// LLM backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Ollama base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used by capabilities without their own override
    #[serde(default = "default_model")]
    pub model: String,

    /// HTTP client ceiling in seconds; capability deadlines are normally tighter
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_model() -> String {
    "qwen2.5:7b-instruct".to_string()
}

fn default_http_timeout() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

/// One registered capability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityConfig {
    pub kind: CapabilityKind,

    /// Model override for this capability
    #[serde(default)]
    pub model: Option<String>,

    /// Deadline covering every attempt, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Extra attempts after a capability error (never after a timeout)
    #[serde(default)]
    pub retries: u32,

    /// Degrade to a fallback response instead of failing the request
    #[serde(default)]
    pub fallback_safe: bool,
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl CapabilityConfig {
    pub fn new(kind: CapabilityKind) -> Self {
        Self {
            kind,
            model: None,
            timeout_ms: default_timeout_ms(),
            retries: 0,
            fallback_safe: false,
        }
    }

    pub fn policy(&self) -> CapabilityPolicy {
        CapabilityPolicy {
            timeout_ms: self.timeout_ms,
            retries: self.retries,
            fallback_safe: self.fallback_safe,
        }
    }
}

fn default_capabilities() -> BTreeMap<String, CapabilityConfig> {
    let mut caps = BTreeMap::new();
    caps.insert(
        "conversation".to_string(),
        CapabilityConfig {
            timeout_ms: 8_000,
            retries: 1,
            fallback_safe: true,
            ..CapabilityConfig::new(CapabilityKind::Conversation)
        },
    );
    caps.insert(
        "recipe".to_string(),
        CapabilityConfig {
            timeout_ms: 15_000,
            retries: 1,
            fallback_safe: true,
            ..CapabilityConfig::new(CapabilityKind::Recipe)
        },
    );
    caps.insert(
        "search".to_string(),
        CapabilityConfig {
            fallback_safe: true,
            ..CapabilityConfig::new(CapabilityKind::Search)
        },
    );
    // Receipt failures are surfaced; a guessed total is worse than an error
    caps.insert(
        "receipt".to_string(),
        CapabilityConfig {
            timeout_ms: 15_000,
            retries: 1,
            ..CapabilityConfig::new(CapabilityKind::Receipt)
        },
    );
    caps
}

/// Validator tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_unparseable_penalty")]
    pub unparseable_penalty: f32,

    #[serde(default = "default_max_repair_fraction")]
    pub max_repair_fraction: f32,

    #[serde(default)]
    pub matching: MatchingPolicy,

    /// Extra basic items per context kind, added to the built-in lists
    #[serde(default)]
    pub extra_basics: HashMap<ContextKind, Vec<String>>,

    /// canonical -> aliases, added to the built-in synonyms
    #[serde(default)]
    pub synonyms: BTreeMap<String, Vec<String>>,

    /// Most context items echoed back in a fallback
    #[serde(default = "default_max_echo_items")]
    pub fallback_echo_items: usize,
}

fn default_unparseable_penalty() -> f32 {
    DEFAULT_UNPARSEABLE_PENALTY
}

fn default_max_repair_fraction() -> f32 {
    DEFAULT_MAX_REPAIR_FRACTION
}

fn default_max_echo_items() -> usize {
    larder_shared::fallback::DEFAULT_MAX_ECHO_ITEMS
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            unparseable_penalty: default_unparseable_penalty(),
            max_repair_fraction: default_max_repair_fraction(),
            matching: MatchingPolicy::default(),
            extra_basics: HashMap::new(),
            synonyms: BTreeMap::new(),
            fallback_echo_items: default_max_echo_items(),
        }
    }
}

impl ValidationConfig {
    /// Validator with built-in tables extended by this config.
    pub fn build_validator(&self) -> Validator {
        let mut synonyms = SynonymTable::with_defaults();
        for (canonical, aliases) in &self.synonyms {
            for alias in aliases {
                synonyms.insert(canonical, alias);
            }
        }

        let mut basics = BasicAllowList::with_defaults();
        for (kind, items) in &self.extra_basics {
            basics.extend(*kind, items);
        }

        Validator::new()
            .with_synonyms(synonyms)
            .with_basics(basics)
            .with_matching(self.matching)
            .with_unparseable_penalty(self.unparseable_penalty)
            .with_max_repair_fraction(self.max_repair_fraction)
    }
}

/// Monitoring event log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// JSONL event log; none disables the log
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_max_entries() -> usize {
    10_000
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            log_path: None,
            max_entries: default_max_entries(),
        }
    }
}

/// Full daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default = "default_capabilities")]
    pub capabilities: BTreeMap<String, CapabilityConfig>,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub events: EventsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            capabilities: default_capabilities(),
            validation: ValidationConfig::default(),
            events: EventsConfig::default(),
        }
    }
}

impl Config {
    /// Load config from file, or return defaults
    pub fn load() -> Self {
        Self::load_from_path(CONFIG_PATH)
            .or_else(|_| Self::load_from_path(DEFAULT_CONFIG_PATH))
            .unwrap_or_else(|e| {
                warn!("Config not found, using defaults: {}", e);
                Config::default()
            })
    }

    /// Load config from specific path
    pub fn load_from_path(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded config from {}", path);
        Ok(config)
    }

    /// Model a capability should use
    pub fn model_for(&self, name: &str) -> &str {
        self.capabilities
            .get(name)
            .and_then(|c| c.model.as_deref())
            .unwrap_or(&self.llm.model)
    }
}
