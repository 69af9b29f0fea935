//! Monitoring events and the JSONL event log.
//!
//! Events carry internal reasons; they are for operators, never for the
//! user-facing payload. The log is append-only with rotation.

use crate::pipeline::PipelineState;
use crate::validation::{ValidationLevel, ValidationOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// One pipeline state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub request_id: String,
    pub from: PipelineState,
    pub to: PipelineState,
    pub level: ValidationLevel,
    /// Registry name, once resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ValidationOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    /// Time since the request was received
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Per-request validation summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationEvent {
    pub request_id: String,
    pub level: ValidationLevel,
    pub outcome: ValidationOutcome,
    pub confidence: f32,
    pub latency_ms: u64,
    pub capability: String,
    #[serde(default)]
    pub total_claims: usize,
    #[serde(default)]
    pub flagged_claims: usize,
    #[serde(default)]
    pub unparseable: bool,
    /// Internal reason: timeout, capability_error, validation_failed, ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    Transition(StateTransition),
    Validation(ValidationEvent),
}

impl MonitorEvent {
    pub fn request_id(&self) -> &str {
        match self {
            Self::Transition(t) => &t.request_id,
            Self::Validation(v) => &v.request_id,
        }
    }

    pub fn as_validation(&self) -> Option<&ValidationEvent> {
        match self {
            Self::Validation(v) => Some(v),
            Self::Transition(_) => None,
        }
    }

    pub fn as_transition(&self) -> Option<&StateTransition> {
        match self {
            Self::Transition(t) => Some(t),
            Self::Validation(_) => None,
        }
    }
}

/// Append-only JSONL store for monitor events, with rotation.
pub struct EventLog {
    path: PathBuf,
    max_entries: usize,
}

impl EventLog {
    pub fn new(path: impl AsRef<Path>, max_entries: usize) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_entries: max_entries.max(1),
        }
    }

    /// Default location in state directory
    pub fn default_path() -> PathBuf {
        PathBuf::from("/var/lib/larder/events.jsonl")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an event
    pub fn append(&self, event: &MonitorEvent) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let line = serde_json::to_string(event)?;
        writeln!(file, "{}", line)?;

        self.maybe_rotate()
    }

    /// Read all events; unreadable lines are skipped
    pub fn read_all(&self) -> std::io::Result<Vec<MonitorEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(event) = serde_json::from_str::<MonitorEvent>(&line) {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Validation summary over the stored events
    pub fn summary(&self) -> std::io::Result<EventSummary> {
        Ok(EventSummary::from_events(&self.read_all()?))
    }

    fn maybe_rotate(&self) -> std::io::Result<()> {
        let events = self.read_all()?;
        if events.len() <= self.max_entries {
            return Ok(());
        }

        // Keep 75% after rotation
        let keep = (self.max_entries * 3 / 4).max(1);
        let to_keep = &events[events.len() - keep..];

        let temp_path = self.path.with_extension("jsonl.tmp");
        {
            let mut file = File::create(&temp_path)?;
            for event in to_keep {
                writeln!(file, "{}", serde_json::to_string(event)?)?;
            }
        }
        fs::rename(&temp_path, &self.path)
    }
}

/// Aggregate view of validation events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    pub total: u64,
    pub passed: u64,
    pub repaired: u64,
    pub fallbacks: u64,
    pub avg_confidence: f32,
    pub avg_latency_ms: f64,
    pub by_capability: HashMap<String, u64>,
    pub by_reason: HashMap<String, u64>,
}

impl EventSummary {
    pub fn from_events(events: &[MonitorEvent]) -> Self {
        let mut summary = Self::default();
        let mut confidence_sum = 0.0f32;
        let mut latency_sum = 0u64;

        for v in events.iter().filter_map(MonitorEvent::as_validation) {
            summary.total += 1;
            match v.outcome {
                ValidationOutcome::Pass => summary.passed += 1,
                ValidationOutcome::Repaired => summary.repaired += 1,
                ValidationOutcome::Fallback => summary.fallbacks += 1,
            }
            confidence_sum += v.confidence;
            latency_sum += v.latency_ms;
            *summary.by_capability.entry(v.capability.clone()).or_insert(0) += 1;
            if let Some(reason) = &v.reason {
                *summary.by_reason.entry(reason.clone()).or_insert(0) += 1;
            }
        }

        if summary.total > 0 {
            summary.avg_confidence = confidence_sum / summary.total as f32;
            summary.avg_latency_ms = latency_sum as f64 / summary.total as f64;
        }
        summary
    }

    /// Share of requests answered with a fallback
    pub fn fallback_rate(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.fallbacks as f32 / self.total as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validation(id: &str, outcome: ValidationOutcome, confidence: f32, reason: Option<&str>) -> MonitorEvent {
        MonitorEvent::Validation(ValidationEvent {
            request_id: id.to_string(),
            level: ValidationLevel::Moderate,
            outcome,
            confidence,
            latency_ms: 100,
            capability: "recipe".to_string(),
            total_claims: 3,
            flagged_claims: 0,
            unparseable: false,
            reason: reason.map(str::to_string),
            timestamp: Utc::now(),
        })
    }

    #[test]
    fn event_json_is_tagged() {
        let json = serde_json::to_string(&validation("r1", ValidationOutcome::Pass, 1.0, None)).unwrap();
        assert!(json.contains(r#""event":"validation""#));
        assert!(json.contains(r#""outcome":"pass""#));
        assert!(!json.contains("reason"));
    }

    #[test]
    fn log_appends_and_reads() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path().join("events.jsonl"), 100);
        log.append(&validation("r1", ValidationOutcome::Pass, 1.0, None)).unwrap();
        log.append(&validation("r2", ValidationOutcome::Fallback, 0.0, Some("timeout"))).unwrap();

        let events = log.read_all().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].request_id(), "r2");
    }

    #[test]
    fn log_rotates_to_three_quarters() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path().join("events.jsonl"), 4);
        for i in 0..5 {
            log.append(&validation(&format!("r{}", i), ValidationOutcome::Pass, 1.0, None))
                .unwrap();
        }
        let events = log.read_all().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].request_id(), "r2");
    }

    #[test]
    fn missing_log_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path().join("none.jsonl"), 10);
        assert!(log.read_all().unwrap().is_empty());
    }

    #[test]
    fn summary_counts_outcomes_and_reasons() {
        let events = vec![
            validation("a", ValidationOutcome::Pass, 1.0, None),
            validation("b", ValidationOutcome::Repaired, 0.5, Some("validation_failed")),
            validation("c", ValidationOutcome::Fallback, 0.0, Some("timeout")),
            validation("d", ValidationOutcome::Fallback, 0.5, Some("timeout")),
        ];
        let summary = EventSummary::from_events(&events);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.fallbacks, 2);
        assert_eq!(summary.by_reason["timeout"], 2);
        assert_eq!(summary.fallback_rate(), 0.5);
        assert_eq!(summary.avg_confidence, 0.5);
    }
}
