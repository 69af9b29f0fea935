//! Monitoring sinks.
//!
//! `emit` is synchronous and must never block the response path. Sinks that
//! need I/O hand the event to a background task over an unbounded channel.

use larder_shared::event::{EventLog, MonitorEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub trait EventSink: Send + Sync {
    fn emit(&self, event: MonitorEvent);
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: MonitorEvent) {}
}

/// Writes each event as a structured tracing record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: MonitorEvent) {
        match &event {
            MonitorEvent::Transition(t) => debug!(
                request_id = %t.request_id,
                from = %t.from,
                to = %t.to,
                level = %t.level,
                capability = t.capability.as_deref().unwrap_or("-"),
                elapsed_ms = t.elapsed_ms,
                reason = t.reason.as_deref().unwrap_or("-"),
                "pipeline transition"
            ),
            MonitorEvent::Validation(v) => info!(
                request_id = %v.request_id,
                capability = %v.capability,
                level = %v.level,
                outcome = %v.outcome,
                confidence = v.confidence,
                latency_ms = v.latency_ms,
                flagged = v.flagged_claims,
                reason = v.reason.as_deref().unwrap_or("-"),
                "validation"
            ),
        }
    }
}

/// Forwards events to an unbounded channel; send errors are ignored.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<MonitorEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MonitorEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: MonitorEvent) {
        let _ = self.tx.send(event);
    }
}

/// Fans each event out to several sinks.
#[derive(Clone, Default)]
pub struct MultiSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for MultiSink {
    fn emit(&self, event: MonitorEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(event.clone());
            }
            last.emit(event);
        }
    }
}

/// Channel sink backed by a task appending to `log`.
///
/// The task ends once every clone of the returned sink is dropped.
pub fn spawn_jsonl_writer(log: EventLog) -> (ChannelSink, JoinHandle<()>) {
    let (sink, mut rx) = ChannelSink::new();
    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Err(e) = log.append(&event) {
                warn!("Failed to append event to {}: {}", log.path().display(), e);
            }
        }
    });
    (sink, handle)
}
