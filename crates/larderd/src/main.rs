//! Larder Daemon - validated kitchen assistant responses
//!
//! Reads one JSON request from a file argument or stdin, runs it through the
//! orchestrator and prints the JSON response.

use anyhow::{Context, Result};
use larder_shared::event::EventLog;
use larder_shared::fallback::FallbackGenerator;
use larder_shared::request::Request;
use larder_shared::response::ErrorResponse;
use larderd::config::Config;
use larderd::sink::{spawn_jsonl_writer, EventSink, MultiSink, TracingSink};
use larderd::{ollama, AttachmentContextProvider, Orchestrator, Registry};
use std::io::Read;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn read_request() -> Result<Request> {
    let raw = match std::env::args().nth(1) {
        Some(path) if path != "-" => {
            std::fs::read_to_string(&path).with_context(|| format!("reading {}", path))?
        }
        _ => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    serde_json::from_str(&raw).context("parsing request JSON")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    info!("Larder Daemon v{} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::load();
    let request = read_request()?;

    let mut registry = Registry::new();
    ollama::register_configured(&mut registry, &config)?;

    let mut sink = MultiSink::new().with(Arc::new(TracingSink));
    let writer = match &config.events.log_path {
        Some(path) => {
            let (channel, handle) = spawn_jsonl_writer(EventLog::new(path, config.events.max_entries));
            sink = sink.with(Arc::new(channel));
            Some(handle)
        }
        None => None,
    };
    let sink: Arc<dyn EventSink> = Arc::new(sink);

    let orchestrator = Orchestrator::new(
        Arc::new(registry),
        Arc::new(AttachmentContextProvider::new()),
        sink,
    )
    .with_validator(Arc::new(config.validation.build_validator()))
    .with_fallback(FallbackGenerator::new(config.validation.fallback_echo_items));

    let cancel = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let result = orchestrator.handle_until(&request, cancel).await;

    // Close the event channel so the writer drains and exits
    drop(orchestrator);
    if let Some(handle) = writer {
        if let Err(e) = handle.await {
            warn!("Event writer stopped abnormally: {}", e);
        }
    }

    match result {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Err(e) => {
            warn!("[{}] request failed: {}", request.id, e);
            println!("{}", serde_json::to_string_pretty(&ErrorResponse::from_error(&request.id, &e))?);
            std::process::exit(1);
        }
    }
}
