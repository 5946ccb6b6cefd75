//! audit-relay - command-line driver
//!
//! Reads newline-delimited JSON events and pushes each one through the
//! dispatch pipeline, then drains queued deliveries and exits.

use anyhow::{Context, Result};
use audit_relay::{
    cli::Cli,
    config::Config,
    services::{self, Extensions},
    settings::MemorySettingsStore,
};
use clap::Parser;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = Config::load(&cli).unwrap_or_else(|err| {
        init_tracing("info");
        error!("Failed to load configuration: {}", err);
        std::process::exit(1);
    });

    init_tracing(&config.log_level);
    info!("audit-relay starting up...");

    let store = Arc::new(MemorySettingsStore::new());
    let mut pipeline = services::build(&config, store, Extensions::default())?;

    let processed = match &cli.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open input file {}", path.display()))?;
            process_lines(&pipeline.manager, BufReader::new(file)).await?
        }
        None => process_lines(&pipeline.manager, BufReader::new(tokio::io::stdin())).await?,
    };

    let drained = pipeline.worker.run_pending().await;
    info!(events = processed, queued_delivered = drained, "Input exhausted, shutting down");
    Ok(())
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn process_lines<R>(manager: &audit_relay::DispatchManager, reader: R) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut processed = 0;
    let mut line_no = 0;

    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let (context, data) = match split_row(&line) {
            Ok(parts) => parts,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping malformed event");
                continue;
            }
        };

        let report = manager.process_logged_event(context, &data, None).await;
        debug!(line = line_no, ?report, "Event dispatched");
        processed += 1;
    }

    Ok(processed)
}

/// Splits a stored-row JSON object into its context and the remaining columns.
fn split_row(line: &str) -> Result<(Map<String, Value>, Map<String, Value>)> {
    let mut data = match serde_json::from_str::<Value>(line)? {
        Value::Object(map) => map,
        other => anyhow::bail!("expected a JSON object, got {}", other),
    };
    let context = match data.remove("context") {
        Some(Value::Object(context)) => context,
        Some(Value::Null) | None => Map::new(),
        Some(_) => anyhow::bail!("'context' must be an object"),
    };
    Ok((context, data))
}
