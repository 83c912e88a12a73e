mod bootstrap;

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use cur_core::formatting::{format_currency, format_duration};
use cur_core::models::ParseOutput;
use cur_core::normalize::CodeNormalizer;
use cur_core::settings::Settings;
use cur_runtime::{deliver, IngestOrchestrator, JsonLinesSink, MemorySink, WorkloadSink};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::parse();

    bootstrap::setup_logging(settings.effective_log_level(), settings.log_file.as_ref())?;
    tracing::info!("cur-ingest v{} starting", env!("CARGO_PKG_VERSION"));

    let config = settings.engine_config()?;
    let inputs = bootstrap::resolve_inputs(&settings.inputs)?;
    tracing::info!("{} input file(s) to ingest", inputs.len());

    // One normalizer for the whole run: each unknown code is reported once.
    let orchestrator = IngestOrchestrator::new(
        config.clone(),
        CodeNormalizer::new(config.unknown_code_cache_capacity),
    );
    let mut merged = MemorySink::new(config.max_seen_dates);
    let mut reports = Vec::new();
    let mut failures = 0usize;
    let started = Instant::now();

    for path in &inputs {
        match ingest_one(&orchestrator, path, !settings.no_progress).await? {
            Ok(output) => {
                eprintln!("{}\n{}\n", bootstrap::input_label(path), output.summary());
                let metadata = deliver(output, &mut merged)?;
                reports.push(serde_json::json!({
                    "path": path.display().to_string(),
                    "status": "ok",
                    "metadata": metadata,
                }));
            }
            Err(e) => {
                tracing::error!("{}: {}", path.display(), e);
                failures += 1;
                reports.push(serde_json::json!({
                    "path": path.display().to_string(),
                    "status": "failed",
                    "error": e.to_string(),
                }));
            }
        }
    }

    let workloads = merged.into_workloads();
    let total_cost: f64 = workloads.iter().map(|w| w.monthly_cost).sum();
    let written = write_workloads(settings.output.as_deref(), workloads)?;

    if let Some(path) = &settings.summary_json {
        let summary = serde_json::json!({
            "inputs": reports,
            "workloads": written,
            "totalCost": total_cost,
        });
        let file = File::create(path)
            .with_context(|| format!("cannot create {}", path.display()))?;
        serde_json::to_writer_pretty(file, &summary)?;
    }

    eprintln!(
        "{} workloads, {} across {} input(s) in {}",
        written,
        format_currency(total_cost),
        inputs.len() - failures,
        format_duration(started.elapsed())
    );

    if failures > 0 {
        anyhow::bail!("{} of {} inputs failed", failures, inputs.len());
    }
    Ok(())
}

/// Parse one file in a background task, logging progress until it finishes.
///
/// The outer `Result` is for Ctrl+C; the inner one is the parse outcome.
async fn ingest_one(
    orchestrator: &IngestOrchestrator,
    path: &Path,
    show_progress: bool,
) -> Result<cur_core::Result<ParseOutput>> {
    let (mut rx, handle) = orchestrator.start_file(path.to_path_buf());

    let progress = async {
        let mut next_mark = 10.0;
        while let Some(p) = rx.recv().await {
            if show_progress && p.percent >= next_mark {
                tracing::info!(
                    "{}: {:.0}% ({} lines)",
                    path.display(),
                    p.percent,
                    p.lines_processed
                );
                while next_mark <= p.percent {
                    next_mark += 10.0;
                }
            }
        }
    };

    tokio::select! {
        _ = progress => Ok(handle.join().await),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl+C received; aborting ingest of {}", path.display());
            handle.abort();
            anyhow::bail!("interrupted")
        }
    }
}

/// Write workloads as JSON lines to `output`, or stdout when `None`.
fn write_workloads(
    output: Option<&Path>,
    workloads: Vec<cur_core::models::Workload>,
) -> Result<u64> {
    let writer: Box<dyn Write> = match output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("cannot create {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout().lock()),
    };
    let mut sink = JsonLinesSink::new(writer);
    for workload in workloads {
        sink.save(workload)?;
    }
    sink.flush()?;
    Ok(sink.written())
}
