//! The `tally ingest` command.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use tally_core::engine::{IngestEngine, ProgressReporter};
use tally_core::parser;
use tally_core::report::{EventOutcome, EventStatus, IngestReport, IngestSummary};
use tally_report::html::{generate_ingest_html, write_html};

use super::Workspace;

/// Console progress reporter.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_partition_start(&self, test_id: &str, events: usize) {
        eprintln!("  Test {test_id}: {events} event(s)");
    }

    fn on_event_complete(&self, outcome: &EventOutcome) {
        if outcome.status == EventStatus::Error {
            eprintln!(
                "  Rejected #{} ({}): {}",
                outcome.index,
                outcome.event_id.as_deref().unwrap_or("no event id"),
                outcome.reason.as_deref().unwrap_or("unknown error"),
            );
        }
    }

    fn on_partition_error(&self, test_id: &str, error: &str) {
        eprintln!("  ERROR: test {test_id}: {error}");
    }

    fn on_batch_complete(&self, summary: &IngestSummary, elapsed: Duration) {
        eprintln!(
            "\nComplete: {}/{} ingested, {} duplicate(s), {} error(s) ({:.1}s)",
            summary.ingested,
            summary.total_received,
            summary.duplicates_detected,
            summary.errors,
            elapsed.as_secs_f64()
        );
    }
}

pub async fn execute(
    batch: PathBuf,
    output: PathBuf,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let records = parser::load_batch(&batch)?;
    let workspace = Workspace::open(config_path).await?;

    let engine = IngestEngine::new(
        workspace.store.clone(),
        workspace.store.clone(),
        workspace.config.engine(),
    );

    eprintln!(
        "tally v{}: ingesting {} event(s) from {}",
        env!("CARGO_PKG_VERSION"),
        records.len(),
        batch.display()
    );
    let report = engine.ingest(records, &ConsoleReporter).await?;
    workspace.save().await?;

    let formats: Vec<&str> = if format == "all" {
        vec!["text", "json", "html"]
    } else {
        format.split(',').map(str::trim).collect()
    };

    for fmt in &formats {
        match *fmt {
            "text" => print_summary(&report),
            "json" => {
                let path = output.join(format!("ingest-{}.json", report.id));
                report.save_json(&path)?;
                eprintln!("Report saved to: {}", path.display());
            }
            "html" => {
                let path = output.join(format!("ingest-{}.html", report.id));
                write_html(&generate_ingest_html(&report), &path)?;
                eprintln!("HTML report: {}", path.display());
            }
            _ => {
                eprintln!("Unknown format: {fmt}");
            }
        }
    }

    Ok(())
}

fn print_summary(report: &IngestReport) {
    use comfy_table::{Cell, Table};

    let s = &report.summary;
    let mut table = Table::new();
    table.set_header(vec![
        "Received",
        "Ingested",
        "Duplicates",
        "Scored",
        "Errors",
        "Replayed",
    ]);
    table.add_row(vec![
        Cell::new(s.total_received),
        Cell::new(s.ingested),
        Cell::new(s.duplicates_detected),
        Cell::new(s.scored),
        Cell::new(s.errors),
        Cell::new(s.replayed),
    ]);
    println!("{table}");

    let mut events = Table::new();
    events.set_header(vec!["#", "Event", "Status", "Attempt", "Canonical", "Score"]);
    for o in &report.outcomes {
        events.add_row(vec![
            Cell::new(o.index),
            Cell::new(o.event_id.as_deref().unwrap_or("-")),
            Cell::new(o.status),
            Cell::new(o.attempt_id.map(|id| id.to_string()).unwrap_or_default()),
            Cell::new(
                o.canonical_attempt_id
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
            ),
            Cell::new(o.score.map(|s| format!("{s:.2}")).unwrap_or_default()),
        ]);
    }
    println!("{events}");
}
