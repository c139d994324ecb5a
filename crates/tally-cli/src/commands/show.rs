//! The `tally show` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use serde_json::json;
use uuid::Uuid;

use tally_core::traits::AttemptStore;

use super::Workspace;

pub async fn execute(attempt_id: Uuid, json: bool, config_path: Option<PathBuf>) -> Result<()> {
    let workspace = Workspace::open(config_path).await?;
    let store = &workspace.store;

    let attempt = store
        .get_attempt(attempt_id)
        .await?
        .with_context(|| format!("attempt not found: {attempt_id}"))?;
    let score = store.score(attempt_id).await;
    let flags = store.flags_for(attempt_id).await;
    let thread = store.duplicate_thread(attempt_id).await?;

    if json {
        let value = json!({
            "attempt": attempt,
            "score": score,
            "flags": flags,
            "duplicate_thread": thread,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Attempt {}", attempt.id);
    println!("  student   {} <{}>", attempt.student_name, attempt.identity);
    println!("  test      {} ({})", attempt.test_name, attempt.test_id);
    println!("  event     {}", attempt.source_event_id);
    println!("  state     {}", attempt.state);
    println!("  started   {}", attempt.started_at.to_rfc3339());
    if let Some(submitted) = attempt.submitted_at {
        println!("  submitted {}", submitted.to_rfc3339());
    }
    if let Some(canonical) = attempt.duplicate_of {
        println!("  duplicate of {canonical}");
    }

    if let Some(record) = &score {
        let b = &record.breakdown;
        let e = &b.explanation;
        println!(
            "\nScore {:.2} ({} correct, {} wrong, {} skipped, accuracy {:.1}%, net {})",
            b.total, b.correct, b.wrong, b.skipped, b.accuracy, b.net_correct
        );
        println!(
            "  {} x {} + {} x {} + {} x {} = {:.2}",
            e.counts.correct,
            e.marking_scheme.correct,
            e.counts.wrong,
            e.marking_scheme.wrong,
            e.counts.skipped,
            e.marking_scheme.skip,
            e.breakdown.total
        );
    }

    for flag in &flags {
        println!(
            "\nFlag {} ({}): {}",
            flag.id,
            flag.created_at.format("%Y-%m-%d %H:%M"),
            flag.reason
        );
    }

    if thread.entries.len() > 1 {
        let mut table = Table::new();
        table.set_header(vec!["Attempt", "Event", "State", "Started", "Score", "Canonical"]);
        for entry in &thread.entries {
            table.add_row(vec![
                Cell::new(entry.attempt_id),
                Cell::new(&entry.source_event_id),
                Cell::new(entry.state),
                Cell::new(entry.started_at.format("%Y-%m-%d %H:%M:%S")),
                Cell::new(entry.score.map(|s| format!("{s:.2}")).unwrap_or_default()),
                Cell::new(if entry.is_canonical { "yes" } else { "" }),
            ]);
        }
        println!("\nDuplicate thread:\n{table}");
    }

    Ok(())
}
