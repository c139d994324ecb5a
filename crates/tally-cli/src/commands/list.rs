//! The `tally list` command.

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use comfy_table::{Cell, Table};

use tally_core::event::parse_timestamp;
use tally_store::AttemptFilter;

use super::Workspace;

/// Clap value parser for `--from` / `--to`. A bare date means midnight UTC.
pub fn parse_start_bound(raw: &str) -> Result<DateTime<Utc>, String> {
    parse_timestamp(raw)
        .or_else(|| {
            NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
        .ok_or_else(|| format!("not a date or timestamp: {raw}"))
}

pub async fn execute(
    filter: AttemptFilter,
    page: usize,
    per_page: usize,
    json: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let workspace = Workspace::open(config_path).await?;
    let listed = workspace
        .store
        .list_attempts(&filter, page, per_page)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&listed)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec![
        "Attempt", "Student", "Identity", "Test", "Started", "State", "Score", "Flags",
    ]);
    for row in &listed.entries {
        table.add_row(vec![
            Cell::new(row.attempt_id),
            Cell::new(&row.student_name),
            Cell::new(&row.identity),
            Cell::new(&row.test_id),
            Cell::new(row.started_at.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(row.state),
            Cell::new(row.score.map(|s| format!("{s:.2}")).unwrap_or_default()),
            Cell::new(row.flags),
        ]);
    }
    println!("{table}");
    println!(
        "Page {}/{} ({} attempt(s) total)",
        listed.page,
        listed.total_pages.max(1),
        listed.total
    );

    Ok(())
}
