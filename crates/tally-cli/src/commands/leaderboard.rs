//! The `tally leaderboard` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use tally_report::html::{generate_leaderboard_html, write_html};

use super::Workspace;

pub async fn execute(
    test_id: String,
    json: bool,
    html: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let workspace = Workspace::open(config_path).await?;
    let board = workspace
        .store
        .leaderboard(&test_id)
        .await
        .with_context(|| format!("no attempts stored for test {test_id}"))?;

    if let Some(path) = &html {
        write_html(&generate_leaderboard_html(&board), path)?;
        eprintln!("HTML leaderboard: {}", path.display());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&board)?);
        return Ok(());
    }

    println!("{} ({})", board.test_name, board.test_id);
    let mut table = Table::new();
    table.set_header(vec![
        "Rank", "Student", "Identity", "Score", "Accuracy", "Net", "C/W/S",
    ]);
    for e in &board.entries {
        let rank = if e.is_top_3 {
            format!("{} *", e.rank)
        } else {
            e.rank.to_string()
        };
        table.add_row(vec![
            Cell::new(rank),
            Cell::new(&e.student_name),
            Cell::new(&e.identity),
            Cell::new(format!("{:.2}", e.total)),
            Cell::new(format!("{:.1}%", e.accuracy)),
            Cell::new(e.net_correct),
            Cell::new(format!("{}/{}/{}", e.correct, e.wrong, e.skipped)),
        ]);
    }
    println!("{table}");

    Ok(())
}
