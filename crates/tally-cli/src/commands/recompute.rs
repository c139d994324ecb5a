//! The `tally recompute` command.

use std::path::PathBuf;

use anyhow::Result;
use uuid::Uuid;

use tally_core::engine::IngestEngine;

use super::Workspace;

pub async fn execute(attempt_id: Uuid, config_path: Option<PathBuf>) -> Result<()> {
    let workspace = Workspace::open(config_path).await?;
    let engine = IngestEngine::new(
        workspace.store.clone(),
        workspace.store.clone(),
        workspace.config.engine(),
    );

    let previous = workspace.store.score(attempt_id).await;
    let record = engine.recompute(attempt_id).await?;
    workspace.save().await?;

    let b = &record.breakdown;
    match previous {
        Some(old) if old.breakdown.total != b.total => println!(
            "Recomputed {attempt_id}: {:.2} -> {:.2}",
            old.breakdown.total, b.total
        ),
        _ => println!("Recomputed {attempt_id}: {:.2}", b.total),
    }
    println!(
        "  correct {}  wrong {}  skipped {}  accuracy {:.1}%  net {}",
        b.correct, b.wrong, b.skipped, b.accuracy, b.net_correct
    );
    Ok(())
}
