//! The `tally flag` command.

use std::path::PathBuf;

use anyhow::Result;
use uuid::Uuid;

use super::Workspace;

pub async fn execute(attempt_id: Uuid, reason: String, config_path: Option<PathBuf>) -> Result<()> {
    let workspace = Workspace::open(config_path).await?;
    let flag = workspace.store.flag(attempt_id, &reason).await?;
    workspace.save().await?;

    println!("Flagged {attempt_id}: {}", flag.reason);
    println!("  flag id {}", flag.id);
    Ok(())
}
