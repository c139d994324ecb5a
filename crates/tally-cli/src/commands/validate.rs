//! The `tally validate` command.

use std::path::PathBuf;

use anyhow::Result;

use tally_core::event::AttemptEvent;
use tally_core::parser;

pub fn execute(catalog_path: PathBuf, batch: Option<PathBuf>) -> Result<()> {
    let catalog = parser::parse_catalog(&catalog_path)?;
    println!("Catalog: {} ({} tests)", catalog_path.display(), catalog.tests.len());

    let warnings = parser::validate_catalog(&catalog);
    for w in &warnings {
        let prefix = w
            .test_id
            .as_ref()
            .map(|id| format!("  [{id}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }
    let mut total_warnings = warnings.len();

    if let Some(batch_path) = batch {
        let records = parser::load_batch(&batch_path)?;
        println!("Batch: {} ({} events)", batch_path.display(), records.len());
        for (index, record) in records.into_iter().enumerate() {
            match AttemptEvent::parse(record) {
                Ok(event) if event.identity().is_none() => {
                    println!("  [#{index} {}] WARNING: no usable identity", event.event_id);
                    total_warnings += 1;
                }
                Ok(event) if catalog.get(&event.test_id).is_none() => {
                    println!(
                        "  [#{index} {}] WARNING: test {} is not in the catalog",
                        event.event_id, event.test_id
                    );
                    total_warnings += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    println!("  [#{index}] WARNING: {e}");
                    total_warnings += 1;
                }
            }
        }
    }

    if total_warnings == 0 {
        println!("All inputs valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
