//! The `tally init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    write_if_missing(Path::new("tally.toml"), SAMPLE_CONFIG)?;
    write_if_missing(Path::new("catalog.toml"), SAMPLE_CATALOG)?;
    std::fs::create_dir_all("batches")?;
    write_if_missing(Path::new("batches/sample.json"), SAMPLE_BATCH)?;

    println!("\nNext steps:");
    println!("  1. Edit catalog.toml with your tests' answer keys");
    println!("  2. Run: tally validate --catalog catalog.toml --batch batches/sample.json");
    println!("  3. Run: tally ingest --batch batches/sample.json");
    println!("  4. Run: tally leaderboard jee-mock-1");

    Ok(())
}

fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
    } else {
        std::fs::write(path, content)?;
        println!("Created {}", path.display());
    }
    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# tally configuration

# Attempts by the same student starting within this many seconds of each
# other, with near-identical answers, are duplicates.
time_window_secs = 420
similarity_threshold = 0.92
parallelism = 4

state_path = "./tally-state.json"
catalog_path = "./catalog.toml"

# Used for tests that are not in the catalog.
default_max_marks = 400

[default_marking]
correct = 4
wrong = -1
skip = 0
"#;

const SAMPLE_CATALOG: &str = r#"[[tests]]
id = "jee-mock-1"
name = "JEE Mock 1"
max_marks = 20

[tests.marking]
correct = 4
wrong = -1
skip = 0

[tests.answer_key]
1 = "A"
2 = "C"
3 = "B"
4 = "D"
5 = "A"
"#;

const SAMPLE_BATCH: &str = r#"{
  "events": [
    {
      "event_id": "evt-001",
      "student_name": "Asha Rao",
      "student_email": "Asha.Rao+jee@gmail.com",
      "test_id": "jee-mock-1",
      "test_name": "JEE Mock 1",
      "started_at": "2025-03-01T09:00:00Z",
      "submitted_at": "2025-03-01T09:45:00Z",
      "answers": {"1": "A", "2": "C", "3": "B", "4": "A", "5": "SKIP"}
    },
    {
      "event_id": "evt-002",
      "student_name": "Asha Rao",
      "student_email": "asha.rao@gmail.com",
      "test_id": "jee-mock-1",
      "test_name": "JEE Mock 1",
      "started_at": "2025-03-01T09:03:00Z",
      "submitted_at": "2025-03-01T09:47:00Z",
      "answers": {"1": "A", "2": "C", "3": "B", "4": "A", "5": "SKIP"}
    },
    {
      "event_id": "evt-003",
      "student_name": "Vikram Singh",
      "student_phone": "+91 98765 43210",
      "test_id": "jee-mock-1",
      "test_name": "JEE Mock 1",
      "started_at": "2025-03-01T09:01:00Z",
      "answers": {"1": "A", "2": "B", "3": "B", "4": "D", "5": "A"}
    }
  ]
}
"#;
