//! Collaborator traits for storage and marking schemes.
//!
//! The core never performs I/O itself. The ingestion engine loads candidate
//! pools and test definitions through these traits before computing, and
//! hands the results back afterwards. `tally-store` provides the in-memory
//! implementation used by the CLI.

use async_trait::async_trait;

use crate::model::{Attempt, AttemptId, TestDefinition};
use crate::pipeline::PartitionOutcome;
use crate::scoring::ScoreRecord;

// ---------------------------------------------------------------------------
// Attempt storage
// ---------------------------------------------------------------------------

/// Durable home of attempts and score records.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Every stored attempt of a test, with its cluster links.
    async fn load_attempts(&self, test_id: &str) -> anyhow::Result<Vec<Attempt>>;

    /// Look up a single attempt.
    async fn get_attempt(&self, id: AttemptId) -> anyhow::Result<Option<Attempt>>;

    /// Persist one partition's changes atomically.
    async fn persist_partition(&self, outcome: &PartitionOutcome) -> anyhow::Result<()>;

    /// Replace the score record of an attempt (recompute).
    async fn replace_score(&self, record: ScoreRecord) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// Marking schemes
// ---------------------------------------------------------------------------

/// Supplies the marking scheme and answer key of a test.
#[async_trait]
pub trait SchemeSource: Send + Sync {
    /// Definition of `test_id`. `test_name` is the display name carried by
    /// the event, for sources that register unknown tests on first sight.
    async fn definition(&self, test_id: &str, test_name: &str) -> anyhow::Result<TestDefinition>;
}
