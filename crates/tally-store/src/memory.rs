//! In-memory attempt store with JSON snapshot persistence.
//!
//! The CLI loads the snapshot at startup, hands the store to the ingestion
//! engine and writes the snapshot back once the command has finished.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use tally_core::leaderboard::{compute_leaderboard, Leaderboard};
use tally_core::model::{Attempt, AttemptId, AttemptState, MarkingScheme, TestDefinition};
use tally_core::parser::Catalog;
use tally_core::pipeline::PartitionOutcome;
use tally_core::scoring::ScoreRecord;
use tally_core::traits::{AttemptStore, SchemeSource};

use crate::error::StoreError;
use crate::listing::{check_page, paginate, AttemptFilter, AttemptPage, AttemptRow};

/// A manual review flag on an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flag {
    pub id: Uuid,
    pub attempt_id: AttemptId,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// One member of a duplicate cluster, as shown to reviewers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadEntry {
    pub attempt_id: AttemptId,
    pub source_event_id: String,
    pub state: AttemptState,
    pub started_at: DateTime<Utc>,
    pub score: Option<f64>,
    pub is_canonical: bool,
}

/// A canonical attempt and every duplicate linked to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateThread {
    pub canonical_id: AttemptId,
    /// Canonical first, then by start time.
    pub entries: Vec<ThreadEntry>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    #[serde(default)]
    tests: BTreeMap<String, TestDefinition>,
    #[serde(default)]
    attempts: BTreeMap<AttemptId, Attempt>,
    #[serde(default)]
    scores: BTreeMap<AttemptId, ScoreRecord>,
    #[serde(default)]
    flags: Vec<Flag>,
}

/// Attempt store and marking-scheme source backed by process memory.
pub struct InMemoryStore {
    state: RwLock<StoreState>,
    default_marking: MarkingScheme,
    default_max_marks: u32,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(MarkingScheme::default(), tally_core::model::default_max_marks())
    }
}

impl InMemoryStore {
    /// Empty store; unknown tests are registered with `default_marking`.
    pub fn new(default_marking: MarkingScheme, default_max_marks: u32) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            default_marking,
            default_max_marks,
        }
    }

    /// Load a snapshot, or start empty when the file does not exist yet.
    pub fn open(
        path: &Path,
        default_marking: MarkingScheme,
        default_max_marks: u32,
    ) -> Result<Self, StoreError> {
        let store = Self::new(default_marking, default_max_marks);
        if !path.exists() {
            tracing::debug!("no snapshot at {}, starting empty", path.display());
            return Ok(store);
        }

        let content = std::fs::read_to_string(path).map_err(|source| StoreError::SnapshotIo {
            path: path.to_path_buf(),
            source,
        })?;
        let state: StoreState =
            serde_json::from_str(&content).map_err(|e| StoreError::CorruptSnapshot {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        tracing::debug!(
            attempts = state.attempts.len(),
            scores = state.scores.len(),
            "snapshot loaded from {}",
            path.display()
        );

        Ok(Self {
            state: RwLock::new(state),
            ..store
        })
    }

    /// Write the snapshot. The file is replaced in one rename.
    pub async fn save(&self, path: &Path) -> Result<(), StoreError> {
        let io = |source| StoreError::SnapshotIo {
            path: path.to_path_buf(),
            source,
        };
        let json = {
            let state = self.state.read().await;
            serde_json::to_string_pretty(&*state).map_err(|e| StoreError::CorruptSnapshot {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io)?;
        std::fs::rename(&tmp, path).map_err(io)?;
        Ok(())
    }

    /// Install catalog definitions, replacing stored ones with the same id.
    pub async fn register_catalog(&self, catalog: &Catalog) {
        let mut state = self.state.write().await;
        for test in &catalog.tests {
            state.tests.insert(test.id.clone(), test.clone());
        }
    }

    pub async fn test(&self, test_id: &str) -> Option<TestDefinition> {
        self.state.read().await.tests.get(test_id).cloned()
    }

    /// Ids of every test with at least one stored attempt.
    pub async fn test_ids(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut ids: Vec<String> = state.attempts.values().map(|a| a.test_id.clone()).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub async fn score(&self, attempt_id: AttemptId) -> Option<ScoreRecord> {
        self.state.read().await.scores.get(&attempt_id).cloned()
    }

    pub async fn attempt_count(&self) -> usize {
        self.state.read().await.attempts.len()
    }

    /// Flag an attempt for manual review. The attempt becomes FLAGGED.
    pub async fn flag(&self, attempt_id: AttemptId, reason: &str) -> Result<Flag, StoreError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(StoreError::EmptyFlagReason);
        }

        let mut state = self.state.write().await;
        let attempt = state
            .attempts
            .get_mut(&attempt_id)
            .ok_or(StoreError::AttemptNotFound(attempt_id))?;
        attempt.state = AttemptState::Flagged;

        let flag = Flag {
            id: Uuid::new_v4(),
            attempt_id,
            reason: reason.to_string(),
            created_at: Utc::now(),
        };
        state.flags.push(flag.clone());
        tracing::info!(attempt_id = %attempt_id, reason = %flag.reason, "attempt flagged");
        Ok(flag)
    }

    pub async fn flags_for(&self, attempt_id: AttemptId) -> Vec<Flag> {
        self.state
            .read()
            .await
            .flags
            .iter()
            .filter(|f| f.attempt_id == attempt_id)
            .cloned()
            .collect()
    }

    /// The duplicate cluster `attempt_id` belongs to.
    pub async fn duplicate_thread(&self, attempt_id: AttemptId) -> Result<DuplicateThread, StoreError> {
        let state = self.state.read().await;
        let attempt = state
            .attempts
            .get(&attempt_id)
            .ok_or(StoreError::AttemptNotFound(attempt_id))?;
        let canonical_id = attempt
            .duplicate_of
            .filter(|id| state.attempts.contains_key(id))
            .unwrap_or(attempt.id);

        let mut members: Vec<&Attempt> = state
            .attempts
            .values()
            .filter(|a| a.id == canonical_id || a.duplicate_of == Some(canonical_id))
            .collect();
        members.sort_by_key(|a| (a.id != canonical_id, a.started_at, a.sequence));

        let entries = members
            .into_iter()
            .map(|a| ThreadEntry {
                attempt_id: a.id,
                source_event_id: a.source_event_id.clone(),
                state: a.state,
                started_at: a.started_at,
                score: state.scores.get(&a.id).map(|s| s.breakdown.total),
                is_canonical: a.id == canonical_id,
            })
            .collect();

        Ok(DuplicateThread {
            canonical_id,
            entries,
        })
    }

    /// Attempts matching `filter`, newest start first, one page at a time.
    pub async fn list_attempts(
        &self,
        filter: &AttemptFilter,
        page: usize,
        per_page: usize,
    ) -> Result<AttemptPage, StoreError> {
        check_page(page, per_page)?;

        let state = self.state.read().await;
        let mut matched: Vec<&Attempt> = state
            .attempts
            .values()
            .filter(|a| filter.matches(a))
            .collect();
        matched.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then(b.sequence.cmp(&a.sequence))
        });

        let rows = matched
            .into_iter()
            .map(|a| AttemptRow {
                attempt_id: a.id,
                source_event_id: a.source_event_id.clone(),
                student_name: a.student_name.clone(),
                identity: a.identity.clone(),
                test_id: a.test_id.clone(),
                state: a.state,
                duplicate_of: a.duplicate_of,
                started_at: a.started_at,
                score: state.scores.get(&a.id).map(|s| s.breakdown.total),
                flags: state.flags.iter().filter(|f| f.attempt_id == a.id).count(),
            })
            .collect();

        let listed = paginate(rows, page, per_page);
        tracing::debug!(
            page,
            returned = listed.entries.len(),
            total = listed.total,
            "attempts listed"
        );
        Ok(listed)
    }

    /// Leaderboard of one test, or `None` if nothing was stored for it.
    pub async fn leaderboard(&self, test_id: &str) -> Option<Leaderboard> {
        let state = self.state.read().await;
        let attempts: Vec<Attempt> = state
            .attempts
            .values()
            .filter(|a| a.test_id == test_id)
            .cloned()
            .collect();
        let first = attempts.first()?;
        let test_name = state
            .tests
            .get(test_id)
            .map(|t| t.name.clone())
            .unwrap_or_else(|| first.test_name.clone());
        let scores: Vec<ScoreRecord> = attempts
            .iter()
            .filter_map(|a| state.scores.get(&a.id).cloned())
            .collect();
        Some(compute_leaderboard(test_id, &test_name, &attempts, &scores))
    }
}

#[async_trait]
impl AttemptStore for InMemoryStore {
    async fn load_attempts(&self, test_id: &str) -> anyhow::Result<Vec<Attempt>> {
        let state = self.state.read().await;
        let mut attempts: Vec<Attempt> = state
            .attempts
            .values()
            .filter(|a| a.test_id == test_id)
            .cloned()
            .collect();
        attempts.sort_by_key(|a| a.sequence);
        Ok(attempts)
    }

    async fn get_attempt(&self, id: AttemptId) -> anyhow::Result<Option<Attempt>> {
        Ok(self.state.read().await.attempts.get(&id).cloned())
    }

    async fn persist_partition(&self, outcome: &PartitionOutcome) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        for attempt in &outcome.attempts {
            state.attempts.insert(attempt.id, attempt.clone());
        }
        for id in &outcome.invalidated_scores {
            state.scores.remove(id);
        }
        for record in &outcome.scores {
            state.scores.insert(record.attempt_id, record.clone());
        }
        tracing::debug!(
            test_id = %outcome.test_id,
            attempts = outcome.attempts.len(),
            scores = outcome.scores.len(),
            invalidated = outcome.invalidated_scores.len(),
            "partition persisted"
        );
        Ok(())
    }

    async fn replace_score(&self, record: ScoreRecord) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        anyhow::ensure!(
            state.attempts.contains_key(&record.attempt_id),
            StoreError::AttemptNotFound(record.attempt_id)
        );
        state.scores.insert(record.attempt_id, record);
        Ok(())
    }
}

#[async_trait]
impl SchemeSource for InMemoryStore {
    async fn definition(&self, test_id: &str, test_name: &str) -> anyhow::Result<TestDefinition> {
        if let Some(test) = self.state.read().await.tests.get(test_id) {
            return Ok(test.clone());
        }

        let mut state = self.state.write().await;
        let test = state
            .tests
            .entry(test_id.to_string())
            .or_insert_with(|| {
                tracing::warn!(
                    "test {test_id} is not in the catalog; registering it with the default marking scheme and an empty answer key"
                );
                TestDefinition {
                    id: test_id.to_string(),
                    name: test_name.to_string(),
                    max_marks: self.default_max_marks,
                    marking: self.default_marking,
                    answer_key: Default::default(),
                }
            })
            .clone();
        Ok(test)
    }
}
