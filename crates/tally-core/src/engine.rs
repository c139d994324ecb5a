//! Central ingestion orchestrator.
//!
//! Splits a batch by test id, loads each test's candidate pool and marking
//! scheme, runs every partition on its own blocking task (bounded by the
//! configured parallelism) and persists the results once every partition has
//! been computed. Records of one test are always processed by a single task,
//! in arrival order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::cluster::DedupConfig;
use crate::error::RecomputeError;
use crate::model::{AttemptId, AttemptState};
use crate::pipeline::{run_partition, split_batch, Admission, Slot, SplitBatch, TestPartition};
use crate::report::{EventOutcome, EventStatus, IngestReport, IngestSummary};
use crate::scoring::{self, ScoreRecord};
use crate::traits::{AttemptStore, SchemeSource};

/// Configuration for the ingestion engine.
#[derive(Debug, Clone)]
pub struct IngestEngineConfig {
    /// Maximum partitions computed concurrently.
    pub parallelism: usize,
    /// Duplicate detection thresholds.
    pub dedup: DedupConfig,
}

impl Default for IngestEngineConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            dedup: DedupConfig::default(),
        }
    }
}

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_partition_start(&self, test_id: &str, events: usize);
    fn on_event_complete(&self, outcome: &EventOutcome);
    fn on_partition_error(&self, test_id: &str, error: &str);
    fn on_batch_complete(&self, summary: &IngestSummary, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_partition_start(&self, _: &str, _: usize) {}
    fn on_event_complete(&self, _: &EventOutcome) {}
    fn on_partition_error(&self, _: &str, _: &str) {}
    fn on_batch_complete(&self, _: &IngestSummary, _: Duration) {}
}

/// The ingestion engine.
pub struct IngestEngine {
    store: Arc<dyn AttemptStore>,
    schemes: Arc<dyn SchemeSource>,
    config: IngestEngineConfig,
}

impl IngestEngine {
    pub fn new(
        store: Arc<dyn AttemptStore>,
        schemes: Arc<dyn SchemeSource>,
        config: IngestEngineConfig,
    ) -> Self {
        Self {
            store,
            schemes,
            config,
        }
    }

    pub fn config(&self) -> &IngestEngineConfig {
        &self.config
    }

    /// Ingest a batch of raw event records.
    ///
    /// Bad records are reported per event. The call itself only fails when a
    /// whole partition cannot be computed (marking scheme or candidate pool
    /// unavailable, corrupt scheme) or persisted; in the first case nothing
    /// is persisted at all.
    pub async fn ingest(
        &self,
        records: Vec<Value>,
        progress: &dyn ProgressReporter,
    ) -> Result<IngestReport> {
        let start = Instant::now();
        let now = Utc::now();
        let total = records.len();
        tracing::info!("starting batch ingestion of {total} events");

        let SplitBatch { slots, partitions } = split_batch(records);
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
        let mut futures = FuturesUnordered::new();

        for (test_id, events) in partitions {
            progress.on_partition_start(&test_id, events.len());

            let store = Arc::clone(&self.store);
            let schemes = Arc::clone(&self.schemes);
            let semaphore = Arc::clone(&semaphore);
            let dedup = self.config.dedup;

            futures.push(async move {
                let ctx_test_id = test_id.clone();
                let inner = async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| anyhow::anyhow!("semaphore closed"))?;

                    let test_name = events
                        .first()
                        .map(|(_, e)| e.test_name.clone())
                        .unwrap_or_else(|| test_id.clone());
                    let definition = schemes
                        .definition(&test_id, &test_name)
                        .await
                        .with_context(|| format!("failed to load marking scheme for test {test_id}"))?;
                    let existing = store
                        .load_attempts(&test_id)
                        .await
                        .with_context(|| format!("failed to load attempts for test {test_id}"))?;
                    tracing::debug!(
                        test_id = %test_id,
                        existing = existing.len(),
                        incoming = events.len(),
                        "partition loaded"
                    );

                    let partition = TestPartition::new(definition, existing, dedup)?;
                    let computed =
                        tokio::task::spawn_blocking(move || run_partition(partition, events, now))
                            .await
                            .context("partition task panicked")?;
                    Ok::<_, anyhow::Error>(computed)
                };
                (ctx_test_id, inner.await)
            });
        }

        let mut computed = Vec::new();
        let mut failure = None;
        while let Some((test_id, result)) = futures.next().await {
            match result {
                Ok(partition) => computed.push(partition),
                Err(e) => {
                    tracing::error!("partition {test_id} failed: {e:#}");
                    progress.on_partition_error(&test_id, &format!("{e:#}"));
                    failure.get_or_insert(e);
                }
            }
        }
        if let Some(e) = failure {
            return Err(e.context("batch aborted, nothing was persisted"));
        }

        for (outcome, _) in &computed {
            self.store
                .persist_partition(outcome)
                .await
                .with_context(|| format!("failed to persist test {}", outcome.test_id))?;
        }

        let mut outcomes: Vec<Option<EventOutcome>> = vec![None; total];
        let mut summary = IngestSummary {
            total_received: total,
            ..IngestSummary::default()
        };

        for (index, slot) in slots.iter().enumerate() {
            if let Slot::Rejected { event_id, error } = slot {
                outcomes[index] = Some(EventOutcome::error(index, event_id.clone(), error.to_string()));
            }
        }

        for (partition, admissions) in computed {
            summary.scored += partition.scores.len();
            for (index, admission) in admissions {
                let event_id = match &slots[index] {
                    Slot::Pending { event_id, .. } => Some(event_id.clone()),
                    Slot::Rejected { event_id, .. } => event_id.clone(),
                };
                let outcome = match admission {
                    Err(error) => EventOutcome::error(index, event_id, error.to_string()),
                    Ok(Admission::Replayed { attempt_id }) => EventOutcome {
                        index,
                        event_id,
                        status: EventStatus::Replayed,
                        attempt_id: Some(attempt_id),
                        canonical_attempt_id: None,
                        score: None,
                        reason: Some("event id already ingested".into()),
                        evidence: Vec::new(),
                    },
                    Ok(Admission::Accepted {
                        attempt_id,
                        evidence,
                    }) => {
                        let attempt = partition.attempt(attempt_id);
                        let deduped =
                            attempt.is_some_and(|a| a.state == AttemptState::Deduped);
                        EventOutcome {
                            index,
                            event_id,
                            status: if deduped {
                                EventStatus::Deduped
                            } else {
                                EventStatus::Scored
                            },
                            attempt_id: Some(attempt_id),
                            canonical_attempt_id: attempt.and_then(|a| a.duplicate_of),
                            score: partition.score(attempt_id).map(|s| s.breakdown.total),
                            reason: None,
                            evidence,
                        }
                    }
                };
                outcomes[index] = Some(outcome);
            }
        }

        let outcomes: Vec<EventOutcome> = outcomes.into_iter().flatten().collect();
        for outcome in &outcomes {
            match outcome.status {
                EventStatus::Scored => summary.ingested += 1,
                EventStatus::Deduped => {
                    summary.ingested += 1;
                    summary.duplicates_detected += 1;
                }
                EventStatus::Replayed => summary.replayed += 1,
                EventStatus::Error => summary.errors += 1,
            }
            progress.on_event_complete(outcome);
        }

        let elapsed = start.elapsed();
        progress.on_batch_complete(&summary, elapsed);
        tracing::info!(
            ingested = summary.ingested,
            duplicates = summary.duplicates_detected,
            scored = summary.scored,
            errors = summary.errors,
            replayed = summary.replayed,
            duration_ms = elapsed.as_millis() as u64,
            "ingestion complete"
        );

        Ok(IngestReport {
            id: Uuid::new_v4(),
            created_at: now,
            summary,
            outcomes,
            duration_ms: elapsed.as_millis() as u64,
        })
    }

    /// Recompute and replace the score of one stored attempt.
    ///
    /// Fails with [`RecomputeError::NotFound`] or
    /// [`RecomputeError::NotEligible`] (downcastable from the returned error).
    pub async fn recompute(&self, attempt_id: AttemptId) -> Result<ScoreRecord> {
        let attempt = self
            .store
            .get_attempt(attempt_id)
            .await?
            .ok_or(RecomputeError::NotFound(attempt_id))?;
        let definition = self
            .schemes
            .definition(&attempt.test_id, &attempt.test_name)
            .await
            .with_context(|| format!("failed to load marking scheme for test {}", attempt.test_id))?;

        let record = scoring::recompute(&attempt, &definition, Utc::now())?;
        self.store.replace_score(record.clone()).await?;

        tracing::info!(
            attempt_id = %attempt_id,
            total = record.breakdown.total,
            "score recomputed"
        );
        Ok(record)
    }
}
