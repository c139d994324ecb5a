//! Per-test ingestion state machine.
//!
//! A [`TestPartition`] owns every attempt of one test for the duration of a
//! batch: the pre-existing attempts loaded from storage plus the ones admitted
//! from the batch. Events are admitted strictly in arrival order. Each
//! admission classifies the new attempt, merges it into its cluster,
//! re-selects the cluster's canonical member and scores that member if it is
//! new or was just promoted.
//!
//! Partitions never share state, so different tests can be processed in
//! parallel; one partition must only ever be driven by one thread of control.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::cluster::{classify, DedupConfig, DisjointSet, MatchEvidence};
use crate::error::{EventError, SchemeError};
use crate::event::AttemptEvent;
use crate::identity::IdentityKey;
use crate::model::{Attempt, AttemptId, AttemptState, TestDefinition};
use crate::scoring::{score_attempt, ScoreRecord};
use crate::selector::select_canonical;

/// What happened to one admitted event.
#[derive(Debug, Clone)]
pub enum Admission {
    /// A new attempt was created.
    Accepted {
        attempt_id: AttemptId,
        evidence: Vec<MatchEvidence>,
    },
    /// The source event id was already ingested for this test.
    Replayed { attempt_id: AttemptId },
}

/// Everything a partition changed, ready to be persisted as one unit.
#[derive(Debug, Clone, Default)]
pub struct PartitionOutcome {
    pub test_id: String,
    /// New attempts and pre-existing attempts whose link or state changed.
    pub attempts: Vec<Attempt>,
    /// Fresh score records for attempts that are canonical and scored.
    pub scores: Vec<ScoreRecord>,
    /// Attempts whose stored score no longer applies (demoted to duplicate).
    pub invalidated_scores: Vec<AttemptId>,
}

impl PartitionOutcome {
    pub fn attempt(&self, id: AttemptId) -> Option<&Attempt> {
        self.attempts.iter().find(|a| a.id == id)
    }

    pub fn score(&self, id: AttemptId) -> Option<&ScoreRecord> {
        self.scores.iter().find(|s| s.attempt_id == id)
    }
}

/// Mutable clustering state for one test.
#[derive(Debug)]
pub struct TestPartition {
    test: TestDefinition,
    config: DedupConfig,
    attempts: Vec<Attempt>,
    index: HashMap<AttemptId, usize>,
    by_identity: HashMap<IdentityKey, Vec<usize>>,
    event_ids: HashMap<String, AttemptId>,
    sets: DisjointSet,
    next_sequence: u64,
    touched: BTreeSet<usize>,
    scores: BTreeMap<AttemptId, ScoreRecord>,
    invalidated: BTreeSet<AttemptId>,
}

impl TestPartition {
    /// Seed a partition with the attempts storage already holds for `test`.
    ///
    /// Existing duplicate links are folded into the disjoint set so that a
    /// new attempt matching any member joins the whole stored cluster.
    pub fn new(
        test: TestDefinition,
        existing: Vec<Attempt>,
        config: DedupConfig,
    ) -> Result<Self, SchemeError> {
        test.marking.validate(&test.id)?;

        let mut partition = Self {
            test,
            config,
            attempts: Vec::with_capacity(existing.len()),
            index: HashMap::new(),
            by_identity: HashMap::new(),
            event_ids: HashMap::new(),
            sets: DisjointSet::new(),
            next_sequence: 1,
            touched: BTreeSet::new(),
            scores: BTreeMap::new(),
            invalidated: BTreeSet::new(),
        };

        for attempt in existing {
            partition.next_sequence = partition.next_sequence.max(attempt.sequence + 1);
            partition.insert(attempt);
        }

        let links: Vec<(usize, AttemptId)> = partition
            .attempts
            .iter()
            .enumerate()
            .filter_map(|(i, a)| a.duplicate_of.map(|c| (i, c)))
            .collect();
        for (idx, canonical) in links {
            match partition.index.get(&canonical) {
                Some(&c) => {
                    partition.sets.union(idx, c);
                }
                None => tracing::warn!(
                    test_id = %partition.test.id,
                    attempt_id = %partition.attempts[idx].id,
                    canonical_id = %canonical,
                    "stored duplicate link points outside the test, ignoring"
                ),
            }
        }

        Ok(partition)
    }

    pub fn test(&self) -> &TestDefinition {
        &self.test
    }

    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    pub fn get(&self, id: AttemptId) -> Option<&Attempt> {
        self.index.get(&id).map(|&i| &self.attempts[i])
    }

    /// Admit one event of this test.
    pub fn admit(&mut self, event: AttemptEvent, now: DateTime<Utc>) -> Result<Admission, EventError> {
        debug_assert_eq!(event.test_id, self.test.id);

        let identity = event.identity().ok_or(EventError::UnusableIdentity)?;

        if let Some(&existing) = self.event_ids.get(&event.event_id) {
            tracing::info!(
                event_id = %event.event_id,
                attempt_id = %existing,
                "event already ingested, skipping replay"
            );
            return Ok(Admission::Replayed {
                attempt_id: existing,
            });
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let attempt = Attempt {
            id: AttemptId::new_v4(),
            source_event_id: event.event_id,
            student_name: event.student_name,
            identity,
            test_id: event.test_id,
            test_name: event.test_name,
            started_at: event.started_at,
            submitted_at: event.submitted_at,
            answers: event.answers,
            state: AttemptState::Ingested,
            duplicate_of: None,
            sequence,
            raw_payload: event.raw_payload,
        };

        let candidates = self
            .by_identity
            .get(&attempt.identity)
            .map(|ids| ids.iter().map(|&i| &self.attempts[i]).collect::<Vec<_>>())
            .unwrap_or_default();
        let classification = classify(&attempt, candidates, &self.config);

        let attempt_id = attempt.id;
        let idx = self.insert(attempt);
        self.touched.insert(idx);
        for matched in &classification.matches {
            if let Some(&m) = self.index.get(matched) {
                self.sets.union(idx, m);
            }
        }

        if let Some(dup_of) = classification.duplicate_of {
            tracing::info!(
                attempt_id = %attempt_id,
                matched_id = %dup_of,
                matches = classification.matches.len(),
                test_id = %self.test.id,
                "duplicate detected"
            );
        }

        self.reselect(idx, now);

        Ok(Admission::Accepted {
            attempt_id,
            evidence: classification.evidence,
        })
    }

    /// Re-run canonical selection for the cluster containing `idx`.
    fn reselect(&mut self, idx: usize, now: DateTime<Utc>) {
        let members = self.cluster_of(idx);
        let Some(selection) = select_canonical(members.iter().map(|&i| &self.attempts[i])) else {
            return;
        };

        let mut promoted_flagged = false;
        for &i in &members {
            let attempt = &mut self.attempts[i];
            let (was_canonical, state_before) = (attempt.duplicate_of.is_none(), attempt.state);
            if !selection.apply(attempt) {
                continue;
            }
            self.touched.insert(i);
            let is_canonical = attempt.duplicate_of.is_none();

            // Only an ingested newcomer is canonical without a score record.
            if was_canonical && !is_canonical && state_before != AttemptState::Ingested {
                tracing::info!(
                    attempt_id = %attempt.id,
                    canonical_id = %selection.canonical,
                    state = %attempt.state,
                    "canonical demoted to duplicate"
                );
                self.scores.remove(&attempt.id);
                self.invalidated.insert(attempt.id);
            }
            if !was_canonical && is_canonical && attempt.state == AttemptState::Flagged {
                promoted_flagged = true;
            }
        }

        let ci = self.index[&selection.canonical];
        let state = self.attempts[ci].state;
        if state == AttemptState::Ingested || promoted_flagged {
            let record = score_attempt(&self.attempts[ci], &self.test, now);
            let canonical = &mut self.attempts[ci];
            if state == AttemptState::Ingested {
                canonical.state = AttemptState::Scored;
            }
            self.invalidated.remove(&canonical.id);
            self.scores.insert(canonical.id, record);
            self.touched.insert(ci);
        }
    }

    /// Indices of the cluster containing `idx`, ascending.
    ///
    /// Cluster members always share an identity key, so only that key's
    /// attempts need to be scanned.
    fn cluster_of(&mut self, idx: usize) -> Vec<usize> {
        let root = self.sets.find(idx);
        let peers = self
            .by_identity
            .get(&self.attempts[idx].identity)
            .cloned()
            .unwrap_or_default();
        let mut members: Vec<usize> = peers
            .into_iter()
            .filter(|&i| self.sets.find(i) == root)
            .collect();
        if !members.contains(&idx) {
            members.push(idx);
        }
        members.sort_unstable();
        members
    }

    fn insert(&mut self, attempt: Attempt) -> usize {
        let idx = self.sets.push();
        debug_assert_eq!(idx, self.attempts.len());
        self.index.insert(attempt.id, idx);
        self.by_identity
            .entry(attempt.identity.clone())
            .or_default()
            .push(idx);
        self.event_ids
            .entry(attempt.source_event_id.clone())
            .or_insert(attempt.id);
        self.attempts.push(attempt);
        idx
    }

    /// Consume the partition, returning only what changed.
    pub fn finish(self) -> PartitionOutcome {
        let touched = self.touched;
        let changed = self
            .attempts
            .into_iter()
            .enumerate()
            .filter(|(i, _)| touched.contains(i))
            .map(|(_, a)| a)
            .collect();

        PartitionOutcome {
            test_id: self.test.id,
            attempts: changed,
            scores: self.scores.into_values().collect(),
            invalidated_scores: self.invalidated.into_iter().collect(),
        }
    }
}

/// An event that failed before reaching a partition, or a parsed event
/// waiting for one.
#[derive(Debug)]
pub enum Slot {
    Rejected {
        event_id: Option<String>,
        error: EventError,
    },
    Pending {
        event_id: String,
        test_id: String,
    },
}

/// A batch split into per-test work lists.
#[derive(Debug, Default)]
pub struct SplitBatch {
    /// One slot per input record, in input order.
    pub slots: Vec<Slot>,
    /// Test id → `(input index, event)` in input order.
    pub partitions: BTreeMap<String, Vec<(usize, AttemptEvent)>>,
}

/// Parse every record and group the survivors by test id.
pub fn split_batch(records: Vec<Value>) -> SplitBatch {
    let mut batch = SplitBatch::default();

    for (index, record) in records.into_iter().enumerate() {
        let event_id = record
            .get("event_id")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        match AttemptEvent::parse(record) {
            Ok(event) => {
                batch.slots.push(Slot::Pending {
                    event_id: event.event_id.clone(),
                    test_id: event.test_id.clone(),
                });
                batch
                    .partitions
                    .entry(event.test_id.clone())
                    .or_default()
                    .push((index, event));
            }
            Err(error) => {
                tracing::warn!(index, event_id = ?event_id, error = %error, "rejecting event");
                batch.slots.push(Slot::Rejected { event_id, error });
            }
        }
    }

    batch
}

/// Drive a partition over its events, in order.
pub fn run_partition(
    mut partition: TestPartition,
    events: Vec<(usize, AttemptEvent)>,
    now: DateTime<Utc>,
) -> (PartitionOutcome, Vec<(usize, Result<Admission, EventError>)>) {
    let mut admissions = Vec::with_capacity(events.len());
    for (index, event) in events {
        let event_id = event.event_id.clone();
        let result = partition.admit(event, now);
        if let Err(error) = &result {
            tracing::warn!(index, event_id = %event_id, error = %error, "rejecting event");
        }
        admissions.push((index, result));
    }
    (partition.finish(), admissions)
}
