//! Per-test leaderboard over canonical scored attempts.
//!
//! A student may have several distinct (non-duplicate) attempts at a test;
//! only their best one is ranked.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::IdentityKey;
use crate::model::{Attempt, AttemptId, AttemptState};
use crate::scoring::ScoreRecord;

/// One ranked row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// 1-based position.
    pub rank: usize,
    pub is_top_3: bool,
    pub attempt_id: AttemptId,
    pub student_name: String,
    pub identity: IdentityKey,
    pub total: f64,
    pub accuracy: f64,
    pub net_correct: i64,
    pub correct: u32,
    pub wrong: u32,
    pub skipped: u32,
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Leaderboard of a single test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leaderboard {
    pub test_id: String,
    pub test_name: String,
    pub entries: Vec<LeaderboardEntry>,
}

/// Higher total, then higher accuracy, then higher net correct.
fn better(a: &ScoreRecord, b: &ScoreRecord) -> Ordering {
    let (a, b) = (&a.breakdown, &b.breakdown);
    a.total
        .total_cmp(&b.total)
        .then(a.accuracy.total_cmp(&b.accuracy))
        .then(a.net_correct.cmp(&b.net_correct))
}

/// Build the leaderboard of `test_id` from stored attempts and scores.
///
/// Only SCORED attempts that have a score record take part. Flagged and
/// duplicate attempts are left out.
pub fn compute_leaderboard(
    test_id: &str,
    test_name: &str,
    attempts: &[Attempt],
    scores: &[ScoreRecord],
) -> Leaderboard {
    let by_attempt: HashMap<AttemptId, &ScoreRecord> =
        scores.iter().map(|s| (s.attempt_id, s)).collect();

    let mut best: HashMap<&IdentityKey, (&Attempt, &ScoreRecord)> = HashMap::new();
    for attempt in attempts
        .iter()
        .filter(|a| a.test_id == test_id && a.state == AttemptState::Scored)
    {
        let Some(score) = by_attempt.get(&attempt.id).copied() else {
            continue;
        };
        best.entry(&attempt.identity)
            .and_modify(|current| {
                if better(score, current.1) == Ordering::Greater {
                    *current = (attempt, score);
                }
            })
            .or_insert((attempt, score));
    }

    let mut rows: Vec<(&Attempt, &ScoreRecord)> = best.into_values().collect();
    rows.sort_by(|(a, sa), (b, sb)| better(sb, sa).then_with(|| a.identity.cmp(&b.identity)));

    let entries = rows
        .into_iter()
        .enumerate()
        .map(|(i, (attempt, score))| LeaderboardEntry {
            rank: i + 1,
            is_top_3: i < 3,
            attempt_id: attempt.id,
            student_name: attempt.student_name.clone(),
            identity: attempt.identity.clone(),
            total: score.breakdown.total,
            accuracy: score.breakdown.accuracy,
            net_correct: score.breakdown.net_correct,
            correct: score.breakdown.correct,
            wrong: score.breakdown.wrong,
            skipped: score.breakdown.skipped,
            submitted_at: attempt.submitted_at,
        })
        .collect();

    Leaderboard {
        test_id: test_id.to_string(),
        test_name: test_name.to_string(),
        entries,
    }
}
