//! Negative-marking score computation.
//!
//! For every question in the answer key:
//! 1. matching answer → correct
//! 2. `SKIP` or no answer → skipped
//! 3. anything else → wrong
//!
//! `accuracy = 100 * correct / (correct + wrong)` (0 when nothing was
//! attempted), `net_correct = correct - wrong`, and the total applies the
//! test's marking scheme to the three counts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RecomputeError;
use crate::model::{AnswerSheet, Attempt, AttemptId, AttemptState, MarkingScheme, TestDefinition};

/// Per-bucket question counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScoreCounts {
    pub correct: u32,
    pub wrong: u32,
    pub skipped: u32,
}

/// Weighted sub-totals, so a score can be audited without recomputing it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedPoints {
    pub correct_points: f64,
    pub wrong_points: f64,
    pub skip_points: f64,
    pub total: f64,
}

/// Replays the inputs of the score formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreExplanation {
    pub marking_scheme: MarkingScheme,
    pub counts: ScoreCounts,
    pub breakdown: WeightedPoints,
}

/// Derived score of one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub correct: u32,
    pub wrong: u32,
    pub skipped: u32,
    /// Percentage of attempted questions answered correctly.
    pub accuracy: f64,
    pub net_correct: i64,
    pub total: f64,
    pub explanation: ScoreExplanation,
}

/// A breakdown bound to its attempt and computation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub attempt_id: AttemptId,
    pub breakdown: ScoreBreakdown,
    pub computed_at: DateTime<Utc>,
}

/// Score `answers` against `expected` with `scheme`. Pure.
pub fn score(answers: &AnswerSheet, expected: &AnswerSheet, scheme: &MarkingScheme) -> ScoreBreakdown {
    let mut counts = ScoreCounts::default();

    for (question, key) in expected {
        match answers.get(question) {
            None => counts.skipped += 1,
            Some(answer) if answer.is_skip() => counts.skipped += 1,
            Some(answer) if answer == key => counts.correct += 1,
            Some(_) => counts.wrong += 1,
        }
    }

    let attempted = counts.correct + counts.wrong;
    let accuracy = if attempted > 0 {
        counts.correct as f64 / attempted as f64 * 100.0
    } else {
        0.0
    };
    let net_correct = i64::from(counts.correct) - i64::from(counts.wrong);

    let correct_points = f64::from(counts.correct) * scheme.correct;
    let wrong_points = f64::from(counts.wrong) * scheme.wrong;
    let skip_points = f64::from(counts.skipped) * scheme.skip;
    let total = correct_points + wrong_points + skip_points;

    ScoreBreakdown {
        correct: counts.correct,
        wrong: counts.wrong,
        skipped: counts.skipped,
        accuracy,
        net_correct,
        total,
        explanation: ScoreExplanation {
            marking_scheme: *scheme,
            counts,
            breakdown: WeightedPoints {
                correct_points,
                wrong_points,
                skip_points,
                total,
            },
        },
    }
}

/// Score an attempt against its test definition, stamped with `now`.
pub fn score_attempt(attempt: &Attempt, test: &TestDefinition, now: DateTime<Utc>) -> ScoreRecord {
    let breakdown = score(&attempt.answers, &test.answer_key, &test.marking);
    tracing::info!(
        attempt_id = %attempt.id,
        test_id = %attempt.test_id,
        total = breakdown.total,
        correct = breakdown.correct,
        wrong = breakdown.wrong,
        skipped = breakdown.skipped,
        accuracy = breakdown.accuracy,
        "score computed"
    );
    ScoreRecord {
        attempt_id: attempt.id,
        breakdown,
        computed_at: now,
    }
}

/// Recompute the score of a stored attempt from its current inputs.
///
/// The returned record fully replaces any earlier one. Only canonical
/// attempts are scored: a DEDUPED attempt, or a FLAGGED one still linked to
/// a canonical, is rejected.
pub fn recompute(
    attempt: &Attempt,
    test: &TestDefinition,
    now: DateTime<Utc>,
) -> Result<ScoreRecord, RecomputeError> {
    if attempt.state == AttemptState::Deduped || !attempt.is_canonical() {
        return Err(RecomputeError::NotEligible {
            attempt_id: attempt.id,
            state: attempt.state,
        });
    }
    test.marking.validate(&test.id)?;
    Ok(score_attempt(attempt, test, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityKey;
    use crate::model::Answer;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn sheet(pairs: &[(u32, &str)]) -> AnswerSheet {
        pairs.iter().map(|&(q, a)| (q, Answer::from(a))).collect()
    }

    fn definition(key: AnswerSheet) -> TestDefinition {
        TestDefinition {
            id: "t1".into(),
            name: "Test".into(),
            max_marks: 16,
            marking: MarkingScheme::default(),
            answer_key: key,
        }
    }

    fn attempt(answers: AnswerSheet, state: AttemptState) -> Attempt {
        Attempt {
            id: Uuid::new_v4(),
            source_event_id: "e".into(),
            student_name: "S".into(),
            identity: IdentityKey::Email("s@x.com".into()),
            test_id: "t1".into(),
            test_name: "Test".into(),
            started_at: Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap(),
            submitted_at: None,
            answers,
            state,
            duplicate_of: None,
            sequence: 1,
            raw_payload: serde_json::Value::Null,
        }
    }

    #[test]
    fn reference_example() {
        let answers = sheet(&[(1, "A"), (2, "B"), (3, "SKIP"), (4, "C")]);
        let expected = sheet(&[(1, "A"), (2, "C"), (3, "A"), (4, "C")]);
        let scheme = MarkingScheme {
            correct: 4.0,
            wrong: -1.0,
            skip: 0.0,
        };
        let s = score(&answers, &expected, &scheme);
        assert_eq!((s.correct, s.wrong, s.skipped), (2, 1, 1));
        assert!((s.accuracy - 66.7).abs() < 0.05, "accuracy {}", s.accuracy);
        assert_eq!(s.net_correct, 1);
        assert_eq!(s.total, 7.0);
        assert_eq!(s.explanation.breakdown.correct_points, 8.0);
        assert_eq!(s.explanation.breakdown.wrong_points, -1.0);
        assert_eq!(s.explanation.breakdown.skip_points, 0.0);
        assert_eq!(s.explanation.breakdown.total, 7.0);
        assert_eq!(s.explanation.marking_scheme, scheme);
    }

    #[test]
    fn absent_answers_are_skipped_and_extras_ignored() {
        let answers = sheet(&[(1, "A"), (9, "B")]);
        let expected = sheet(&[(1, "A"), (2, "B")]);
        let s = score(&answers, &expected, &MarkingScheme::default());
        assert_eq!((s.correct, s.wrong, s.skipped), (1, 0, 1));
    }

    #[test]
    fn unknown_literal_counts_as_wrong() {
        let answers = sheet(&[(1, "E")]);
        let expected = sheet(&[(1, "A")]);
        let s = score(&answers, &expected, &MarkingScheme::default());
        assert_eq!(s.wrong, 1);
        assert_eq!(s.total, -1.0);
    }

    #[test]
    fn nothing_attempted_gives_zero_accuracy() {
        let answers = sheet(&[(1, "SKIP")]);
        let expected = sheet(&[(1, "A"), (2, "B")]);
        let s = score(&answers, &expected, &MarkingScheme::default());
        assert_eq!(s.accuracy, 0.0);
        assert_eq!(s.skipped, 2);
    }

    #[test]
    fn fractional_negative_marking() {
        let answers = sheet(&[(1, "A"), (2, "B"), (3, "C")]);
        let expected = sheet(&[(1, "A"), (2, "A"), (3, "A")]);
        let scheme = MarkingScheme {
            correct: 1.0,
            wrong: -0.25,
            skip: 0.0,
        };
        assert_eq!(score(&answers, &expected, &scheme).total, 0.5);
    }

    #[test]
    fn recompute_is_byte_identical() {
        let a = attempt(sheet(&[(1, "A"), (2, "D")]), AttemptState::Scored);
        let def = definition(sheet(&[(1, "A"), (2, "B")]));
        let now = Utc::now();
        let first = recompute(&a, &def, now).unwrap();
        let second = recompute(&a, &def, now).unwrap();
        assert_eq!(
            serde_json::to_vec(&first.breakdown).unwrap(),
            serde_json::to_vec(&second.breakdown).unwrap()
        );
    }

    #[test]
    fn recompute_reflects_new_key() {
        let a = attempt(sheet(&[(1, "A")]), AttemptState::Scored);
        let mut def = definition(sheet(&[(1, "A")]));
        let before = recompute(&a, &def, Utc::now()).unwrap();
        def.answer_key = sheet(&[(1, "B")]);
        let after = recompute(&a, &def, Utc::now()).unwrap();
        assert_eq!(before.breakdown.total, 4.0);
        assert_eq!(after.breakdown.total, -1.0);
    }

    #[test]
    fn recompute_rejects_duplicates() {
        let a = attempt(sheet(&[(1, "A")]), AttemptState::Deduped);
        let err = recompute(&a, &definition(AnswerSheet::new()), Utc::now()).unwrap_err();
        assert!(matches!(err, RecomputeError::NotEligible { .. }));
    }

    #[test]
    fn recompute_rejects_flagged_duplicate() {
        let mut a = attempt(sheet(&[(1, "A")]), AttemptState::Flagged);
        a.duplicate_of = Some(Uuid::new_v4());
        let err = recompute(&a, &definition(sheet(&[(1, "A")])), Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            RecomputeError::NotEligible {
                state: AttemptState::Flagged,
                ..
            }
        ));
    }

    #[test]
    fn recompute_allows_flagged() {
        let a = attempt(sheet(&[(1, "A")]), AttemptState::Flagged);
        assert!(recompute(&a, &definition(sheet(&[(1, "A")])), Utc::now()).is_ok());
    }
}
