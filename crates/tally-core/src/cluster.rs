//! Duplicate classification and transitive grouping.
//!
//! A new attempt is compared against every prior attempt of the same test.
//! A pair is a duplicate when the identity keys agree, the start times are
//! within the configured window and the answer similarity reaches the
//! threshold. Matches are grouped transitively with a disjoint set, so an
//! attempt that matches any member of a cluster joins the whole cluster.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::model::{Attempt, AttemptId};
use crate::similarity::{overlap, AnswerOverlap};

/// Thresholds for duplicate detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DedupConfig {
    /// Maximum distance between start times (inclusive).
    pub time_window: Duration,
    /// Minimum answer similarity (inclusive).
    pub similarity_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            time_window: Duration::minutes(7),
            similarity_threshold: 0.92,
        }
    }
}

/// Evidence for one candidate comparison, kept for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchEvidence {
    pub candidate_id: AttemptId,
    /// Absolute start-time distance in whole seconds.
    pub time_delta_secs: i64,
    pub within_window: bool,
    /// `None` when the window check already failed.
    pub overlap: Option<AnswerOverlap>,
    pub similarity: Option<f64>,
    pub is_match: bool,
}

/// Result of classifying one attempt against a candidate pool.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// Earliest-started matching candidate, if any.
    pub duplicate_of: Option<AttemptId>,
    /// Every candidate that matched, in pool order.
    pub matches: Vec<AttemptId>,
    /// One record per candidate sharing the identity key.
    pub evidence: Vec<MatchEvidence>,
}

impl Classification {
    pub fn is_duplicate(&self) -> bool {
        !self.matches.is_empty()
    }
}

/// Compare a pair that already shares an identity key.
pub fn compare(new: &Attempt, candidate: &Attempt, config: &DedupConfig) -> MatchEvidence {
    let delta = (new.started_at - candidate.started_at).abs();
    let within_window = delta <= config.time_window;

    let (overlap, similarity) = if within_window {
        let o = overlap(&new.answers, &candidate.answers);
        (Some(o), o.ratio())
    } else {
        (None, None)
    };

    // Undefined similarity never reaches the threshold.
    let is_match = within_window
        && similarity.is_some_and(|ratio| ratio >= config.similarity_threshold);

    MatchEvidence {
        candidate_id: candidate.id,
        time_delta_secs: delta.num_seconds(),
        within_window,
        overlap,
        similarity,
        is_match,
    }
}

/// Classify `new` against `pool`.
///
/// The caller restricts `pool` to attempts of the same test; a cross-test
/// pair is never compared here.
pub fn classify<'a, I>(new: &Attempt, pool: I, config: &DedupConfig) -> Classification
where
    I: IntoIterator<Item = &'a Attempt>,
{
    let mut result = Classification::default();
    let mut earliest: Option<&Attempt> = None;

    for candidate in pool {
        if candidate.id == new.id || candidate.identity != new.identity {
            continue;
        }

        let evidence = compare(new, candidate, config);
        tracing::debug!(
            attempt_id = %new.id,
            candidate_id = %candidate.id,
            time_delta_secs = evidence.time_delta_secs,
            similarity = ?evidence.similarity,
            threshold = config.similarity_threshold,
            is_match = evidence.is_match,
            "dedup comparison"
        );

        if evidence.is_match {
            result.matches.push(candidate.id);
            let earlier = earliest.map_or(true, |e| {
                (candidate.started_at, candidate.sequence) < (e.started_at, e.sequence)
            });
            if earlier {
                earliest = Some(candidate);
            }
        }
        result.evidence.push(evidence);
    }

    result.duplicate_of = earliest.map(|a| a.id);
    result
}

/// Union-find over dense indices.
#[derive(Debug, Clone, Default)]
pub struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a singleton and return its index.
    pub fn push(&mut self) -> usize {
        let idx = self.parent.len();
        self.parent.push(idx);
        self.rank.push(0);
        idx
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Root of `idx`, compressing the path on the way.
    pub fn find(&mut self, idx: usize) -> usize {
        let mut root = idx;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = idx;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    /// Merge the sets of `a` and `b`; returns the new root.
    pub fn union(&mut self, a: usize, b: usize) -> usize {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return ra;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => {
                self.parent[ra] = rb;
                rb
            }
            std::cmp::Ordering::Greater => {
                self.parent[rb] = ra;
                ra
            }
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
                ra
            }
        }
    }

    /// All indices in the same set as `idx`, ascending.
    pub fn members(&mut self, idx: usize) -> Vec<usize> {
        let root = self.find(idx);
        (0..self.parent.len())
            .filter(|&i| self.find(i) == root)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityKey;
    use crate::model::{Answer, AnswerSheet, AttemptState};
    use chrono::{DateTime, TimeZone, Utc};
    use uuid::Uuid;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    /// 50 questions where the first `differing` answers disagree with
    /// [`reference_answers`].
    fn answers_with(differing: u32) -> AnswerSheet {
        (1..=50)
            .map(|q| {
                let a = if q <= differing { Answer::D } else { Answer::A };
                (q, a)
            })
            .collect()
    }

    fn attempt(email: &str, offset_secs: i64, answers: AnswerSheet, seq: u64) -> Attempt {
        Attempt {
            id: Uuid::new_v4(),
            source_event_id: format!("evt-{seq}"),
            student_name: "Student".into(),
            identity: IdentityKey::Email(email.into()),
            test_id: "t1".into(),
            test_name: "Test 1".into(),
            started_at: base_time() + Duration::seconds(offset_secs),
            submitted_at: None,
            answers,
            state: AttemptState::Ingested,
            duplicate_of: None,
            sequence: seq,
            raw_payload: serde_json::Value::Null,
        }
    }

    #[test]
    fn five_minutes_apart_94_percent_is_duplicate() {
        // 47 of 50 = 94%
        let first = attempt("s@x.com", 0, answers_with(0), 1);
        let second = attempt("s@x.com", 300, answers_with(3), 2);
        let c = classify(&second, [&first], &DedupConfig::default());
        assert!(c.is_duplicate());
        assert_eq!(c.duplicate_of, Some(first.id));
        assert_eq!(c.evidence.len(), 1);
        assert_eq!(c.evidence[0].similarity, Some(0.94));
    }

    #[test]
    fn window_boundary_is_inclusive() {
        let config = DedupConfig::default();
        let first = attempt("s@x.com", 0, answers_with(0), 1);

        let at_seven = attempt("s@x.com", 420, answers_with(0), 2);
        assert!(classify(&at_seven, [&first], &config).is_duplicate());

        let at_seven_one = attempt("s@x.com", 421, answers_with(0), 3);
        assert!(!classify(&at_seven_one, [&first], &config).is_duplicate());

        let at_eight = attempt("s@x.com", 480, answers_with(0), 4);
        let c = classify(&at_eight, [&first], &config);
        assert!(!c.is_duplicate());
        assert!(!c.evidence[0].within_window);
        assert_eq!(c.evidence[0].similarity, None);
    }

    #[test]
    fn window_applies_in_both_directions() {
        let later = attempt("s@x.com", 400, answers_with(0), 1);
        let earlier = attempt("s@x.com", 0, answers_with(0), 2);
        assert!(classify(&earlier, [&later], &DedupConfig::default()).is_duplicate());
    }

    #[test]
    fn below_threshold_is_not_duplicate() {
        // 45 of 50 = 90%
        let first = attempt("s@x.com", 0, answers_with(0), 1);
        let second = attempt("s@x.com", 60, answers_with(5), 2);
        assert!(!classify(&second, [&first], &DedupConfig::default()).is_duplicate());
    }

    #[test]
    fn threshold_is_configurable() {
        let first = attempt("s@x.com", 0, answers_with(0), 1);
        let second = attempt("s@x.com", 60, answers_with(5), 2);
        let config = DedupConfig {
            similarity_threshold: 0.9,
            ..DedupConfig::default()
        };
        assert!(classify(&second, [&first], &config).is_duplicate());
    }

    #[test]
    fn undefined_similarity_never_matches() {
        let first = attempt("s@x.com", 0, AnswerSheet::new(), 1);
        let second = attempt("s@x.com", 10, answers_with(0), 2);
        let c = classify(&second, [&first], &DedupConfig::default());
        assert!(!c.is_duplicate());
        assert_eq!(c.evidence[0].similarity, None);
        assert!(c.evidence[0].within_window);
    }

    #[test]
    fn different_identity_is_not_compared() {
        let first = attempt("a@x.com", 0, answers_with(0), 1);
        let second = attempt("b@x.com", 0, answers_with(0), 2);
        let c = classify(&second, [&first], &DedupConfig::default());
        assert!(!c.is_duplicate());
        assert!(c.evidence.is_empty());
    }

    #[test]
    fn earliest_match_is_reported() {
        let a = attempt("s@x.com", 120, answers_with(0), 1);
        let b = attempt("s@x.com", 0, answers_with(0), 2);
        let new = attempt("s@x.com", 200, answers_with(0), 3);
        let c = classify(&new, [&a, &b], &DedupConfig::default());
        assert_eq!(c.matches, vec![a.id, b.id]);
        assert_eq!(c.duplicate_of, Some(b.id));
    }

    #[test]
    fn disjoint_set_unions_transitively() {
        let mut set = DisjointSet::new();
        let a = set.push();
        let b = set.push();
        let c = set.push();
        let d = set.push();
        set.union(a, b);
        set.union(c, b);
        assert_eq!(set.find(a), set.find(c));
        assert_ne!(set.find(a), set.find(d));
        assert_eq!(set.members(c), vec![a, b, c]);
        assert_eq!(set.members(d), vec![d]);
        assert_eq!(set.len(), 4);
    }
}
