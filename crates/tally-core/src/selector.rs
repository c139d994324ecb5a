//! Canonical selection within a duplicate cluster.

use serde::{Deserialize, Serialize};

use crate::model::{Attempt, AttemptId, AttemptState};

/// The canonical member of a cluster and the members linked to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalSelection {
    pub canonical: AttemptId,
    /// Non-canonical members, in cluster order.
    pub duplicates: Vec<AttemptId>,
}

/// Pick the earliest-started member; ties go to the first one seen.
///
/// Ordering is `(started_at, sequence, id)`, so the choice depends only on
/// the member set, never on the order members are passed in.
pub fn select_canonical<'a, I>(members: I) -> Option<CanonicalSelection>
where
    I: IntoIterator<Item = &'a Attempt>,
{
    let members: Vec<&Attempt> = members.into_iter().collect();
    let canonical = members
        .iter()
        .min_by_key(|a| (a.started_at, a.sequence, a.id))?
        .id;

    let duplicates = members
        .iter()
        .map(|a| a.id)
        .filter(|id| *id != canonical)
        .collect();

    Some(CanonicalSelection {
        canonical,
        duplicates,
    })
}

impl CanonicalSelection {
    /// Write this selection's link and state onto one cluster member.
    ///
    /// Returns `true` if the attempt changed. A promoted canonical goes back
    /// to `Ingested` until it is scored; `Flagged` is never overwritten.
    pub fn apply(&self, attempt: &mut Attempt) -> bool {
        let before = (attempt.duplicate_of, attempt.state);

        if attempt.id == self.canonical {
            attempt.duplicate_of = None;
            if attempt.state == AttemptState::Deduped {
                attempt.state = AttemptState::Ingested;
            }
        } else {
            attempt.duplicate_of = Some(self.canonical);
            if attempt.state != AttemptState::Flagged {
                attempt.state = AttemptState::Deduped;
            }
        }

        before != (attempt.duplicate_of, attempt.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityKey;
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    fn attempt(offset_secs: i64, seq: u64) -> Attempt {
        Attempt {
            id: Uuid::new_v4(),
            source_event_id: format!("evt-{seq}"),
            student_name: "S".into(),
            identity: IdentityKey::Phone("1".into()),
            test_id: "t".into(),
            test_name: "T".into(),
            started_at: Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap()
                + Duration::seconds(offset_secs),
            submitted_at: None,
            answers: Default::default(),
            state: AttemptState::Ingested,
            duplicate_of: None,
            sequence: seq,
            raw_payload: serde_json::Value::Null,
        }
    }

    #[test]
    fn earliest_start_wins() {
        let a = attempt(60, 1);
        let b = attempt(0, 2);
        let c = attempt(30, 3);
        let sel = select_canonical([&a, &b, &c]).unwrap();
        assert_eq!(sel.canonical, b.id);
        assert_eq!(sel.duplicates, vec![a.id, c.id]);
    }

    #[test]
    fn tie_goes_to_first_seen() {
        let a = attempt(0, 2);
        let b = attempt(0, 1);
        assert_eq!(select_canonical([&a, &b]).unwrap().canonical, b.id);
        assert_eq!(select_canonical([&b, &a]).unwrap().canonical, b.id);
    }

    #[test]
    fn selection_is_idempotent() {
        let a = attempt(10, 1);
        let b = attempt(5, 2);
        let first = select_canonical([&a, &b]).unwrap();
        let second = select_canonical([&a, &b]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_cluster_has_no_canonical() {
        assert!(select_canonical(std::iter::empty::<&Attempt>()).is_none());
    }

    #[test]
    fn apply_links_duplicates_and_promotes_canonical() {
        let mut canonical = attempt(0, 2);
        canonical.state = AttemptState::Deduped;
        let mut other = attempt(60, 1);
        other.state = AttemptState::Scored;

        let sel = select_canonical([&canonical, &other]).unwrap();
        assert!(sel.apply(&mut canonical));
        assert!(sel.apply(&mut other));

        assert_eq!(canonical.state, AttemptState::Ingested);
        assert_eq!(canonical.duplicate_of, None);
        assert_eq!(other.state, AttemptState::Deduped);
        assert_eq!(other.duplicate_of, Some(canonical.id));

        assert!(!sel.apply(&mut other), "second apply must be a no-op");
    }

    #[test]
    fn apply_keeps_flagged_state() {
        let canonical = attempt(0, 1);
        let mut flagged = attempt(30, 2);
        flagged.state = AttemptState::Flagged;
        let sel = select_canonical([&canonical, &flagged]).unwrap();
        sel.apply(&mut flagged);
        assert_eq!(flagged.state, AttemptState::Flagged);
        assert_eq!(flagged.duplicate_of, Some(canonical.id));
    }
}
