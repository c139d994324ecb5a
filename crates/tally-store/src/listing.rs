//! Filtered, paginated attempt listing for reviewers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tally_core::identity::IdentityKey;
use tally_core::model::{Attempt, AttemptId, AttemptState};

use crate::error::StoreError;

pub const DEFAULT_PER_PAGE: usize = 20;
pub const MAX_PER_PAGE: usize = 100;

/// Criteria an attempt must meet to be listed. `None` fields match anything.
#[derive(Debug, Clone, Default)]
pub struct AttemptFilter {
    pub test_id: Option<String>,
    pub state: Option<AttemptState>,
    /// `Some(true)` lists only duplicates, `Some(false)` only canonical attempts.
    pub has_duplicates: Option<bool>,
    /// Inclusive lower bound on `started_at`.
    pub started_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `started_at`.
    pub started_to: Option<DateTime<Utc>>,
    /// Case-insensitive substring of the student's name, email or phone.
    pub search: Option<String>,
}

impl AttemptFilter {
    pub fn matches(&self, attempt: &Attempt) -> bool {
        if self.test_id.as_deref().is_some_and(|t| t != attempt.test_id) {
            return false;
        }
        if self.state.is_some_and(|s| s != attempt.state) {
            return false;
        }
        if self
            .has_duplicates
            .is_some_and(|d| d != attempt.duplicate_of.is_some())
        {
            return false;
        }
        if self.started_from.is_some_and(|from| attempt.started_at < from) {
            return false;
        }
        if self.started_to.is_some_and(|to| attempt.started_at > to) {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => contact_matches(attempt, &needle.to_lowercase()),
            _ => true,
        }
    }
}

/// Search the name, the normalized identity and the contact fields as
/// received.
fn contact_matches(attempt: &Attempt, needle: &str) -> bool {
    let raw = ["student_email", "student_phone"]
        .into_iter()
        .filter_map(|field| attempt.raw_payload.get(field).and_then(|v| v.as_str()));

    [attempt.student_name.as_str(), attempt.identity.as_str()]
        .into_iter()
        .chain(raw)
        .any(|field| field.to_lowercase().contains(needle))
}

/// One listed attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRow {
    pub attempt_id: AttemptId,
    pub source_event_id: String,
    pub student_name: String,
    pub identity: IdentityKey,
    pub test_id: String,
    pub state: AttemptState,
    pub duplicate_of: Option<AttemptId>,
    pub started_at: DateTime<Utc>,
    pub score: Option<f64>,
    pub flags: usize,
}

/// One page of a listing plus the size of the whole result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptPage {
    pub entries: Vec<AttemptRow>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub total_pages: usize,
}

/// Check 1-based `page` and `per_page` in `1..=MAX_PER_PAGE`.
pub fn check_page(page: usize, per_page: usize) -> Result<(), StoreError> {
    if page == 0 || per_page == 0 || per_page > MAX_PER_PAGE {
        return Err(StoreError::InvalidPage { page, per_page });
    }
    Ok(())
}

/// Cut one page out of `rows`, which must already be in listing order.
pub fn paginate(rows: Vec<AttemptRow>, page: usize, per_page: usize) -> AttemptPage {
    let total = rows.len();
    let entries = rows
        .into_iter()
        .skip((page - 1).saturating_mul(per_page))
        .take(per_page)
        .collect();
    AttemptPage {
        entries,
        page,
        per_page,
        total,
        total_pages: total.div_ceil(per_page),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use uuid::Uuid;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 1, 9, 0, 0).unwrap()
    }

    fn attempt() -> Attempt {
        Attempt {
            id: Uuid::new_v4(),
            source_event_id: "e1".into(),
            student_name: "Meera Iyer".into(),
            identity: IdentityKey::Email("meera@gmail.com".into()),
            test_id: "t1".into(),
            test_name: "Test 1".into(),
            started_at: base(),
            submitted_at: None,
            answers: Default::default(),
            state: AttemptState::Scored,
            duplicate_of: None,
            sequence: 1,
            raw_payload: json!({
                "student_email": "Meera+mock@Gmail.com",
                "student_phone": "+91 98450 12345",
            }),
        }
    }

    fn row(n: usize) -> AttemptRow {
        let a = attempt();
        AttemptRow {
            attempt_id: a.id,
            source_event_id: format!("e{n}"),
            student_name: a.student_name,
            identity: a.identity,
            test_id: a.test_id,
            state: a.state,
            duplicate_of: None,
            started_at: a.started_at,
            score: None,
            flags: 0,
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(AttemptFilter::default().matches(&attempt()));
    }

    #[test]
    fn test_id_filter() {
        let mut f = AttemptFilter {
            test_id: Some("t1".into()),
            ..Default::default()
        };
        assert!(f.matches(&attempt()));
        f.test_id = Some("t2".into());
        assert!(!f.matches(&attempt()));
    }

    #[test]
    fn state_filter() {
        let mut f = AttemptFilter {
            state: Some(AttemptState::Scored),
            ..Default::default()
        };
        assert!(f.matches(&attempt()));
        f.state = Some(AttemptState::Flagged);
        assert!(!f.matches(&attempt()));
    }

    #[test]
    fn duplicate_filter() {
        let canonical = attempt();
        let mut dup = attempt();
        dup.duplicate_of = Some(canonical.id);

        let only_dups = AttemptFilter {
            has_duplicates: Some(true),
            ..Default::default()
        };
        assert!(only_dups.matches(&dup));
        assert!(!only_dups.matches(&canonical));

        let no_dups = AttemptFilter {
            has_duplicates: Some(false),
            ..Default::default()
        };
        assert!(no_dups.matches(&canonical));
        assert!(!no_dups.matches(&dup));
    }

    #[test]
    fn start_range_is_inclusive() {
        let a = attempt();
        let exact = AttemptFilter {
            started_from: Some(base()),
            started_to: Some(base()),
            ..Default::default()
        };
        assert!(exact.matches(&a));

        let later = AttemptFilter {
            started_from: Some(base() + Duration::seconds(1)),
            ..Default::default()
        };
        assert!(!later.matches(&a));

        let earlier = AttemptFilter {
            started_to: Some(base() - Duration::seconds(1)),
            ..Default::default()
        };
        assert!(!earlier.matches(&a));
    }

    #[test]
    fn search_name_email_and_phone() {
        let a = attempt();
        for needle in ["iyer", "MEERA@gmail", "meera+mock", "98450", "  Meera  "] {
            let f = AttemptFilter {
                search: Some(needle.into()),
                ..Default::default()
            };
            assert!(f.matches(&a), "{needle}");
        }
        let miss = AttemptFilter {
            search: Some("ravi".into()),
            ..Default::default()
        };
        assert!(!miss.matches(&a));

        let blank = AttemptFilter {
            search: Some("   ".into()),
            ..Default::default()
        };
        assert!(blank.matches(&a));
    }

    #[test]
    fn page_bounds() {
        assert!(check_page(1, 1).is_ok());
        assert!(check_page(3, MAX_PER_PAGE).is_ok());
        assert!(matches!(
            check_page(0, 20),
            Err(StoreError::InvalidPage { page: 0, .. })
        ));
        assert!(check_page(1, 0).is_err());
        assert!(check_page(1, MAX_PER_PAGE + 1).is_err());
    }

    #[test]
    fn paginate_slices_and_counts() {
        let rows: Vec<AttemptRow> = (0..45).map(row).collect();

        let first = paginate(rows.clone(), 1, 20);
        assert_eq!(first.entries.len(), 20);
        assert_eq!(first.total, 45);
        assert_eq!(first.total_pages, 3);
        assert_eq!(first.entries[0].source_event_id, "e0");

        let last = paginate(rows.clone(), 3, 20);
        assert_eq!(last.entries.len(), 5);
        assert_eq!(last.entries[0].source_event_id, "e40");

        let past_end = paginate(rows, 4, 20);
        assert!(past_end.entries.is_empty());
        assert_eq!(past_end.total, 45);

        let empty = paginate(vec![], 1, 20);
        assert_eq!(empty.total_pages, 0);
    }
}
