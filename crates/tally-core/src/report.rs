//! Ingestion report types with JSON persistence.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cluster::MatchEvidence;
use crate::model::AttemptId;

/// Final status of one input record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    /// Canonical attempt, scored.
    Scored,
    /// Duplicate of another attempt.
    Deduped,
    /// Event id already ingested; nothing stored.
    Replayed,
    /// Rejected; see `reason`.
    Error,
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventStatus::Scored => write!(f, "SCORED"),
            EventStatus::Deduped => write!(f, "DEDUPED"),
            EventStatus::Replayed => write!(f, "REPLAYED"),
            EventStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Outcome of one input record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventOutcome {
    /// Position in the submitted batch.
    pub index: usize,
    pub event_id: Option<String>,
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_id: Option<AttemptId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_attempt_id: Option<AttemptId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Dedup comparisons made for this record.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<MatchEvidence>,
}

impl EventOutcome {
    pub fn error(index: usize, event_id: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            index,
            event_id,
            status: EventStatus::Error,
            attempt_id: None,
            canonical_attempt_id: None,
            score: None,
            reason: Some(reason.into()),
            evidence: Vec::new(),
        }
    }
}

/// Batch counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub total_received: usize,
    /// Records that produced a new attempt.
    pub ingested: usize,
    pub duplicates_detected: usize,
    /// Score records written by this batch.
    pub scored: usize,
    pub errors: usize,
    pub replayed: usize,
}

/// A complete ingestion report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub summary: IngestSummary,
    pub outcomes: Vec<EventOutcome>,
    pub duration_ms: u64,
}

impl IngestReport {
    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: IngestReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    pub fn errors(&self) -> impl Iterator<Item = &EventOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == EventStatus::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> IngestReport {
        IngestReport {
            id: Uuid::nil(),
            created_at: Utc::now(),
            summary: IngestSummary {
                total_received: 2,
                ingested: 1,
                duplicates_detected: 0,
                scored: 1,
                errors: 1,
                replayed: 0,
            },
            outcomes: vec![
                EventOutcome {
                    index: 0,
                    event_id: Some("e1".into()),
                    status: EventStatus::Scored,
                    attempt_id: Some(Uuid::nil()),
                    canonical_attempt_id: None,
                    score: Some(12.0),
                    reason: None,
                    evidence: vec![],
                },
                EventOutcome::error(1, None, "no usable identity"),
            ],
            duration_ms: 3,
        }
    }

    #[test]
    fn save_and_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.json");
        report().save_json(&path).unwrap();
        let loaded = IngestReport::load_json(&path).unwrap();
        assert_eq!(loaded.summary, report().summary);
        assert_eq!(loaded.outcomes.len(), 2);
        assert_eq!(loaded.errors().count(), 1);
    }

    #[test]
    fn optional_fields_are_omitted() {
        let json = serde_json::to_value(EventOutcome::error(4, None, "bad")).unwrap();
        assert_eq!(json["status"], "ERROR");
        assert!(json.get("attempt_id").is_none());
        assert!(json.get("evidence").is_none());
    }

    #[test]
    fn load_missing_file_fails() {
        assert!(IngestReport::load_json(Path::new("/nonexistent/report.json")).is_err());
    }
}
