//! Core data model types for tally.
//!
//! Attempts, answers, lifecycle states and per-test marking definitions.
//! Everything here is plain data; the algorithms live in sibling modules.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SchemeError;
use crate::identity::IdentityKey;

/// Identifier of a stored attempt.
pub type AttemptId = Uuid;

/// Question number → answer.
pub type AnswerSheet = BTreeMap<u32, Answer>;

/// A single answer to a multiple-choice question.
///
/// Parsing is total: anything that is not one of the four options or `SKIP`
/// is kept verbatim (upper-cased) as [`Answer::Other`] and scores as wrong.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Answer {
    A,
    B,
    C,
    D,
    Skip,
    Other(String),
}

impl Answer {
    pub fn is_skip(&self) -> bool {
        matches!(self, Answer::Skip)
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::A => write!(f, "A"),
            Answer::B => write!(f, "B"),
            Answer::C => write!(f, "C"),
            Answer::D => write!(f, "D"),
            Answer::Skip => write!(f, "SKIP"),
            Answer::Other(raw) => write!(f, "{raw}"),
        }
    }
}

impl FromStr for Answer {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        Ok(match upper.as_str() {
            "A" => Answer::A,
            "B" => Answer::B,
            "C" => Answer::C,
            "D" => Answer::D,
            "SKIP" => Answer::Skip,
            _ => Answer::Other(upper),
        })
    }
}

impl From<String> for Answer {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(answer) => answer,
            Err(never) => match never {},
        }
    }
}

impl From<&str> for Answer {
    fn from(s: &str) -> Self {
        Answer::from(s.to_string())
    }
}

impl From<Answer> for String {
    fn from(answer: Answer) -> Self {
        answer.to_string()
    }
}

/// Lifecycle of an attempt.
///
/// `Ingested → Deduped | Scored`. `Flagged` is only ever set by an external
/// review action; the pipeline never assigns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptState {
    Ingested,
    Deduped,
    Scored,
    Flagged,
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptState::Ingested => write!(f, "INGESTED"),
            AttemptState::Deduped => write!(f, "DEDUPED"),
            AttemptState::Scored => write!(f, "SCORED"),
            AttemptState::Flagged => write!(f, "FLAGGED"),
        }
    }
}

impl FromStr for AttemptState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "INGESTED" => Ok(AttemptState::Ingested),
            "DEDUPED" => Ok(AttemptState::Deduped),
            "SCORED" => Ok(AttemptState::Scored),
            "FLAGGED" => Ok(AttemptState::Flagged),
            other => Err(format!("unknown attempt state: {other}")),
        }
    }
}

/// An accepted assessment attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub id: AttemptId,
    /// Event id from the submitting source. Audit and replay detection only.
    pub source_event_id: String,
    pub student_name: String,
    pub identity: IdentityKey,
    pub test_id: String,
    pub test_name: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub answers: AnswerSheet,
    pub state: AttemptState,
    /// Canonical attempt this one duplicates; `None` for canonical attempts.
    #[serde(default)]
    pub duplicate_of: Option<AttemptId>,
    /// Per-test first-seen order, used to break `started_at` ties.
    pub sequence: u64,
    /// The event exactly as it was received.
    #[serde(default)]
    pub raw_payload: serde_json::Value,
}

impl Attempt {
    pub fn is_canonical(&self) -> bool {
        self.duplicate_of.is_none()
    }
}

/// Points awarded per correct, wrong and skipped question.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarkingScheme {
    pub correct: f64,
    pub wrong: f64,
    #[serde(default)]
    pub skip: f64,
}

impl Default for MarkingScheme {
    fn default() -> Self {
        Self {
            correct: 4.0,
            wrong: -1.0,
            skip: 0.0,
        }
    }
}

impl MarkingScheme {
    /// Reject schemes that would poison every score computed with them.
    pub fn validate(&self, test_id: &str) -> Result<(), SchemeError> {
        for (field, value) in [
            ("correct", self.correct),
            ("wrong", self.wrong),
            ("skip", self.skip),
        ] {
            if !value.is_finite() {
                return Err(SchemeError::NonFinite {
                    test_id: test_id.to_string(),
                    field,
                    value,
                });
            }
        }
        Ok(())
    }
}

/// Everything the scoring engine needs to know about one test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestDefinition {
    pub id: String,
    pub name: String,
    #[serde(default = "default_max_marks")]
    pub max_marks: u32,
    #[serde(default)]
    pub marking: MarkingScheme,
    /// Expected answers. Questions missing here are not scored.
    #[serde(default)]
    pub answer_key: AnswerSheet,
}

pub fn default_max_marks() -> u32 {
    400
}
