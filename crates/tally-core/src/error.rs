//! Domain error types.
//!
//! Per-event failures are isolated by the pipeline and recorded in the
//! outcome list; they never abort a batch. Recompute failures are surfaced to
//! the caller so it can decide what to report.

use thiserror::Error;
use uuid::Uuid;

use crate::model::AttemptState;

/// Why a single ingestion event was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// Neither an email nor a phone number carried a usable identity.
    #[error("no usable identity: event has neither email nor phone")]
    UnusableIdentity,

    /// The start timestamp is missing or could not be parsed.
    #[error("could not parse started_at timestamp: {0:?}")]
    UnparseableTimestamp(Option<String>),

    /// A required field is absent or blank.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// The answer map has a key that is not a question number, or two keys
    /// naming the same question (`"1"` and `"01"`).
    #[error("malformed answers: question key {key:?} {problem}")]
    MalformedAnswers { key: String, problem: &'static str },

    /// The record does not have the shape of an attempt event at all.
    #[error("invalid event payload: {0}")]
    InvalidPayload(String),
}

/// Errors from an explicit score recomputation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecomputeError {
    /// Recompute was requested for an attempt that is not canonical.
    #[error("attempt {attempt_id} is not eligible for scoring (state {state})")]
    NotEligible { attempt_id: Uuid, state: AttemptState },

    /// No attempt with this id is known to storage.
    #[error("attempt not found: {0}")]
    NotFound(Uuid),

    /// The test's marking scheme cannot produce a score.
    #[error(transparent)]
    Scheme(#[from] SchemeError),
}

/// A marking scheme that cannot be used for scoring.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemeError {
    /// A point value is NaN or infinite.
    #[error("marking scheme for test {test_id} has a non-finite {field} value ({value})")]
    NonFinite {
        test_id: String,
        field: &'static str,
        value: f64,
    },
}
