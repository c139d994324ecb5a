//! Closed-form answer similarity.
//!
//! Only questions present in both answer sheets are compared; a question one
//! attempt never reached does not count for or against the pair.

use serde::{Deserialize, Serialize};

use crate::model::AnswerSheet;

/// Raw overlap between two answer sheets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOverlap {
    /// Common questions with the same answer.
    pub matching: usize,
    /// Questions present in both sheets.
    pub compared: usize,
}

impl AnswerOverlap {
    /// `matching / compared`, or `None` when nothing overlaps.
    pub fn ratio(&self) -> Option<f64> {
        if self.compared == 0 {
            None
        } else {
            Some(self.matching as f64 / self.compared as f64)
        }
    }
}

/// Count matching answers over the questions both sheets contain.
pub fn overlap(a: &AnswerSheet, b: &AnswerSheet) -> AnswerOverlap {
    let mut matching = 0;
    let mut compared = 0;
    for (question, answer) in a {
        if let Some(other) = b.get(question) {
            compared += 1;
            if answer == other {
                matching += 1;
            }
        }
    }
    AnswerOverlap { matching, compared }
}

/// Similarity ratio in `[0, 1]`, undefined (`None`) for disjoint sheets.
pub fn similarity(a: &AnswerSheet, b: &AnswerSheet) -> Option<f64> {
    overlap(a, b).ratio()
}
