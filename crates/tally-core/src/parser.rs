//! Test catalog and event batch loading.
//!
//! The catalog is a TOML file of `[[tests]]` tables carrying each test's
//! marking scheme and answer key. Event batches are JSON files holding either
//! a bare array of records or an `{"events": [...]}` envelope.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::model::{default_max_marks, Answer, AnswerSheet, MarkingScheme, TestDefinition};

/// Intermediate TOML structure for parsing catalog files.
#[derive(Debug, Deserialize)]
struct TomlCatalogFile {
    #[serde(default)]
    tests: Vec<TomlTest>,
}

#[derive(Debug, Deserialize)]
struct TomlTest {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default = "default_max_marks")]
    max_marks: u32,
    #[serde(default)]
    marking: Option<TomlMarking>,
    #[serde(default)]
    answer_key: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct TomlMarking {
    #[serde(default = "default_correct")]
    correct: f64,
    #[serde(default = "default_wrong")]
    wrong: f64,
    #[serde(default)]
    skip: f64,
}

fn default_correct() -> f64 {
    MarkingScheme::default().correct
}

fn default_wrong() -> f64 {
    MarkingScheme::default().wrong
}

/// A parsed test catalog.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub tests: Vec<TestDefinition>,
    /// `(test id, key)` answer-key entries whose question was not a number.
    /// They are dropped from the definition and surfaced by validation.
    pub rejected_keys: Vec<(String, String)>,
}

impl Catalog {
    pub fn get(&self, test_id: &str) -> Option<&TestDefinition> {
        self.tests.iter().find(|t| t.id == test_id)
    }
}

/// Parse a catalog file.
pub fn parse_catalog(path: &Path) -> Result<Catalog> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog file: {}", path.display()))?;

    parse_catalog_str(&content, path)
}

/// Parse a catalog from a TOML string (useful for testing).
pub fn parse_catalog_str(content: &str, source_path: &Path) -> Result<Catalog> {
    let parsed: TomlCatalogFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let mut catalog = Catalog::default();
    for t in parsed.tests {
        let mut answer_key = AnswerSheet::new();
        for (key, value) in t.answer_key {
            match key.trim().parse::<u32>() {
                Ok(q) => {
                    answer_key.insert(q, Answer::from(value));
                }
                Err(_) => catalog.rejected_keys.push((t.id.clone(), key)),
            }
        }

        let marking = t
            .marking
            .map(|m| MarkingScheme {
                correct: m.correct,
                wrong: m.wrong,
                skip: m.skip,
            })
            .unwrap_or_default();

        catalog.tests.push(TestDefinition {
            name: t.name.unwrap_or_else(|| t.id.clone()),
            id: t.id,
            max_marks: t.max_marks,
            marking,
            answer_key,
        });
    }

    Ok(catalog)
}

/// A warning from catalog validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The test ID (if applicable).
    pub test_id: Option<String>,
    /// Warning message.
    pub message: String,
}

/// Validate a catalog for common issues.
pub fn validate_catalog(catalog: &Catalog) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let mut seen_ids = HashSet::new();
    for test in &catalog.tests {
        if !seen_ids.insert(&test.id) {
            warnings.push(ValidationWarning {
                test_id: Some(test.id.clone()),
                message: format!("duplicate test ID: {}", test.id),
            });
        }
    }

    for test in &catalog.tests {
        if test.answer_key.is_empty() {
            warnings.push(ValidationWarning {
                test_id: Some(test.id.clone()),
                message: "answer key is empty; every attempt will score 0".into(),
            });
        }

        for (q, answer) in &test.answer_key {
            if matches!(answer, Answer::Skip | Answer::Other(_)) {
                warnings.push(ValidationWarning {
                    test_id: Some(test.id.clone()),
                    message: format!("question {q}: expected answer {answer} is not one of A-D"),
                });
            }
        }

        if let Err(e) = test.marking.validate(&test.id) {
            warnings.push(ValidationWarning {
                test_id: Some(test.id.clone()),
                message: e.to_string(),
            });
        }
    }

    for (test_id, key) in &catalog.rejected_keys {
        warnings.push(ValidationWarning {
            test_id: Some(test_id.clone()),
            message: format!("answer key entry {key:?} is not a question number"),
        });
    }

    warnings
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BatchFile {
    Envelope { events: Vec<Value> },
    Bare(Vec<Value>),
}

/// Load a batch of raw event records from a JSON file.
pub fn load_batch(path: &Path) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read batch file: {}", path.display()))?;
    parse_batch_str(&content)
        .with_context(|| format!("failed to parse batch: {}", path.display()))
}

/// Parse a batch from a JSON string. Records are kept raw so that each one
/// can fail validation on its own.
pub fn parse_batch_str(content: &str) -> Result<Vec<Value>> {
    let parsed: BatchFile = serde_json::from_str(content)
        .context("expected a JSON array of events or an object with an \"events\" array")?;
    Ok(match parsed {
        BatchFile::Envelope { events } => events,
        BatchFile::Bare(events) => events,
    })
}
