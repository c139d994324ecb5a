//! Incoming attempt events.
//!
//! Sources are inconsistent about types (phones arrive as numbers, answers
//! as lowercase strings, timestamps with or without offsets), so events are
//! parsed leniently from raw JSON, one record at a time. A record that cannot
//! be parsed is rejected on its own; its siblings are unaffected.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::EventError;
use crate::identity::{self, IdentityKey};
use crate::model::{Answer, AnswerSheet};

/// Naive formats accepted after RFC 3339; these are interpreted as UTC.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// A parsed, immutable attempt event.
#[derive(Debug, Clone)]
pub struct AttemptEvent {
    pub event_id: String,
    pub student_name: String,
    pub student_email: Option<String>,
    pub student_phone: Option<String>,
    pub test_id: String,
    pub test_name: String,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub answers: AnswerSheet,
    /// The record exactly as received.
    pub raw_payload: Value,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    event_id: Option<Value>,
    #[serde(default)]
    student_name: Option<Value>,
    #[serde(default)]
    student_email: Option<Value>,
    #[serde(default)]
    student_phone: Option<Value>,
    #[serde(default)]
    test_id: Option<Value>,
    #[serde(default)]
    test_name: Option<Value>,
    #[serde(default)]
    started_at: Option<Value>,
    #[serde(default)]
    submitted_at: Option<Value>,
    #[serde(default)]
    answers: Option<Value>,
}

impl AttemptEvent {
    /// Parse one raw record.
    pub fn parse(payload: Value) -> Result<Self, EventError> {
        if !payload.is_object() {
            return Err(EventError::InvalidPayload(
                "event must be a JSON object".into(),
            ));
        }
        let raw: RawEvent = serde_json::from_value(payload.clone())
            .map_err(|e| EventError::InvalidPayload(e.to_string()))?;

        let event_id = text(raw.event_id).ok_or(EventError::MissingField("event_id"))?;
        let test_id = text(raw.test_id).ok_or(EventError::MissingField("test_id"))?;
        let test_name = text(raw.test_name).unwrap_or_else(|| test_id.clone());
        let student_name = text(raw.student_name).unwrap_or_default();

        let started_raw = text(raw.started_at);
        let started_at = started_raw
            .as_deref()
            .and_then(parse_timestamp)
            .ok_or(EventError::UnparseableTimestamp(started_raw.clone()))?;

        // A missing or garbled submit time only makes this a partial attempt.
        let submitted_at = match text(raw.submitted_at) {
            Some(s) => {
                let parsed = parse_timestamp(&s);
                if parsed.is_none() {
                    tracing::warn!(event_id = %event_id, value = %s, "ignoring unparseable submitted_at");
                }
                parsed
            }
            None => None,
        };

        let answers = parse_answers(raw.answers)?;

        Ok(Self {
            event_id,
            student_name,
            student_email: text(raw.student_email),
            student_phone: text(raw.student_phone),
            test_id,
            test_name,
            started_at,
            submitted_at,
            answers,
            raw_payload: payload,
        })
    }

    /// Normalized identity of the submitting student, if any.
    pub fn identity(&self) -> Option<IdentityKey> {
        identity::normalize(self.student_email.as_deref(), self.student_phone.as_deref())
    }
}

/// Parse an ISO 8601 / RFC 3339 timestamp. Offsets are converted to UTC;
/// timestamps without an offset are taken to be UTC already.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Scalar JSON value as trimmed text; blank and null become `None`.
fn text(value: Option<Value>) -> Option<String> {
    let s = match value? {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn parse_answers(value: Option<Value>) -> Result<AnswerSheet, EventError> {
    let map: BTreeMap<String, Value> = match value {
        None | Some(Value::Null) => return Ok(AnswerSheet::new()),
        Some(Value::Object(obj)) => obj.into_iter().collect(),
        Some(other) => {
            return Err(EventError::InvalidPayload(format!(
                "answers must be an object, got {other}"
            )))
        }
    };

    let mut sheet = AnswerSheet::new();
    for (key, value) in map {
        let question: u32 = key.trim().parse().map_err(|_| EventError::MalformedAnswers {
            key: key.clone(),
            problem: "is not a number",
        })?;
        let answer = match value {
            Value::Null => Answer::Skip,
            Value::String(s) => Answer::from(s),
            other => Answer::from(other.to_string()),
        };
        if sheet.insert(question, answer).is_some() {
            return Err(EventError::MalformedAnswers {
                key,
                problem: "repeats an earlier question number",
            });
        }
    }
    Ok(sheet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn event() -> Value {
        json!({
            "event_id": "evt-1",
            "student_name": "Asha Rao",
            "student_email": "Asha.Rao+mock@Gmail.com",
            "student_phone": null,
            "test_id": "jee-1",
            "test_name": "JEE Mock 1",
            "started_at": "2025-03-01T09:00:00Z",
            "submitted_at": "2025-03-01T10:00:00+05:30",
            "answers": {"1": "a", "2": "SKIP", "3": "e"}
        })
    }

    #[test]
    fn parse_full_event() {
        let e = AttemptEvent::parse(event()).unwrap();
        assert_eq!(e.event_id, "evt-1");
        assert_eq!(e.started_at, Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap());
        assert_eq!(
            e.submitted_at,
            Some(Utc.with_ymd_and_hms(2025, 3, 1, 4, 30, 0).unwrap())
        );
        assert_eq!(e.answers[&1], Answer::A);
        assert_eq!(e.answers[&2], Answer::Skip);
        assert_eq!(e.answers[&3], Answer::Other("E".into()));
        assert_eq!(
            e.identity(),
            Some(IdentityKey::Email("asha.rao@gmail.com".into()))
        );
        assert_eq!(e.raw_payload, event());
    }

    #[test]
    fn numeric_phone_is_accepted() {
        let mut v = event();
        v["student_email"] = Value::Null;
        v["student_phone"] = json!(917654321098u64);
        let e = AttemptEvent::parse(v).unwrap();
        assert_eq!(e.identity(), Some(IdentityKey::Phone("917654321098".into())));
    }

    #[test]
    fn missing_started_at_is_rejected() {
        let mut v = event();
        v.as_object_mut().unwrap().remove("started_at");
        assert_eq!(
            AttemptEvent::parse(v).unwrap_err(),
            EventError::UnparseableTimestamp(None)
        );
    }

    #[test]
    fn garbled_started_at_is_rejected() {
        let mut v = event();
        v["started_at"] = json!("yesterday");
        assert!(matches!(
            AttemptEvent::parse(v),
            Err(EventError::UnparseableTimestamp(Some(_)))
        ));
    }

    #[test]
    fn missing_submitted_at_is_partial_not_error() {
        let mut v = event();
        v["submitted_at"] = json!("not a time");
        assert_eq!(AttemptEvent::parse(v).unwrap().submitted_at, None);
    }

    #[test]
    fn naive_timestamp_is_utc() {
        assert_eq!(
            parse_timestamp("2025-03-01T09:00:00"),
            Some(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap())
        );
        assert_eq!(
            parse_timestamp("2025-03-01 09:00:00.250").map(|t| t.timestamp_millis() % 1000),
            Some(250)
        );
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn non_numeric_question_is_rejected() {
        let mut v = event();
        v["answers"] = json!({"q1": "A"});
        assert_eq!(
            AttemptEvent::parse(v).unwrap_err(),
            EventError::MalformedAnswers {
                key: "q1".into(),
                problem: "is not a number",
            }
        );
    }

    #[test]
    fn repeated_question_number_is_rejected() {
        let mut v = event();
        v["answers"] = json!({"1": "A", "01": "B"});
        let err = AttemptEvent::parse(v).unwrap_err();
        assert!(matches!(err, EventError::MalformedAnswers { .. }));
        assert!(err.to_string().contains("repeats"));

        let mut v = event();
        v["answers"] = json!({"+2": "C", " 2 ": "D"});
        assert!(matches!(
            AttemptEvent::parse(v).unwrap_err(),
            EventError::MalformedAnswers { .. }
        ));
    }

    #[test]
    fn missing_test_id_is_rejected() {
        let mut v = event();
        v["test_id"] = json!("  ");
        assert_eq!(
            AttemptEvent::parse(v).unwrap_err(),
            EventError::MissingField("test_id")
        );
    }

    #[test]
    fn non_object_is_invalid_payload() {
        assert!(matches!(
            AttemptEvent::parse(json!([1, 2, 3])),
            Err(EventError::InvalidPayload(_))
        ));
    }

    #[test]
    fn wrongly_typed_answers_is_invalid_payload() {
        let mut v = event();
        v["answers"] = json!("A,B,C");
        assert!(matches!(
            AttemptEvent::parse(v),
            Err(EventError::InvalidPayload(_))
        ));
    }

    #[test]
    fn no_contact_fields_has_no_identity() {
        let mut v = event();
        v["student_email"] = Value::Null;
        let e = AttemptEvent::parse(v).unwrap();
        assert_eq!(e.identity(), None);
    }
}
