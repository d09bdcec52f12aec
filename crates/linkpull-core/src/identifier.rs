use serde_json::Value;

use crate::types::{Identifier, Record};

/// Secondary fields joined into `{session}_{user}_{start}` when a record has
/// no primary identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeKey {
    pub session_keys: Vec<String>,
    pub user_keys: Vec<String>,
    pub time_keys: Vec<String>,
}

impl CompositeKey {
    /// Session, user and start-time fields of a call activity.
    pub fn activity() -> Self {
        Self {
            session_keys: vec!["eventSessionId".into()],
            user_keys: vec!["userId".into()],
            time_keys: vec!["startTime".into(), "startedAt".into()],
        }
    }

    fn build(&self, record: &Record) -> Option<Identifier> {
        let session = first_scalar(record, &self.session_keys).unwrap_or_default();
        let user = first_scalar(record, &self.user_keys).unwrap_or_default();
        let start = first_scalar(record, &self.time_keys).unwrap_or_default();

        if session.is_empty() && start.is_empty() {
            return None;
        }
        Some(Identifier::new(format!("{session}_{user}_{start}")))
    }
}

/// Ordered candidate keys for a record's identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierSpec {
    keys: Vec<String>,
    composite: Option<CompositeKey>,
}

impl IdentifierSpec {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            composite: None,
        }
    }

    pub fn with_composite(mut self, composite: CompositeKey) -> Self {
        self.composite = Some(composite);
        self
    }

    pub fn messages() -> Self {
        Self::new(["id", "messageId"])
    }

    pub fn members() -> Self {
        Self::new(["id", "chatUserId", "userId"])
    }

    pub fn activities() -> Self {
        Self::new(["id", "activityId", "guid"]).with_composite(CompositeKey::activity())
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// First present, non-empty candidate wins; the composite key is only
    /// consulted when no candidate resolves.
    pub fn extract(&self, record: &Record) -> Option<Identifier> {
        if let Some(value) = first_scalar(record, &self.keys) {
            return Some(Identifier::new(value));
        }
        self.composite.as_ref().and_then(|c| c.build(record))
    }
}

fn first_scalar(record: &Record, keys: &[String]) -> Option<String> {
    keys.iter()
        .filter_map(|key| record.get(key))
        .find_map(scalar)
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_first_non_empty_key_wins() {
        let spec = IdentifierSpec::activities();
        let r = record(json!({"id": "", "activityId": null, "guid": "g-1"}));
        assert_eq!(spec.extract(&r), Some(Identifier::new("g-1")));
    }

    #[test]
    fn test_numeric_identifier() {
        let r = record(json!({"id": 12345}));
        assert_eq!(
            IdentifierSpec::messages().extract(&r),
            Some(Identifier::new("12345"))
        );
    }

    #[test]
    fn test_message_id_fallback() {
        let r = record(json!({"messageId": "m-7", "text": "hi"}));
        assert_eq!(
            IdentifierSpec::messages().extract(&r),
            Some(Identifier::new("m-7"))
        );
    }

    #[test]
    fn test_missing_identifier() {
        let r = record(json!({"text": "hello"}));
        assert_eq!(IdentifierSpec::messages().extract(&r), None);
    }

    #[test]
    fn test_composite_fallback() {
        let r = record(json!({
            "eventSessionId": "s1",
            "userId": 7,
            "startedAt": "2024-01-02T10:00:00Z"
        }));
        assert_eq!(
            IdentifierSpec::activities().extract(&r),
            Some(Identifier::new("s1_7_2024-01-02T10:00:00Z"))
        );
    }

    #[test]
    fn test_composite_requires_session_or_start() {
        let r = record(json!({"userId": 7}));
        assert_eq!(IdentifierSpec::activities().extract(&r), None);
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let spec = IdentifierSpec::activities();
        let samples = [
            json!({"id": "a"}),
            json!({"eventSessionId": "s", "startTime": "t"}),
            json!({"nothing": true}),
        ];
        for sample in samples {
            let r = record(sample);
            assert_eq!(spec.extract(&r), spec.extract(&r));
        }
    }
}
