use serde_json::Value;
use tracing::{debug, warn};

use crate::types::{FetchResult, Record};

/// Plural keys the API nests under `data` for specific resource types.
pub const NESTED_PLURAL_KEYS: [&str; 5] = [
    "activities",
    "eventSessions",
    "participations",
    "recordings",
    "transcripts",
];

/// Where the item list was found in a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeShape {
    /// The response is the list.
    Direct,
    /// `{key: [...]}`
    Wrapped(String),
    /// `{outer: {inner: [...]}}`
    DoubleWrapped(String, String),
    Unrecognized,
}

impl EnvelopeShape {
    pub fn wrapped(key: &str) -> Self {
        EnvelopeShape::Wrapped(key.to_string())
    }

    pub fn double_wrapped(outer: &str, inner: &str) -> Self {
        EnvelopeShape::DoubleWrapped(outer.to_string(), inner.to_string())
    }

    fn locate<'a>(&self, value: &'a Value) -> Option<&'a Vec<Value>> {
        match self {
            EnvelopeShape::Direct => value.as_array(),
            EnvelopeShape::Wrapped(key) => value.get(key)?.as_array(),
            EnvelopeShape::DoubleWrapped(outer, inner) => value.get(outer)?.get(inner)?.as_array(),
            EnvelopeShape::Unrecognized => None,
        }
    }
}

/// Extracts the item list from whichever envelope a response uses.
///
/// Shapes are tried in order and the first match wins. A response matching
/// none of them yields an empty result tagged [`EnvelopeShape::Unrecognized`]
/// rather than an error.
#[derive(Debug, Clone)]
pub struct Unwrapper {
    label: String,
    matchers: Vec<EnvelopeShape>,
}

impl Unwrapper {
    /// Unwrapper with the standard shapes and no resource-specific plural key.
    pub fn new(label: impl Into<String>) -> Self {
        let mut matchers = vec![
            EnvelopeShape::Direct,
            EnvelopeShape::double_wrapped("data", "items"),
        ];
        matchers.extend(
            NESTED_PLURAL_KEYS
                .iter()
                .map(|key| EnvelopeShape::double_wrapped("data", key)),
        );
        matchers.push(EnvelopeShape::wrapped("data"));
        matchers.push(EnvelopeShape::wrapped("items"));

        Self {
            label: label.into(),
            matchers,
        }
    }

    /// Unwrapper that also accepts a top-level `plural_key` list as the last resort.
    pub fn for_resource(label: impl Into<String>, plural_key: Option<&str>) -> Self {
        let mut unwrapper = Self::new(label);
        if let Some(key) = plural_key {
            unwrapper.matchers.push(EnvelopeShape::wrapped(key));
        }
        unwrapper
    }

    /// Append another shape after the existing ones.
    pub fn with_shape(mut self, shape: EnvelopeShape) -> Self {
        self.matchers.push(shape);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn shapes(&self) -> &[EnvelopeShape] {
        &self.matchers
    }

    pub fn unwrap(&self, value: &Value) -> FetchResult {
        for shape in &self.matchers {
            if let Some(list) = shape.locate(value) {
                let items = to_records(list, &self.label);
                debug!(label = %self.label, shape = ?shape, items = items.len(), "Unwrapped response");
                return FetchResult::new(items, shape.clone());
            }
        }

        warn!(
            label = %self.label,
            kind = value_kind(value),
            "Unrecognized response shape, treating as empty"
        );
        FetchResult::new(Vec::new(), EnvelopeShape::Unrecognized)
    }
}

fn to_records(list: &[Value], label: &str) -> Vec<Record> {
    let mut skipped = 0usize;
    let records = list
        .iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map.clone()),
            _ => {
                skipped += 1;
                None
            }
        })
        .collect();
    if skipped > 0 {
        debug!(label, skipped, "Skipped non-object list entries");
    }
    records
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(result: &FetchResult) -> Vec<i64> {
        result
            .items
            .iter()
            .map(|r| r["id"].as_i64().unwrap())
            .collect()
    }

    #[test]
    fn test_direct_sequence() {
        let result = Unwrapper::new("messages").unwrap(&json!([{"id": 1}, {"id": 2}]));
        assert_eq!(result.shape, EnvelopeShape::Direct);
        assert_eq!(ids(&result), vec![1, 2]);
    }

    #[test]
    fn test_data_items() {
        let value = json!({"data": {"items": [{"id": 3}], "activities": [{"id": 9}]}});
        let result = Unwrapper::new("activities").unwrap(&value);
        assert_eq!(result.shape, EnvelopeShape::double_wrapped("data", "items"));
        assert_eq!(ids(&result), vec![3]);
    }

    #[test]
    fn test_data_named_plural() {
        for key in NESTED_PLURAL_KEYS {
            let value = json!({"data": {key: [{"id": 5}]}});
            let result = Unwrapper::new("x").unwrap(&value);
            assert_eq!(result.shape, EnvelopeShape::double_wrapped("data", key));
            assert_eq!(ids(&result), vec![5]);
        }
    }

    #[test]
    fn test_data_sequence() {
        let result = Unwrapper::new("members").unwrap(&json!({"data": [{"id": 1}]}));
        assert_eq!(result.shape, EnvelopeShape::wrapped("data"));
    }

    #[test]
    fn test_top_level_items_before_plural() {
        let value = json!({"items": [{"id": 1}], "users": [{"id": 2}]});
        let result = Unwrapper::for_resource("users", Some("users")).unwrap(&value);
        assert_eq!(result.shape, EnvelopeShape::wrapped("items"));
        assert_eq!(ids(&result), vec![1]);
    }

    #[test]
    fn test_top_level_resource_plural() {
        let value = json!({"users": [{"id": 2}], "total": 1});
        let result = Unwrapper::for_resource("users", Some("users")).unwrap(&value);
        assert_eq!(result.shape, EnvelopeShape::wrapped("users"));
        assert_eq!(ids(&result), vec![2]);
    }

    #[test]
    fn test_unrecognized_is_empty_not_error() {
        let result = Unwrapper::new("x").unwrap(&json!({"status": "ok"}));
        assert_eq!(result.shape, EnvelopeShape::Unrecognized);
        assert!(result.items.is_empty());

        let result = Unwrapper::new("x").unwrap(&json!("plain text"));
        assert_eq!(result.shape, EnvelopeShape::Unrecognized);
    }

    #[test]
    fn test_empty_list_is_recognized() {
        let result = Unwrapper::new("x").unwrap(&json!({"data": {"items": []}}));
        assert_eq!(result.shape, EnvelopeShape::double_wrapped("data", "items"));
        assert!(result.items.is_empty());
    }

    #[test]
    fn test_non_object_entries_skipped() {
        let result = Unwrapper::new("x").unwrap(&json!([{"id": 1}, 7, "y", {"id": 2}]));
        assert_eq!(ids(&result), vec![1, 2]);
    }

    #[test]
    fn test_custom_shape_appended() {
        let unwrapper = Unwrapper::new("x").with_shape(EnvelopeShape::double_wrapped("result", "rows"));
        let result = unwrapper.unwrap(&json!({"result": {"rows": [{"id": 4}]}}));
        assert_eq!(ids(&result), vec![4]);
    }
}
