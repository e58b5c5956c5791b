//! Caller requests.
//!
//! A request is a flat mapping from field name to a JSON value: usually a
//! string or a list of strings, sometimes numbers (e.g. an `area`). Keys are
//! kept sorted so that serialising the same request twice always produces
//! the same bytes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{RequestError, RequestResult};

/// Keys carrying the output-format directive, in order of precedence.
pub const FORMAT_KEYS: [&str; 2] = ["data_format", "format"];

/// Key carrying the packaging directive.
pub const DOWNLOAD_FORMAT_KEY: &str = "download_format";

/// Key carrying the reduction/aggregation directive.
pub const POST_PROCESS_KEY: &str = "post_process";

/// A mapping from field name to value(s).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Request {
    fields: BTreeMap<String, Value>,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a request from a JSON object document.
    pub fn from_json_str(s: &str) -> RequestResult<Self> {
        let value: Value = serde_json::from_str(s)?;
        Self::from_value(value)
    }

    /// Build a request from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> RequestResult<Self> {
        match value {
            Value::Object(map) => Ok(Self {
                fields: map.into_iter().collect(),
            }),
            other => Err(RequestError::InvalidDocument(format!(
                "request must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Builder-style insertion.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Insert or replace a field, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    /// Remove a field, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Read a field as a list of strings.
    ///
    /// Scalars become single-element lists, numbers and booleans are
    /// rendered with their JSON text, `null` becomes an empty list. Nested
    /// lists and objects are rejected. Returns `Ok(None)` when the field is
    /// absent.
    pub fn values(&self, key: &str) -> RequestResult<Option<Vec<String>>> {
        match self.fields.get(key) {
            None => Ok(None),
            Some(value) => coerce_values(key, value).map(Some),
        }
    }

    /// Like [`Request::values`] but the field must be present and non-empty.
    pub fn required_values(&self, key: &str) -> RequestResult<Vec<String>> {
        match self.values(key)? {
            Some(values) if !values.is_empty() => Ok(values),
            Some(_) => Err(RequestError::invalid(key, "at least one value is required")),
            None => Err(RequestError::MissingField(key.to_string())),
        }
    }

    /// Serialise with sorted keys.
    pub fn to_canonical_json(&self) -> String {
        // A BTreeMap<String, Value> always serialises.
        serde_json::to_string(&self.fields).unwrap_or_default()
    }

    pub fn as_map(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }
}

impl FromIterator<(String, Value)> for Request {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

fn coerce_values(key: &str, value: &Value) -> RequestResult<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| coerce_scalar(key, item))
            .collect(),
        other => Ok(vec![coerce_scalar(key, other)?]),
    }
}

fn coerce_scalar(key: &str, value: &Value) -> RequestResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(RequestError::invalid(
            key,
            format!("expected a string or number, got {}", json_type_name(other)),
        )),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
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

    #[test]
    fn test_values_coercion() {
        let request = Request::new()
            .with("variable", "ozone")
            .with("level", json!([0, 50]))
            .with("step", json!(["0", "1"]))
            .with("area", Value::Null);

        assert_eq!(request.values("variable").unwrap(), Some(vec!["ozone".to_string()]));
        assert_eq!(
            request.values("level").unwrap(),
            Some(vec!["0".to_string(), "50".to_string()])
        );
        assert_eq!(request.values("step").unwrap().unwrap().len(), 2);
        assert_eq!(request.values("area").unwrap(), Some(vec![]));
        assert_eq!(request.values("missing").unwrap(), None);
    }

    #[test]
    fn test_nested_values_rejected() {
        let request = Request::new().with("variable", json!([["ozone"]]));
        let err = request.values("variable").unwrap_err();
        assert!(matches!(err, RequestError::InvalidValue { .. }));
    }

    #[test]
    fn test_required_values() {
        let request = Request::new().with("model", json!([]));
        assert!(matches!(
            request.required_values("model"),
            Err(RequestError::InvalidValue { .. })
        ));
        assert_eq!(
            request.required_values("variable"),
            Err(RequestError::MissingField("variable".to_string()))
        );
    }

    #[test]
    fn test_from_json_requires_object() {
        assert!(Request::from_json_str(r#"{"variable": "ozone"}"#).is_ok());
        assert!(matches!(
            Request::from_json_str(r#"["ozone"]"#),
            Err(RequestError::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_canonical_json_is_sorted() {
        let a = Request::new().with("b", "2").with("a", "1");
        let b = Request::new().with("a", "1").with("b", "2");
        assert_eq!(a.to_canonical_json(), b.to_canonical_json());
        assert_eq!(a.to_canonical_json(), r#"{"a":"1","b":"2"}"#);
    }
}
