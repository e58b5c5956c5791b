//! GRIB key/value signatures.
//!
//! A signature is a set of GRIB keys with expected values, e.g.
//! `{parameterNumber: 0, constituentType: 0, productDefinitionTemplateNumber: 40}`.
//! A decoded message header is represented the same way and matches a
//! signature when it carries every key of the signature with an equal value.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Value of a single GRIB key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GribValue {
    Int(i64),
    Float(f64),
    Text(String),
}

/// Type a GRIB key is read as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GribValueType {
    Int,
    Float,
    Text,
}

impl fmt::Display for GribValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GribValueType::Int => "integer",
            GribValueType::Float => "float",
            GribValueType::Text => "string",
        };
        f.write_str(name)
    }
}

impl GribValue {
    pub fn value_type(&self) -> GribValueType {
        match self {
            GribValue::Int(_) => GribValueType::Int,
            GribValue::Float(_) => GribValueType::Float,
            GribValue::Text(_) => GribValueType::Text,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            GribValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Render the value as it appears in decoder definition files.
    pub fn to_definition_literal(&self) -> String {
        match self {
            GribValue::Text(s) => format!("\"{}\"", s),
            other => other.to_string(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            GribValue::Int(_) => 0,
            GribValue::Float(_) => 1,
            GribValue::Text(_) => 2,
        }
    }
}

impl fmt::Display for GribValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GribValue::Int(v) => write!(f, "{}", v),
            GribValue::Float(v) => write!(f, "{}", v),
            GribValue::Text(s) => f.write_str(s),
        }
    }
}

// Floats compare by bit pattern so that signatures can be hashed and ordered.
impl PartialEq for GribValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GribValue {}

impl Hash for GribValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            GribValue::Int(v) => v.hash(state),
            GribValue::Float(v) => v.to_bits().hash(state),
            GribValue::Text(s) => s.hash(state),
        }
    }
}

impl PartialOrd for GribValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GribValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (GribValue::Int(a), GribValue::Int(b)) => a.cmp(b),
            (GribValue::Float(a), GribValue::Float(b)) => a.total_cmp(b),
            (GribValue::Text(a), GribValue::Text(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl From<i64> for GribValue {
    fn from(v: i64) -> Self {
        GribValue::Int(v)
    }
}

impl From<i32> for GribValue {
    fn from(v: i32) -> Self {
        GribValue::Int(v as i64)
    }
}

impl From<u32> for GribValue {
    fn from(v: u32) -> Self {
        GribValue::Int(v as i64)
    }
}

impl From<String> for GribValue {
    fn from(v: String) -> Self {
        GribValue::Text(v)
    }
}

impl From<f64> for GribValue {
    fn from(v: f64) -> Self {
        GribValue::Float(v)
    }
}

impl From<&str> for GribValue {
    fn from(v: &str) -> Self {
        GribValue::Text(v.to_string())
    }
}

/// An ordered set of GRIB key/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GribSignature(BTreeMap<String, GribValue>);

/// Key/value pairs read from one decoded message.
pub type FieldHeader = GribSignature;

impl GribSignature {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<GribValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<GribValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&GribValue> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &GribValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every key of `signature` is present here with an equal value.
    pub fn matches(&self, signature: &GribSignature) -> bool {
        signature
            .0
            .iter()
            .all(|(key, expected)| self.0.get(key) == Some(expected))
    }
}

impl fmt::Display for GribSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", key, value.to_definition_literal())?;
        }
        f.write_str("}")
    }
}

impl<K: Into<String>, V: Into<GribValue>> FromIterator<(K, V)> for GribSignature {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ozone() -> GribSignature {
        GribSignature::new()
            .with("parameterNumber", 0)
            .with("constituentType", 0)
            .with("productDefinitionTemplateNumber", 40)
    }

    #[test]
    fn test_header_matches_subset() {
        let header = ozone()
            .with("level", 0)
            .with("typeOfProcessedData", "fc");
        assert!(header.matches(&ozone()));
        assert!(!ozone().matches(&header));
    }

    #[test]
    fn test_value_mismatch() {
        let header = ozone().with("constituentType", 5);
        assert!(!header.matches(&ozone()));
    }

    #[test]
    fn test_types_do_not_compare_equal() {
        assert_ne!(GribValue::Int(0), GribValue::Float(0.0));
        assert_ne!(GribValue::Int(0), GribValue::Text("0".into()));
        assert_eq!(GribValue::Float(0.5), GribValue::Float(0.5));
    }

    #[test]
    fn test_untagged_yaml_values() {
        let sig: GribSignature =
            serde_yaml::from_str("{a: 1, b: 2.5, c: fc}").unwrap();
        assert_eq!(sig.get("a"), Some(&GribValue::Int(1)));
        assert_eq!(sig.get("b"), Some(&GribValue::Float(2.5)));
        assert_eq!(sig.get("c"), Some(&GribValue::Text("fc".into())));
    }

    #[test]
    fn test_display_is_sorted() {
        let sig = GribSignature::new().with("b", "fc").with("a", 1);
        assert_eq!(sig.to_string(), r#"{a: 1, b: "fc"}"#);
    }
}
