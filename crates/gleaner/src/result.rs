// ABOUTME: ExtractionResult and ExtractedValue: the ordered tree of values produced by evaluating a RuleSet.
// ABOUTME: Serializes to plain JSON objects whose values are strings or arrays of nested objects.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// The value extracted for one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ExtractedValue {
    /// Output of a text or attribute rule. Empty when nothing matched.
    Text(String),
    /// Output of a list rule, one entry per matched node in document order.
    List(Vec<ExtractionResult>),
}

impl ExtractedValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ExtractedValue::Text(s) => Some(s),
            ExtractedValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ExtractionResult]> {
        match self {
            ExtractedValue::List(items) => Some(items),
            ExtractedValue::Text(_) => None,
        }
    }

    /// True for an empty string or an empty list.
    pub fn is_empty(&self) -> bool {
        match self {
            ExtractedValue::Text(s) => s.is_empty(),
            ExtractedValue::List(items) => items.is_empty(),
        }
    }
}

impl From<String> for ExtractedValue {
    fn from(s: String) -> Self {
        ExtractedValue::Text(s)
    }
}

impl From<&str> for ExtractedValue {
    fn from(s: &str) -> Self {
        ExtractedValue::Text(s.to_string())
    }
}

impl From<Vec<ExtractionResult>> for ExtractedValue {
    fn from(items: Vec<ExtractionResult>) -> Self {
        ExtractedValue::List(items)
    }
}

/// Field name to extracted value, in the order of the rule set that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionResult {
    fields: Vec<(String, ExtractedValue)>,
}

impl ExtractionResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Appends a field. The engine visits each rule once, so names never repeat.
    pub(crate) fn push(&mut self, field: impl Into<String>, value: ExtractedValue) {
        self.fields.push((field.into(), value));
    }

    pub fn get(&self, field: &str) -> Option<&ExtractedValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    /// Shorthand for the string value of a text or attribute field.
    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(ExtractedValue::as_text)
    }

    /// Shorthand for the items of a list field.
    pub fn list(&self, field: &str) -> Option<&[ExtractionResult]> {
        self.get(field).and_then(ExtractedValue::as_list)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExtractedValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of fields, at any depth, holding a non-empty value.
    pub fn filled_count(&self) -> usize {
        self.fields
            .iter()
            .map(|(_, value)| match value {
                ExtractedValue::Text(s) => usize::from(!s.is_empty()),
                ExtractedValue::List(items) => {
                    usize::from(!items.is_empty())
                        + items.iter().map(ExtractionResult::filled_count).sum::<usize>()
                }
            })
            .sum()
    }
}

impl Serialize for ExtractionResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<K, V> FromIterator<(K, V)> for ExtractionResult
where
    K: Into<String>,
    V: Into<ExtractedValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut result = ExtractionResult::new();
        for (k, v) in iter {
            result.push(k, v.into());
        }
        result
    }
}
