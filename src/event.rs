use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::schema::FieldType;

/// The value of a single event field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Unsigned 64-bit integer.
    Int(u64),
    /// Free text, tokenized before indexing.
    Text(String),
    /// Exact string, indexed verbatim.
    Keyword(String),
    /// Unsigned 64-bit timestamp.
    Timestamp(u64),
    /// 64-bit float.
    Float(f64),
}

impl Value {
    /// The field type this value belongs to.
    pub fn field_type(&self) -> FieldType {
        match self {
            Value::Int(_) => FieldType::Int,
            Value::Text(_) => FieldType::Text,
            Value::Keyword(_) => FieldType::Keyword,
            Value::Timestamp(_) => FieldType::Timestamp,
            Value::Float(_) => FieldType::Float,
        }
    }

    /// Returns the integer value if this is an Int variant.
    pub fn as_int(&self) -> Option<u64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string content if this is a Text or Keyword variant.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Keyword(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the timestamp value if this is a Timestamp variant.
    pub fn as_timestamp(&self) -> Option<u64> {
        match self {
            Value::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the float value if this is a Float variant.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }
}

/// A single event: a collection of named field values.
///
/// Events are ephemeral. They are consumed when a segment is sealed and
/// reconstructed from the row store on read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Field data.
    pub fields: HashMap<String, Value>,
}

impl Event {
    /// Create a new empty event.
    pub fn new() -> Self {
        Self {
            fields: HashMap::new(),
        }
    }

    /// Add an integer field.
    pub fn add_int(mut self, name: impl Into<String>, value: u64) -> Self {
        self.fields.insert(name.into(), Value::Int(value));
        self
    }

    /// Add a text field.
    pub fn add_text(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.fields.insert(name.into(), Value::Text(text.into()));
        self
    }

    /// Add a keyword field.
    pub fn add_keyword(mut self, name: impl Into<String>, keyword: impl Into<String>) -> Self {
        self.fields
            .insert(name.into(), Value::Keyword(keyword.into()));
        self
    }

    /// Add a timestamp field.
    pub fn add_timestamp(mut self, name: impl Into<String>, value: u64) -> Self {
        self.fields.insert(name.into(), Value::Timestamp(value));
        self
    }

    /// Add a float field.
    pub fn add_float(mut self, name: impl Into<String>, value: f64) -> Self {
        self.fields.insert(name.into(), Value::Float(value));
        self
    }

    /// Get a reference to a field's value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Check if the event has a field.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Get all field names.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(|s| s.as_str()).collect()
    }

    /// Get the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the event is empty.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_methods() {
        let event = Event::new()
            .add_timestamp("ts", 1700000000)
            .add_text("message", "connection reset by peer")
            .add_keyword("host", "web-1")
            .add_int("bytes", 512)
            .add_float("latency", 0.25);

        assert_eq!(event.len(), 5);
        assert_eq!(event.get("ts").unwrap().as_timestamp(), Some(1700000000));
        assert_eq!(event.get("host").unwrap().as_str(), Some("web-1"));
        assert_eq!(event.get("bytes").unwrap().as_int(), Some(512));
        assert_eq!(event.get("latency").unwrap().as_float(), Some(0.25));
        assert!(!event.has_field("missing"));
    }

    #[test]
    fn test_value_field_types() {
        assert_eq!(Value::Int(1).field_type(), FieldType::Int);
        assert_eq!(Value::Text("a".into()).field_type(), FieldType::Text);
        assert_eq!(Value::Keyword("a".into()).field_type(), FieldType::Keyword);
        assert_eq!(Value::Timestamp(1).field_type(), FieldType::Timestamp);
        assert_eq!(Value::Float(1.0).field_type(), FieldType::Float);
    }
}
