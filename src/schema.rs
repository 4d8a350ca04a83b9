//! Schema types describing the fields of an index.
//!
//! A [`IndexInfo`] is fixed before events are added and never changes for
//! the lifetime of a segment. Field ids are assigned in declaration order
//! and double as positions in the field table.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::error::{CalamusError, Result};

/// Field names that collide with fixed segment file names.
const RESERVED_FIELD_NAMES: &[&str] = &["posting", "rows", "info"];

/// The type of an event field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Unsigned 64-bit integer.
    Int,
    /// Free text, tokenized before indexing.
    Text,
    /// Exact string, indexed verbatim.
    Keyword,
    /// Unsigned 64-bit timestamp.
    Timestamp,
    /// 64-bit float.
    Float,
}

impl FieldType {
    /// On-disk type byte. Zero is never a valid type.
    pub fn type_byte(&self) -> u8 {
        match self {
            FieldType::Int => 1,
            FieldType::Text => 2,
            FieldType::Keyword => 3,
            FieldType::Timestamp => 4,
            FieldType::Float => 5,
        }
    }

    /// Decode an on-disk type byte.
    pub fn from_type_byte(byte: u8) -> Result<Self> {
        match byte {
            1 => Ok(FieldType::Int),
            2 => Ok(FieldType::Text),
            3 => Ok(FieldType::Keyword),
            4 => Ok(FieldType::Timestamp),
            5 => Ok(FieldType::Float),
            _ => Err(CalamusError::format(format!(
                "unknown field type byte: {byte}"
            ))),
        }
    }

    /// Human-readable type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Int => "int",
            FieldType::Text => "text",
            FieldType::Keyword => "keyword",
            FieldType::Timestamp => "timestamp",
            FieldType::Float => "float",
        }
    }
}

/// A single field declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    /// Field id, assigned in declaration order.
    pub id: u32,
    /// Field name, unique within the index.
    pub name: String,
    /// Value type of the field.
    pub field_type: FieldType,
    /// Whether the field is indexed (in addition to being stored).
    pub indexed: bool,
}

/// The schema of an index: a name plus an ordered field table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    name: String,
    fields: Vec<FieldInfo>,
}

impl IndexInfo {
    /// Start building an index schema.
    pub fn builder(name: impl Into<String>) -> IndexInfoBuilder {
        IndexInfoBuilder {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Index name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All fields in declaration order.
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a field by id.
    pub fn field_by_id(&self, id: u32) -> Option<&FieldInfo> {
        self.fields.get(id as usize).filter(|f| f.id == id)
    }

    /// Number of declared fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the schema declares no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Builder for [`IndexInfo`].
pub struct IndexInfoBuilder {
    name: String,
    fields: Vec<FieldInfo>,
}

impl IndexInfoBuilder {
    /// Declare a field. Ids are assigned in call order.
    pub fn add_field(
        mut self,
        name: impl Into<String>,
        field_type: FieldType,
        indexed: bool,
    ) -> Self {
        let id = self.fields.len() as u32;
        self.fields.push(FieldInfo {
            id,
            name: name.into(),
            field_type,
            indexed,
        });
        self
    }

    /// Validate the declarations and build the schema.
    ///
    /// Field names must be non-empty, unique, free of path separators
    /// (they become file names), and must not collide with the fixed
    /// segment file names.
    pub fn build(self) -> Result<IndexInfo> {
        let mut seen = AHashSet::with_capacity(self.fields.len());
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(CalamusError::schema("field name must not be empty"));
            }
            if field.name.contains(['/', '\\']) {
                return Err(CalamusError::schema(format!(
                    "field name '{}' contains a path separator",
                    field.name
                )));
            }
            if RESERVED_FIELD_NAMES.contains(&field.name.as_str()) {
                return Err(CalamusError::schema(format!(
                    "field name '{}' is reserved",
                    field.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(CalamusError::schema(format!(
                    "duplicate field name '{}'",
                    field.name
                )));
            }
        }
        Ok(IndexInfo {
            name: self.name,
            fields: self.fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_info() -> IndexInfo {
        IndexInfo::builder("logs")
            .add_field("ts", FieldType::Timestamp, true)
            .add_field("message", FieldType::Text, true)
            .add_field("host", FieldType::Keyword, true)
            .add_field("bytes", FieldType::Int, false)
            .build()
            .unwrap()
    }

    #[test]
    fn test_field_ids_follow_declaration_order() {
        let info = make_info();
        assert_eq!(info.len(), 4);
        assert_eq!(info.field("ts").unwrap().id, 0);
        assert_eq!(info.field("message").unwrap().id, 1);
        assert_eq!(info.field_by_id(2).unwrap().name, "host");
        assert!(info.field_by_id(9).is_none());
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let result = IndexInfo::builder("logs")
            .add_field("host", FieldType::Keyword, true)
            .add_field("host", FieldType::Text, true)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_reserved_and_invalid_names_rejected() {
        for bad in ["rows", "posting", "info", "", "a/b"] {
            let result = IndexInfo::builder("logs")
                .add_field(bad, FieldType::Keyword, true)
                .build();
            assert!(result.is_err(), "name {bad:?} should be rejected");
        }
    }

    #[test]
    fn test_type_byte_round_trip() {
        for ft in [
            FieldType::Int,
            FieldType::Text,
            FieldType::Keyword,
            FieldType::Timestamp,
            FieldType::Float,
        ] {
            assert_eq!(FieldType::from_type_byte(ft.type_byte()).unwrap(), ft);
        }
        assert!(FieldType::from_type_byte(0).is_err());
        assert!(FieldType::from_type_byte(6).is_err());
    }

    #[test]
    fn test_schema_serde_round_trip() {
        let info = make_info();
        let json = serde_json::to_string(&info).unwrap();
        let back: IndexInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info);
    }
}
