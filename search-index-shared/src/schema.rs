//! Field schema definitions.
//!
//! A [`Schema`] is the ordered list of fields an entity kind exposes to the
//! search index, together with a version number. The version is part of the
//! physical index name, so a schema change always lands in a fresh index.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The kind of data a field holds and how the engine should index it.
///
/// Marked `#[non_exhaustive]`: consumers translating field types into a wire
/// format must handle types they do not know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum FieldType {
    /// Exact-match keyword, compared as a literal term.
    Exact,
    /// Analyzed full text.
    FullText,
    /// Analyzed text searchable by prefix.
    Prefix,
    /// 32-bit integer value.
    Integer,
    /// Integer value that is queried with ranges.
    IntegerRange,
    /// 64-bit integer value.
    Long,
    /// Point in time, stored as epoch milliseconds.
    Timestamp,
    /// Opaque bytes that are stored but never searched.
    StoredOnly,
}

impl FieldType {
    /// Canonical upper-case name of the type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Exact => "EXACT",
            Self::FullText => "FULL_TEXT",
            Self::Prefix => "PREFIX",
            Self::Integer => "INTEGER",
            Self::IntegerRange => "INTEGER_RANGE",
            Self::Long => "LONG",
            Self::Timestamp => "TIMESTAMP",
            Self::StoredOnly => "STORED_ONLY",
        }
    }

    /// Whether values of this type are strings on the wire.
    pub fn is_textual(&self) -> bool {
        matches!(self, Self::Exact | Self::FullText | Self::Prefix)
    }

    /// Whether values of this type are integers on the wire.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::IntegerRange | Self::Long)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single field of a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name as it appears in documents and queries.
    pub name: String,
    /// How the field is indexed.
    pub field_type: FieldType,
    /// Whether the raw value is returned verbatim from the index.
    pub stored: bool,
    /// Whether the field may hold more than one value.
    pub repeatable: bool,
}

impl FieldDef {
    /// Create a non-stored, single-valued field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            stored: false,
            repeatable: false,
        }
    }

    pub fn exact(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Exact)
    }

    pub fn full_text(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::FullText)
    }

    pub fn prefix(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Prefix)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Integer)
    }

    pub fn integer_range(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::IntegerRange)
    }

    pub fn long(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Long)
    }

    pub fn timestamp(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Timestamp)
    }

    pub fn stored_only(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::StoredOnly).stored()
    }

    /// Mark the field as stored.
    pub fn stored(mut self) -> Self {
        self.stored = true;
        self
    }

    /// Mark the field as repeatable.
    pub fn repeatable(mut self) -> Self {
        self.repeatable = true;
        self
    }
}

/// Errors raised while assembling a schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Two fields share a name.
    #[error("Duplicate field in schema: {0}")]
    DuplicateField(String),

    /// A field was declared with an empty name.
    #[error("Schema field names must not be empty")]
    EmptyFieldName,
}

/// Versioned, ordered set of field definitions for one entity kind.
///
/// Immutable once built; share it behind an `Arc` if several components need it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    version: u32,
    fields: Vec<FieldDef>,
    positions: HashMap<String, usize>,
}

impl Schema {
    /// Start building a schema with the given version.
    pub fn builder(version: u32) -> SchemaBuilder {
        SchemaBuilder {
            version,
            fields: Vec::new(),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.positions.get(name).map(|&i| &self.fields[i])
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    /// Names of the stored fields, in declaration order.
    pub fn stored_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.stored)
            .map(|f| f.name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Builder for [`Schema`].
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    version: u32,
    fields: Vec<FieldDef>,
}

impl SchemaBuilder {
    /// Append a field.
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Validate and freeze the schema.
    pub fn build(self) -> Result<Schema, SchemaError> {
        let mut positions = HashMap::with_capacity(self.fields.len());
        for (i, field) in self.fields.iter().enumerate() {
            if field.name.is_empty() {
                return Err(SchemaError::EmptyFieldName);
            }
            if positions.insert(field.name.clone(), i).is_some() {
                return Err(SchemaError::DuplicateField(field.name.clone()));
            }
        }
        Ok(Schema {
            version: self.version,
            fields: self.fields,
            positions,
        })
    }
}
