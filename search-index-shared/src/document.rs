//! Typed documents.
//!
//! A [`Document`] is what gets written to and read back from the index: a map
//! from field name to one or more tagged values. Values are typed once, when
//! the document is built or a hit is decoded, so decoders never cast JSON.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

/// A single typed field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Value of an exact, full-text or prefix field.
    Text(String),
    /// Value of an integer, integer-range or long field.
    Integer(i64),
    /// Value of a stored-only field.
    Bytes(Vec<u8>),
    /// Value of a timestamp field, millisecond precision on the wire.
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    /// Short name of the value tag, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Integer(_) => "integer",
            Self::Bytes(_) => "bytes",
            Self::Timestamp(_) => "timestamp",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Integer(n) => write!(f, "{}", n),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

/// A document keyed by field name.
///
/// Every field holds an ordered list of values; single-valued fields hold a
/// list of one. Fields are kept sorted by name so that encoding is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    fields: BTreeMap<String, Vec<FieldValue>>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style variant of [`Document::push`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.push(name, value);
        self
    }

    /// Append a value to a field, creating the field if needed.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.entry(name.into()).or_default().push(value.into());
    }

    /// Replace all values of a field.
    pub fn set(&mut self, name: impl Into<String>, values: Vec<FieldValue>) {
        self.fields.insert(name.into(), values);
    }

    pub fn values(&self, name: &str) -> Option<&[FieldValue]> {
        self.fields.get(name).map(Vec::as_slice)
    }

    /// First value of a field.
    pub fn first(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name).and_then(|v| v.first())
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.first(name).and_then(FieldValue::as_text)
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        self.first(name).and_then(FieldValue::as_integer)
    }

    pub fn bytes(&self, name: &str) -> Option<&[u8]> {
        self.first(name).and_then(FieldValue::as_bytes)
    }

    pub fn timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        self.first(name).and_then(FieldValue::as_timestamp)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Iterate over `(field, values)` pairs in field-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[FieldValue])> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Raw field values of a hit, returned by raw reads.
///
/// Unlike a decoded entity, a bundle exposes exactly what the index returned,
/// which makes it useful for verifying index contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldBundle {
    fields: BTreeMap<String, Vec<FieldValue>>,
}

impl FieldBundle {
    pub fn values(&self, name: &str) -> &[FieldValue] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.values(name).first()
    }

    pub fn is_field_present(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }
}

impl From<Document> for FieldBundle {
    fn from(document: Document) -> Self {
        Self {
            fields: document.fields,
        }
    }
}
