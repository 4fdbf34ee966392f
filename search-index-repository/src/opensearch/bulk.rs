//! Bulk write encoding and document (de)serialization.
//!
//! Writes go to the engine as newline-delimited JSON: an action line per
//! operation, followed by the document line for index operations. Documents
//! are checked against the [`Schema`] on the way in and typed by it on the
//! way out.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Map, Value};

use crate::errors::IndexError;
use search_index_shared::{Document, FieldType, FieldValue, Schema};

/// A single bulk operation.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkAction {
    /// Index or replace the document stored under `id`.
    Index { id: String, document: Value },
    /// Delete the document stored under `id`.
    Delete { id: String },
}

impl BulkAction {
    pub fn id(&self) -> &str {
        match self {
            Self::Index { id, .. } | Self::Delete { id } => id,
        }
    }
}

/// An ordered list of bulk operations against one index.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkRequest {
    index: String,
    actions: Vec<BulkAction>,
}

impl BulkRequest {
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            actions: Vec::new(),
        }
    }

    pub fn index(mut self, id: impl Into<String>, document: Value) -> Self {
        self.actions.push(BulkAction::Index {
            id: id.into(),
            document,
        });
        self
    }

    pub fn delete(mut self, id: impl Into<String>) -> Self {
        self.actions.push(BulkAction::Delete { id: id.into() });
        self
    }

    pub fn actions(&self) -> &[BulkAction] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Encode as bulk NDJSON, one action line per operation followed by the
    /// document line for index operations. Output order is input order.
    pub fn encode(&self) -> String {
        let mut body = String::new();
        for action in &self.actions {
            let (verb, document) = match action {
                BulkAction::Index { document, .. } => ("index", Some(document)),
                BulkAction::Delete { .. } => ("delete", None),
            };
            let header = json!({ verb: { "_id": action.id(), "_index": self.index } });
            body.push_str(&header.to_string());
            body.push('\n');
            if let Some(document) = document {
                body.push_str(&document.to_string());
                body.push('\n');
            }
        }
        body
    }
}

/// Encode a document into the JSON body stored by the engine.
///
/// Single values are written as scalars, multiple values as arrays.
///
/// # Errors
///
/// `IndexError::ConfigurationError` when a field is not in the schema, a value
/// does not match its field type, or a non-repeatable field has several values.
pub fn encode_document(document: &Document, schema: &Schema) -> Result<Value, IndexError> {
    let mut body = Map::new();
    for (name, values) in document.iter() {
        let def = schema.field(name).ok_or_else(|| {
            IndexError::config(format!("Field {} is not part of schema version {}", name, schema.version()))
        })?;
        if values.len() > 1 && !def.repeatable {
            return Err(IndexError::config(format!(
                "Field {} is not repeatable but has {} values",
                name,
                values.len()
            )));
        }
        let mut encoded = values
            .iter()
            .map(|v| encode_value(def.field_type, name, v))
            .collect::<Result<Vec<_>, _>>()?;
        let value = match encoded.len() {
            0 => continue,
            1 => encoded.remove(0),
            _ => Value::Array(encoded),
        };
        body.insert(name.to_string(), value);
    }
    Ok(Value::Object(body))
}

fn encode_value(field_type: FieldType, name: &str, value: &FieldValue) -> Result<Value, IndexError> {
    match (field_type, value) {
        (FieldType::Exact | FieldType::FullText | FieldType::Prefix, FieldValue::Text(s)) => {
            Ok(json!(s))
        }
        (
            FieldType::Integer | FieldType::IntegerRange | FieldType::Long,
            FieldValue::Integer(n),
        ) => Ok(json!(n)),
        (FieldType::Timestamp, FieldValue::Timestamp(ts)) => Ok(json!(ts.timestamp_millis())),
        (FieldType::StoredOnly, FieldValue::Bytes(bytes)) => Ok(json!(STANDARD.encode(bytes))),
        (field_type, value) => Err(IndexError::config(format!(
            "Field {} of type {} cannot hold a {} value",
            name,
            field_type,
            value.kind()
        ))),
    }
}

/// Decode the raw fields of a hit into a typed document.
///
/// Null values are skipped. Arrays produce one value per element.
///
/// # Errors
///
/// `IndexError::DecodeError` when a field is not in the schema or a value has
/// the wrong shape for its field type.
pub fn decode_document(raw: &Map<String, Value>, schema: &Schema) -> Result<Document, IndexError> {
    let mut document = Document::new();
    for (name, raw_value) in raw {
        let def = schema.field(name).ok_or_else(|| {
            IndexError::decode(format!("Unknown field {} in search hit", name))
        })?;
        let items: &[Value] = match raw_value {
            Value::Array(items) => items,
            Value::Null => continue,
            single => std::slice::from_ref(single),
        };
        let values = items
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| decode_value(def.field_type, name, v))
            .collect::<Result<Vec<_>, _>>()?;
        if !values.is_empty() {
            document.set(name.clone(), values);
        }
    }
    Ok(document)
}

fn decode_value(field_type: FieldType, name: &str, raw: &Value) -> Result<FieldValue, IndexError> {
    let mismatch = || {
        IndexError::decode(format!(
            "Field {} of type {} has malformed value {}",
            name, field_type, raw
        ))
    };
    match field_type {
        FieldType::Exact | FieldType::FullText | FieldType::Prefix => raw
            .as_str()
            .map(|s| FieldValue::Text(s.to_string()))
            .ok_or_else(mismatch),
        FieldType::Integer | FieldType::IntegerRange | FieldType::Long => match raw {
            Value::Number(n) => n.as_i64().map(FieldValue::Integer).ok_or_else(mismatch),
            Value::String(s) => s.parse().map(FieldValue::Integer).map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
        FieldType::Timestamp => decode_timestamp(raw)
            .map(FieldValue::Timestamp)
            .ok_or_else(mismatch),
        FieldType::StoredOnly => raw
            .as_str()
            .and_then(|s| STANDARD.decode(s).ok())
            .map(FieldValue::Bytes)
            .ok_or_else(mismatch),
        other => Err(IndexError::unsupported_field_type(other)),
    }
}

/// Timestamps come back as epoch millis, or as a date string when written by
/// another client.
fn decode_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::Number(n) => Utc.timestamp_millis_opt(n.as_i64()?).single(),
        Value::String(s) => match s.parse::<i64>() {
            Ok(millis) => Utc.timestamp_millis_opt(millis).single(),
            Err(_) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|ts| ts.with_timezone(&Utc)),
        },
        _ => None,
    }
}
