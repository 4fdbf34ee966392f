//! Query builders.
//!
//! This module translates [`Predicate`] trees into the engine's query DSL,
//! checking every leaf against the index [`Schema`].

use std::ops::Bound;

use serde_json::{json, Map, Value};

use crate::errors::IndexError;
use search_index_shared::{Condition, FieldType, FieldValue, Predicate, Schema};

/// Build the query DSL fragment for a predicate.
///
/// The translation handles:
/// - `match_all` for [`Predicate::All`]
/// - `bool` clauses for AND (`must`), OR (`should`) and NOT (`must_not`)
/// - `term` for exact and numeric equality, or a missing-field query for an
///   empty exact value
/// - `match_phrase` / `match_phrase_prefix` for full-text and prefix fields
/// - `range` for numeric and timestamp bounds
///
/// # Errors
///
/// `IndexError::QueryParseError` when a leaf names a field missing from the
/// schema, or applies a value or operator the field type does not support.
pub fn build_query(predicate: &Predicate, schema: &Schema) -> Result<Value, IndexError> {
    match predicate {
        Predicate::All => Ok(json!({ "match_all": {} })),
        Predicate::And(children) => Ok(json!({
            "bool": { "must": build_all(children, schema)? }
        })),
        Predicate::Or(children) => Ok(json!({
            "bool": {
                "should": build_all(children, schema)?,
                "minimum_should_match": 1
            }
        })),
        Predicate::Not(child) => Ok(json!({
            "bool": { "must_not": [build_query(child, schema)?] }
        })),
        Predicate::Field { field, condition } => build_leaf(field, condition, schema),
    }
}

fn build_all(children: &[Predicate], schema: &Schema) -> Result<Vec<Value>, IndexError> {
    children.iter().map(|c| build_query(c, schema)).collect()
}

fn build_leaf(field: &str, condition: &Condition, schema: &Schema) -> Result<Value, IndexError> {
    let def = schema
        .field(field)
        .ok_or_else(|| IndexError::query_parse(format!("Unsupported field: {}", field)))?;

    match (def.field_type, condition) {
        (FieldType::Exact, Condition::Equals(FieldValue::Text(text))) if text.is_empty() => {
            Ok(json!({
                "bool": { "must_not": [{ "exists": { "field": field } }] }
            }))
        }
        (FieldType::Exact, Condition::Equals(FieldValue::Text(text))) => {
            Ok(json!({ "term": { field: text } }))
        }
        (FieldType::FullText, Condition::Equals(FieldValue::Text(text))) => {
            Ok(json!({ "match_phrase": { field: text } }))
        }
        (FieldType::Prefix, Condition::Equals(FieldValue::Text(text))) => {
            Ok(json!({ "match_phrase_prefix": { field: text } }))
        }
        (
            FieldType::Integer | FieldType::IntegerRange | FieldType::Long | FieldType::Timestamp,
            Condition::Equals(value),
        ) => Ok(json!({ "term": { field: range_value(def.field_type, field, value)? } })),
        (
            FieldType::Integer | FieldType::IntegerRange | FieldType::Long | FieldType::Timestamp,
            Condition::Range { from, to },
        ) => build_range(def.field_type, field, from, to),
        (FieldType::StoredOnly, _) => Err(IndexError::query_parse(format!(
            "Field {} is not searchable",
            field
        ))),
        (field_type, condition) => Err(IndexError::query_parse(format!(
            "Unsupported condition on {} field {}: {}",
            field_type,
            field,
            describe(condition)
        ))),
    }
}

fn build_range(
    field_type: FieldType,
    field: &str,
    from: &Bound<FieldValue>,
    to: &Bound<FieldValue>,
) -> Result<Value, IndexError> {
    let mut bounds = Map::new();
    match from {
        Bound::Included(v) => {
            bounds.insert("gte".into(), range_value(field_type, field, v)?);
        }
        Bound::Excluded(v) => {
            bounds.insert("gt".into(), range_value(field_type, field, v)?);
        }
        Bound::Unbounded => {}
    }
    match to {
        Bound::Included(v) => {
            bounds.insert("lte".into(), range_value(field_type, field, v)?);
        }
        Bound::Excluded(v) => {
            bounds.insert("lt".into(), range_value(field_type, field, v)?);
        }
        Bound::Unbounded => {}
    }
    Ok(json!({ "range": { field: bounds } }))
}

/// Wire value of a numeric or timestamp operand.
fn range_value(field_type: FieldType, field: &str, value: &FieldValue) -> Result<Value, IndexError> {
    match (field_type, value) {
        (FieldType::Timestamp, FieldValue::Timestamp(ts)) => Ok(json!(ts.timestamp_millis())),
        (FieldType::Timestamp, _) => Err(IndexError::query_parse(format!(
            "Expected timestamp value for field {}, got {}",
            field,
            value.kind()
        ))),
        (_, FieldValue::Integer(n)) => Ok(json!(n)),
        _ => Err(IndexError::query_parse(format!(
            "Expected integer value for field {}, got {}",
            field,
            value.kind()
        ))),
    }
}

fn describe(condition: &Condition) -> String {
    match condition {
        Condition::Equals(value) => format!("equals {}", value.kind()),
        Condition::Range { .. } => "range".to_string(),
    }
}
