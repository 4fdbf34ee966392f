//! Index settings and mappings.
//!
//! This module translates a [`Schema`] into the engine's mapping format and
//! builds the settings document used when an index is created.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};

use crate::config::ElasticConfig;
use crate::errors::IndexError;
use crate::opensearch::version::QueryAdapter;
use search_index_shared::{FieldType, Schema};

/// Mapping type of timestamp fields.
pub const TIMESTAMP_FIELD_TYPE: &str = "date";

/// Accepted formats of timestamp fields: ISO date-or-time, or epoch millis.
pub const TIMESTAMP_FIELD_FORMAT: &str = "date_optional_time||epoch_millis";

/// Analyzer referenced by full-text fields.
pub const FULL_TEXT_ANALYZER: &str = "custom_with_char_filter";

const CHAR_FILTER: &str = "custom_mapping";
const NUMBER_FIELD_TYPE: &str = "long";
const PREFIX_MIN_CHARS: u32 = 5;
const PREFIX_MAX_CHARS: u32 = 19;

/// Mapping of a single field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldProperties {
    #[serde(rename = "type")]
    pub field_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<&'static str, FieldProperties>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_prefixes: Option<IndexPrefixes>,
}

impl FieldProperties {
    fn of(field_type: &'static str) -> Self {
        Self {
            field_type,
            index: None,
            format: None,
            analyzer: None,
            fields: None,
            index_prefixes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexPrefixes {
    pub min_chars: u32,
    pub max_chars: u32,
}

/// Source filtering clause of a mapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceFilter {
    pub includes: Vec<String>,
}

/// Mapping document of an index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mapping {
    #[serde(rename = "_source")]
    pub source: SourceFilter,
    pub properties: BTreeMap<String, FieldProperties>,
}

/// Translate a schema into an index mapping.
///
/// Every schema field gets exactly one property, selected by its type. The
/// `_source` includes list names exactly the stored fields.
///
/// # Errors
///
/// `IndexError::UnsupportedFieldType` when a field type has no mapping.
pub fn create_mapping(schema: &Schema, adapter: &QueryAdapter) -> Result<Mapping, IndexError> {
    let mut properties = BTreeMap::new();
    for field in schema.fields() {
        let mapped = match field.field_type {
            FieldType::Exact => exact_field(adapter),
            FieldType::Timestamp => {
                let mut p = FieldProperties::of(TIMESTAMP_FIELD_TYPE);
                p.format = Some(TIMESTAMP_FIELD_FORMAT);
                p
            }
            FieldType::Integer | FieldType::IntegerRange | FieldType::Long => {
                FieldProperties::of(NUMBER_FIELD_TYPE)
            }
            FieldType::FullText => {
                let mut p = FieldProperties::of(adapter.string_field_type());
                p.analyzer = Some(FULL_TEXT_ANALYZER);
                p
            }
            FieldType::StoredOnly => FieldProperties::of(adapter.string_field_type()),
            FieldType::Prefix => {
                let mut p = FieldProperties::of(adapter.string_field_type());
                p.index_prefixes = Some(IndexPrefixes {
                    min_chars: PREFIX_MIN_CHARS,
                    max_chars: PREFIX_MAX_CHARS,
                });
                p
            }
            other => return Err(IndexError::unsupported_field_type(other)),
        };
        properties.insert(field.name.clone(), mapped);
    }

    Ok(Mapping {
        source: SourceFilter {
            includes: schema
                .stored_fields()
                .into_iter()
                .map(str::to_string)
                .collect(),
        },
        properties,
    })
}

fn exact_field(adapter: &QueryAdapter) -> FieldProperties {
    let mut key = FieldProperties::of(adapter.exact_field_type());
    key.index = Some(adapter.index_property());
    let mut properties = FieldProperties::of(adapter.exact_field_type());
    properties.fields = Some(BTreeMap::from([("key", key)]));
    properties
}

/// Get the index settings for the configured shard layout.
///
/// The configuration includes:
/// - **custom_with_char_filter**: analyzer for full-text fields that splits on `_` and `.`
/// - shard, replica and result window limits from [`ElasticConfig`]
/// - the stored-fields codec, when it is not the engine default
pub fn get_index_settings(config: &ElasticConfig) -> Value {
    let mut settings = json!({
        "analysis": {
            "analyzer": {
                FULL_TEXT_ANALYZER: {
                    "tokenizer": "standard",
                    "char_filter": [CHAR_FILTER],
                    "filter": ["lowercase"]
                }
            },
            "char_filter": {
                CHAR_FILTER: {
                    "type": "mapping",
                    "mappings": ["_=>\\u0020", ".=>\\u0020"]
                }
            }
        },
        "number_of_shards": config.number_of_shards,
        "number_of_replicas": config.number_of_replicas,
        "max_result_window": config.max_result_window
    });
    if config.codec != "default" {
        settings["codec"] = json!(config.codec);
    }
    settings
}

/// Body of the index creation request: settings plus mappings.
pub fn index_creation_body(
    config: &ElasticConfig,
    schema: &Schema,
    adapter: &QueryAdapter,
) -> Result<Value, IndexError> {
    let mapping = create_mapping(schema, adapter)?;
    let mappings = serde_json::to_value(&mapping)
        .map_err(|e| IndexError::config(format!("Failed to serialize mapping: {}", e)))?;
    Ok(json!({
        "settings": get_index_settings(config),
        "mappings": mappings
    }))
}
