//! Request and response types exchanged with the search engine.
//!
//! Requests are described by [`EngineRequest`] so that any transport can carry
//! them. Response bodies are parsed into the small serde structs below, which
//! only model the parts of the engine's answers this client consumes.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::errors::IndexError;

/// HTTP method of an engine request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

/// Body of an engine request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// A single JSON document.
    Json(Value),
    /// Newline-delimited JSON, as used by the bulk API.
    NdJson(String),
}

impl RequestBody {
    /// Serialized body text.
    pub fn to_text(&self) -> String {
        match self {
            Self::Json(value) => value.to_string(),
            Self::NdJson(text) => text.clone(),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json(_) => "application/json",
            Self::NdJson(_) => "application/x-ndjson",
        }
    }
}

/// A single request to the search engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineRequest {
    pub method: HttpMethod,
    /// Absolute path, always starting with `/`.
    pub path: String,
    /// Query string parameters.
    pub params: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl EngineRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        let path = path.into();
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        };
        Self {
            method,
            path,
            params: Vec::new(),
            body: None,
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn ndjson(mut self, body: impl Into<String>) -> Self {
        self.body = Some(RequestBody::NdJson(body.into()));
        self
    }

    /// Value of the first query parameter named `key`.
    pub fn param_value(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Status and body of an engine response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineResponse {
    pub status: u16,
    /// Reason phrase of the status, when known.
    pub reason: Option<String>,
    pub body: String,
}

impl EngineResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            reason: None,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Reason phrase if known, otherwise the numeric status.
    pub fn status_line(&self) -> String {
        match &self.reason {
            Some(reason) => format!("{} {}", self.status, reason),
            None => self.status.to_string(),
        }
    }

    /// Parse the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, IndexError> {
        serde_json::from_str(&self.body).map_err(|e| {
            IndexError::decode(format!(
                "Invalid response body (status {}): {}",
                self.status, e
            ))
        })
    }
}

/// Body of a `_search` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    /// Refreshed point-in-time id, present on point-in-time searches.
    #[serde(default)]
    pub pit_id: Option<String>,
    #[serde(default)]
    pub hits: Option<HitsEnvelope>,
}

impl SearchResponse {
    /// Consume the response, returning its hits.
    pub fn into_hits(self) -> Vec<Hit> {
        self.hits.map(|h| h.hits).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HitsEnvelope {
    #[serde(default)]
    pub hits: Vec<Hit>,
}

/// A single search hit.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Hit {
    #[serde(rename = "_source", default)]
    pub source: Option<Map<String, Value>>,
    #[serde(default)]
    pub fields: Option<Map<String, Value>>,
    /// Sort-key values of this hit, used as the next `search_after` cursor.
    #[serde(default)]
    pub sort: Vec<Value>,
}

impl Hit {
    /// Field values of the hit, read from `raw_fields_key` and falling back to
    /// the other representation when absent.
    pub fn raw_fields(&self, raw_fields_key: &str) -> Option<&Map<String, Value>> {
        let (preferred, fallback) = if raw_fields_key == "fields" {
            (&self.fields, &self.source)
        } else {
            (&self.source, &self.fields)
        };
        preferred.as_ref().or(fallback.as_ref())
    }
}

/// Body of a `_bulk` response.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkResponse {
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<Value>,
}

impl BulkResponse {
    /// First error reason reported by an item, if any.
    pub fn first_error(&self) -> Option<String> {
        self.items.iter().find_map(|item| {
            item.as_object()?
                .values()
                .find_map(|action| action.get("error"))
                .map(|error| match error.get("reason").and_then(Value::as_str) {
                    Some(reason) => reason.to_string(),
                    None => error.to_string(),
                })
        })
    }
}

/// Body of a `_pit` creation response.
#[derive(Debug, Clone, Deserialize)]
pub struct PitResponse {
    #[serde(default)]
    pub id: Option<String>,
}

/// Body of the engine's root endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RootInfo {
    pub version: VersionInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionInfo {
    pub number: String,
}
