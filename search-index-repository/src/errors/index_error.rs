//! Index client error types.
//!
//! This module defines the uniform failure type returned by every index client
//! operation.

use thiserror::Error;

use super::TransportError;
use search_index_shared::FieldType;

/// Errors that can occur during index operations.
#[derive(Error, Debug, Clone)]
pub enum IndexError {
    /// Invalid configuration, schema, document or query options. Never retried.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// A schema field has a type the mapping cannot express.
    #[error("Unsupported field type: {0}")]
    UnsupportedFieldType(String),

    /// A predicate cannot be translated against the schema.
    #[error("Query parse error: {0}")]
    QueryParseError(String),

    /// A write was rejected by the engine.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// A step of index deletion or creation failed.
    #[error("Index lifecycle error ({step}): {message}")]
    LifecycleError { step: &'static str, message: String },

    /// The engine runs a version this client cannot talk to.
    #[error("Unsupported version: [{version}]. Supported versions: {supported}")]
    UnsupportedVersion { version: String, supported: String },

    /// A hit or field value returned by the engine is malformed.
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// The engine could not be reached.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl IndexError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigurationError(msg.into())
    }

    /// Create an unsupported field type error.
    pub fn unsupported_field_type(field_type: FieldType) -> Self {
        Self::UnsupportedFieldType(field_type.name().to_string())
    }

    /// Create a query parse error.
    pub fn query_parse(msg: impl Into<String>) -> Self {
        Self::QueryParseError(msg.into())
    }

    /// Create a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageError(msg.into())
    }

    /// Create a lifecycle error for the named step.
    pub fn lifecycle(step: &'static str, msg: impl Into<String>) -> Self {
        Self::LifecycleError {
            step,
            message: msg.into(),
        }
    }

    /// Create a decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::DecodeError(msg.into())
    }
}
