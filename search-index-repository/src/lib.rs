//! # Search Index Repository
//!
//! This crate provides the index client for Elasticsearch-compatible search
//! engines. It translates schemas into mappings and predicates into the query
//! DSL, writes documents through the bulk API, and reads results page by page,
//! using point-in-time snapshots where the engine supports them.

pub mod client;
pub mod config;
pub mod errors;
pub mod interfaces;
pub mod opensearch;
pub mod types;

#[cfg(test)]
mod testing;

pub use client::IndexClient;
pub use config::{ElasticConfig, RefreshPolicy};
pub use errors::{IndexError, TransportError};
pub use interfaces::{EntityBinding, SearchTransport};
pub use opensearch::{EngineVersion, OpenSearchTransport, QuerySource};
