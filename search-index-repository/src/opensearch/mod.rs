//! Engine-facing implementation of the index client.
//!
//! This module holds everything that knows the Elasticsearch-compatible wire
//! format: mappings, the query DSL, bulk encoding, paged reads, version
//! detection and the `opensearch`-backed transport.

pub mod bulk;
mod client;
pub mod index_config;
pub mod pagination;
pub mod queries;
pub mod version;

pub use client::OpenSearchTransport;
pub use pagination::{page_sizes, PageSizes, PointInTime, QuerySource, ReadSettings};
pub use version::{EngineFamily, EngineVersion, QueryAdapter};
