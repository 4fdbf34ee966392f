//! # Search Index Shared
//!
//! Engine-agnostic types shared by the search index client: field schemas,
//! typed documents, query predicates and query options.

pub mod document;
pub mod predicate;
pub mod query;
pub mod schema;

pub use document::{Document, FieldBundle, FieldValue};
pub use predicate::{Condition, Predicate};
pub use query::{QueryOptions, SortField, SortOrder};
pub use schema::{FieldDef, FieldType, Schema, SchemaBuilder, SchemaError};
