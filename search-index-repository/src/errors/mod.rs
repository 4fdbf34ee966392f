//! Error types for the search index repository.

mod index_error;
mod transport_error;

pub use index_error::IndexError;
pub use transport_error::TransportError;
