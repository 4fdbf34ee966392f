//! Interface definitions for the index client.
//!
//! This module defines the traits at the client's seams: the transport that
//! carries requests to the engine, and the per-entity binding that knows how
//! to turn values into documents and back.

mod entity_binding;
mod search_transport;

pub use entity_binding::EntityBinding;
pub use search_transport::SearchTransport;
