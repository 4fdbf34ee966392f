//! Search transport trait definition.
//!
//! This module defines the abstract interface used to exchange requests with
//! the search engine, allowing the index client to run over the `opensearch`
//! crate in production and over an in-memory fake in tests.

use async_trait::async_trait;

use crate::errors::TransportError;
use crate::types::{EngineRequest, EngineResponse};

/// Abstract interface for sending requests to the search engine.
///
/// Connection setup, TLS, authentication and HTTP-level retries all live
/// behind this trait. Implementations return `Ok` for every response the
/// engine sends back, whatever its status; interpreting the status is the
/// caller's job.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` so one transport can serve
/// concurrent reads and writes, and so background tasks such as point-in-time
/// cleanup can hold a shared handle.
#[async_trait]
pub trait SearchTransport: Send + Sync {
    /// Send a request and return the engine's response.
    ///
    /// # Returns
    ///
    /// * `Ok(EngineResponse)` - The engine answered, successfully or not
    /// * `Err(TransportError)` - The engine could not be reached
    async fn perform(&self, request: EngineRequest) -> Result<EngineResponse, TransportError>;
}
