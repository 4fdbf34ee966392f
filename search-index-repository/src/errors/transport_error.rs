//! Transport error types.
//!
//! This module defines the errors a [`SearchTransport`](crate::interfaces::SearchTransport)
//! can return. They describe failures to talk to the engine at all, as opposed
//! to the engine answering with a non-success status.

use thiserror::Error;

/// Errors that can occur while exchanging a request with the search engine.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Failed to establish connection to the search engine.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The request could not be sent or timed out.
    #[error("Request error: {0}")]
    RequestError(String),

    /// The response body could not be read.
    #[error("Response error: {0}")]
    ResponseError(String),
}

impl TransportError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create a request error.
    pub fn request(msg: impl Into<String>) -> Self {
        Self::RequestError(msg.into())
    }

    /// Create a response error.
    pub fn response(msg: impl Into<String>) -> Self {
        Self::ResponseError(msg.into())
    }
}

impl From<opensearch::Error> for TransportError {
    fn from(err: opensearch::Error) -> Self {
        Self::RequestError(err.to_string())
    }
}
