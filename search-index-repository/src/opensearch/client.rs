//! OpenSearch transport implementation.
//!
//! This module provides the concrete implementation of `SearchTransport`
//! using the OpenSearch Rust client, which speaks the Elasticsearch-compatible
//! REST API.

use async_trait::async_trait;
use opensearch::{
    auth::Credentials,
    http::{
        headers::{HeaderMap, HeaderValue, CONTENT_TYPE},
        transport::{SingleNodeConnectionPool, TransportBuilder},
        Method,
    },
    OpenSearch,
};
use tracing::{debug, info, instrument};

use crate::config::ElasticConfig;
use crate::errors::{IndexError, TransportError};
use crate::interfaces::SearchTransport;
use crate::types::{EngineRequest, EngineResponse, HttpMethod};

/// Transport sending engine requests through an [`OpenSearch`] client.
///
/// # Example
///
/// ```ignore
/// let config = ElasticConfig::from_env()?;
/// let transport = Arc::new(OpenSearchTransport::new(&config)?);
/// let version = EngineVersion::discover(transport.as_ref()).await?;
/// ```
pub struct OpenSearchTransport {
    client: OpenSearch,
}

impl OpenSearchTransport {
    /// Create a transport for the first configured server.
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchTransport)` - A new transport instance
    /// * `Err(IndexError)` - If no server is configured or client setup fails
    pub fn new(config: &ElasticConfig) -> Result<Self, IndexError> {
        let url = config
            .servers
            .first()
            .cloned()
            .ok_or_else(|| IndexError::config("No valid Elasticsearch servers configured"))?;

        let conn_pool = SingleNodeConnectionPool::new(url.clone());
        let mut builder = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .timeout(config.connect_timeout + config.socket_timeout);
        if let Some((user, password)) = config.credentials() {
            builder = builder.auth(Credentials::Basic(user.to_string(), password.to_string()));
        }
        let transport = builder
            .build()
            .map_err(|e| TransportError::connection(e.to_string()))?;

        info!(url = %url, "Created OpenSearch transport");

        Ok(Self {
            client: OpenSearch::new(transport),
        })
    }

    fn method(method: HttpMethod) -> Method {
        match method {
            HttpMethod::Get => Method::Get,
            HttpMethod::Head => Method::Head,
            HttpMethod::Post => Method::Post,
            HttpMethod::Put => Method::Put,
            HttpMethod::Delete => Method::Delete,
        }
    }
}

#[async_trait]
impl SearchTransport for OpenSearchTransport {
    #[instrument(skip(self, request), fields(method = request.method.as_str(), path = %request.path))]
    async fn perform(&self, request: EngineRequest) -> Result<EngineResponse, TransportError> {
        let mut headers = HeaderMap::new();
        if let Some(body) = &request.body {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(body.content_type()));
        }
        let query = (!request.params.is_empty()).then_some(request.params.as_slice());
        let body = request.body.as_ref().map(|b| b.to_text());

        let response = self
            .client
            .send(
                Self::method(request.method),
                &request.path,
                headers,
                query,
                body,
                None,
            )
            .await?;

        let status = response.status_code();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::response(e.to_string()))?;
        debug!(status = status.as_u16(), "Received response");

        Ok(EngineResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().map(str::to_string),
            body: text,
        })
    }
}
