//! Search index client implementation.
//!
//! This module provides the main client for interacting with one index.
//! Application code uses it to write entities, delete them, rebuild the index
//! and run paged queries.

use std::fmt::Display;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{ElasticConfig, RefreshPolicy};
use crate::errors::IndexError;
use crate::interfaces::{EntityBinding, SearchTransport};
use crate::opensearch::bulk::{encode_document, BulkRequest};
use crate::opensearch::index_config::index_creation_body;
use crate::opensearch::pagination::{QuerySource, ReadSettings};
use crate::opensearch::queries::build_query;
use crate::opensearch::version::{EngineVersion, QueryAdapter};
use crate::types::{BulkResponse, EngineRequest, HttpMethod};
use search_index_shared::{FieldBundle, Predicate, QueryOptions, Schema};

/// Client for one versioned index holding entities of type `V` keyed by `K`.
///
/// The index name, refresh policy and point-in-time support are fixed at
/// construction. All per-query state lives in the [`QuerySource`] of that
/// query, so one client can serve concurrent callers.
pub struct IndexClient<K, V> {
    transport: Arc<dyn SearchTransport>,
    binding: Arc<dyn EntityBinding<K, V>>,
    schema: Arc<Schema>,
    config: ElasticConfig,
    adapter: QueryAdapter,
    index_name: String,
    refresh: RefreshPolicy,
    supports_pit: bool,
    read_settings: ReadSettings,
}

impl<K, V> IndexClient<K, V>
where
    K: Display,
{
    /// Create a client for an engine of a known version.
    pub fn new(
        config: &ElasticConfig,
        transport: Arc<dyn SearchTransport>,
        version: &EngineVersion,
        schema: Arc<Schema>,
        binding: Arc<dyn EntityBinding<K, V>>,
    ) -> Self {
        let index_name = config.index_name(binding.base_name(), schema.version());
        let adapter = version.adapter();
        let supports_pit = version.supports_point_in_time();
        if config.enable_pit && !supports_pit {
            warn!(
                index = %index_name,
                version = %version,
                "Point in time requested but not supported by the engine, using offset queries"
            );
        }
        let read_settings = ReadSettings::new(config, supports_pit, adapter.raw_fields_key());

        info!(
            index = %index_name,
            version = %version,
            point_in_time = read_settings.point_in_time.is_some(),
            "Created index client"
        );

        Self {
            transport,
            binding,
            schema,
            config: config.clone(),
            adapter,
            index_name,
            refresh: config.refresh,
            supports_pit,
            read_settings,
        }
    }

    /// Create a client, asking the engine for its version first.
    pub async fn connect(
        config: &ElasticConfig,
        transport: Arc<dyn SearchTransport>,
        schema: Arc<Schema>,
        binding: Arc<dyn EntityBinding<K, V>>,
    ) -> Result<Self, IndexError> {
        let version = EngineVersion::discover(transport.as_ref()).await?;
        Ok(Self::new(config, transport, &version, schema, binding))
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Whether the engine supports point-in-time searches.
    pub fn supports_point_in_time(&self) -> bool {
        self.supports_pit
    }

    /// Index `value`, replacing any document stored under its key.
    ///
    /// # Errors
    ///
    /// `IndexError::StorageError` naming the key, index and status when the
    /// engine rejects the write, either by status or by its `errors` flag.
    #[instrument(skip(self, value), fields(index = %self.index_name))]
    pub async fn replace(&self, value: &V) -> Result<(), IndexError> {
        let id = self.binding.key(value).to_string();
        let document = encode_document(&self.binding.to_document(value), &self.schema)?;
        let request = BulkRequest::new(&self.index_name).index(&id, document);
        self.bulk(request, "write", &id).await?;
        debug!(id = %id, "Document replaced");
        Ok(())
    }

    /// Index a new `value`. Same as [`IndexClient::replace`].
    pub async fn insert(&self, value: &V) -> Result<(), IndexError> {
        self.replace(value).await
    }

    /// Delete the document stored under `key`. Deleting a missing document
    /// succeeds.
    #[instrument(skip(self, key), fields(index = %self.index_name, id = %key))]
    pub async fn delete(&self, key: &K) -> Result<(), IndexError> {
        let id = key.to_string();
        let request = BulkRequest::new(&self.index_name).delete(&id);
        self.bulk(request, "delete", &id).await?;
        debug!(id = %id, "Document deleted");
        Ok(())
    }

    async fn bulk(&self, request: BulkRequest, action: &str, id: &str) -> Result<(), IndexError> {
        let request = EngineRequest::new(HttpMethod::Post, format!("/{}/_bulk", self.index_name))
            .param("refresh", self.refresh.as_param())
            .ndjson(request.encode());
        let response = self.transport.perform(request).await?;

        if !response.is_success() {
            error!(id = %id, status = %response.status_line(), body = %response.body, "Bulk request failed");
            return Err(IndexError::storage(format!(
                "Failed to {} {} in index {}: {}",
                action,
                id,
                self.index_name,
                response.status_line()
            )));
        }
        let parsed: BulkResponse = response.json().map_err(|e| {
            error!(id = %id, error = %e, "Unreadable bulk response");
            IndexError::storage(format!(
                "Failed to {} {} in index {}: {} ({})",
                action,
                id,
                self.index_name,
                response.status_line(),
                e
            ))
        })?;
        if parsed.errors {
            let reason = parsed.first_error().unwrap_or_else(|| "unknown error".to_string());
            error!(id = %id, reason = %reason, "Bulk request reported errors");
            return Err(IndexError::storage(format!(
                "Failed to {} {} in index {}: {} ({})",
                action,
                id,
                self.index_name,
                response.status_line(),
                reason
            )));
        }
        Ok(())
    }

    /// Delete every document matching `predicate`.
    #[instrument(skip(self, predicate), fields(index = %self.index_name, predicate = %predicate))]
    pub async fn delete_by_query(&self, predicate: &Predicate) -> Result<(), IndexError> {
        let query = build_query(predicate, &self.schema)?;
        let request =
            EngineRequest::new(HttpMethod::Post, format!("/{}/_delete_by_query", self.index_name))
                .param("refresh", self.refresh.as_param())
                .json(json!({ "query": query }));
        let response = self.transport.perform(request).await?;
        if !response.is_success() {
            error!(status = %response.status_line(), "Delete by query failed");
            return Err(IndexError::storage(format!(
                "Failed to delete documents matching {} from index {}: {}",
                predicate,
                self.index_name,
                response.status_line()
            )));
        }
        debug!("Deleted documents by query");
        Ok(())
    }

    /// Drop the index if it exists and create it empty with the current
    /// mapping and settings.
    ///
    /// # Errors
    ///
    /// `IndexError::LifecycleError` labeled `exists`, `delete` or `create` by
    /// the step that failed.
    #[instrument(skip(self), fields(index = %self.index_name))]
    pub async fn delete_all(&self) -> Result<(), IndexError> {
        if self.index_exists().await? {
            let request = EngineRequest::new(HttpMethod::Delete, format!("/{}", self.index_name));
            let response = self.transport.perform(request).await?;
            if !response.is_success() {
                return Err(IndexError::lifecycle(
                    "delete",
                    format!(
                        "Failed to delete index {}: {}",
                        self.index_name,
                        response.status_line()
                    ),
                ));
            }
            info!("Deleted index");
        }
        self.create_index().await
    }

    /// Create the index unless it already exists. Returns whether it was
    /// created.
    #[instrument(skip(self), fields(index = %self.index_name))]
    pub async fn ensure_index(&self) -> Result<bool, IndexError> {
        if self.index_exists().await? {
            return Ok(false);
        }
        self.create_index().await?;
        Ok(true)
    }

    async fn index_exists(&self) -> Result<bool, IndexError> {
        let mut request = EngineRequest::new(HttpMethod::Head, format!("/{}", self.index_name));
        for (key, value) in self.adapter.indices_exist_params() {
            request = request.param(*key, *value);
        }
        let response = self.transport.perform(request).await?;
        match response.status {
            200 => Ok(true),
            404 => Ok(false),
            _ => Err(IndexError::lifecycle(
                "exists",
                format!(
                    "Failed to check existence of index {}: {}",
                    self.index_name,
                    response.status_line()
                ),
            )),
        }
    }

    async fn create_index(&self) -> Result<(), IndexError> {
        let body = index_creation_body(&self.config, &self.schema, &self.adapter)?;
        let request = EngineRequest::new(HttpMethod::Put, format!("/{}", self.index_name)).json(body);
        let response = self.transport.perform(request).await?;
        if !response.is_success() {
            return Err(IndexError::lifecycle(
                "create",
                format!(
                    "Failed to create index {}: {}",
                    self.index_name,
                    response.status_line()
                ),
            ));
        }
        info!(schema_version = self.schema.version(), "Created index");
        Ok(())
    }

    /// Prepare a query for reading.
    ///
    /// The binding may adjust the options first. Nothing is sent until the
    /// returned source is read.
    ///
    /// # Errors
    ///
    /// `IndexError::QueryParseError` for a predicate the schema cannot
    /// express, `IndexError::ConfigurationError` for a requested field that is
    /// not in the schema.
    pub fn get_source(
        &self,
        predicate: &Predicate,
        opts: QueryOptions,
    ) -> Result<QuerySource<K, V>, IndexError> {
        let opts = self.binding.filter_options(opts);
        if let Some(unknown) = opts.fields.iter().find(|f| !self.schema.has_field(f)) {
            return Err(IndexError::config(format!(
                "Requested field {} is not part of index {}",
                unknown, self.index_name
            )));
        }
        let query = build_query(predicate, &self.schema)?;
        Ok(QuerySource::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.binding),
            Arc::clone(&self.schema),
            self.read_settings.clone(),
            self.index_name.clone(),
            query,
            opts,
        ))
    }

    /// Read the entities matching `predicate`, in the binding's sort order.
    #[instrument(skip(self, predicate, opts), fields(index = %self.index_name, predicate = %predicate, limit = opts.limit))]
    pub async fn read(&self, predicate: &Predicate, opts: QueryOptions) -> Result<Vec<V>, IndexError> {
        self.get_source(predicate, opts)?.read().await
    }

    /// Read the raw field values of the documents matching `predicate`.
    #[instrument(skip(self, predicate, opts), fields(index = %self.index_name, predicate = %predicate, limit = opts.limit))]
    pub async fn read_raw(
        &self,
        predicate: &Predicate,
        opts: QueryOptions,
    ) -> Result<Vec<FieldBundle>, IndexError> {
        self.get_source(predicate, opts)?.read_raw().await
    }
}
