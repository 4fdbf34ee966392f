//! Paged reads.
//!
//! A [`QuerySource`] runs one logical query as one or more physical search
//! requests. With point-in-time searches available it pages through a
//! snapshot using `search_after` cursors and growing page sizes; otherwise it
//! issues a single `from`/`size` request.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::runtime::Handle;
use tracing::{debug, error, warn};

use crate::config::ElasticConfig;
use crate::errors::IndexError;
use crate::interfaces::{EntityBinding, SearchTransport};
use crate::opensearch::bulk::decode_document;
use crate::types::{EngineRequest, HttpMethod, Hit, PitResponse, SearchResponse};
use search_index_shared::{Document, FieldBundle, QueryOptions, Schema, SortField};

/// Growth factor between consecutive point-in-time pages.
pub const PAGE_SIZE_MULTIPLIER: usize = 10;

/// Largest single point-in-time page.
pub const MAX_PAGE_SIZE: usize = 30_000;

/// Sizes of the physical pages used to read `limit` documents.
///
/// Pages grow by `multiplier` up to `cap`; the last page is clipped so the
/// sizes never add up to more than `limit`. Sizes are produced on demand, so
/// an unbounded `limit` such as `usize::MAX` only costs the pages actually
/// requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSizes {
    next: usize,
    total: usize,
    limit: usize,
    multiplier: usize,
    cap: usize,
}

impl Iterator for PageSizes {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let size = self.next;
        if size == 0 {
            return None;
        }
        self.total += size;
        let remaining = self.limit - self.total;
        self.next = size
            .saturating_mul(self.multiplier)
            .min(self.cap)
            .min(remaining);
        Some(size)
    }
}

pub fn page_size_sequence(initial: usize, limit: usize, multiplier: usize, cap: usize) -> PageSizes {
    PageSizes {
        next: initial.min(limit),
        total: 0,
        limit,
        multiplier,
        cap,
    }
}

/// [`page_size_sequence`] with the default growth factor and cap.
pub fn page_sizes(initial: usize, limit: usize) -> PageSizes {
    page_size_sequence(initial, limit, PAGE_SIZE_MULTIPLIER, MAX_PAGE_SIZE)
}

/// Read behavior fixed when the index client is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadSettings {
    /// Point-in-time paging, when enabled and supported by the engine.
    pub point_in_time: Option<PitSettings>,
    pub max_result_window: usize,
    /// Key of a hit holding its field values.
    pub raw_fields_key: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PitSettings {
    pub keep_alive: String,
    pub page_size: usize,
}

impl ReadSettings {
    pub fn new(config: &ElasticConfig, supports_pit: bool, raw_fields_key: &'static str) -> Self {
        let point_in_time = (config.enable_pit && supports_pit).then(|| PitSettings {
            keep_alive: config.pit_keep_alive_param(),
            page_size: config.pit_page_size,
        });
        Self {
            point_in_time,
            max_result_window: config.max_result_window,
            raw_fields_key,
        }
    }
}

/// An open point-in-time handle.
///
/// Dropping the handle schedules its deletion on the current runtime, so the
/// snapshot is released however the read ends.
pub struct PointInTime {
    transport: Arc<dyn SearchTransport>,
    id: String,
    keep_alive: String,
}

impl PointInTime {
    /// Open a point in time on `index`.
    pub async fn open(
        transport: Arc<dyn SearchTransport>,
        index: &str,
        keep_alive: &str,
    ) -> Result<Self, IndexError> {
        let request = EngineRequest::new(HttpMethod::Post, format!("/{}/_pit", index))
            .param("keep_alive", keep_alive);
        let response = transport.perform(request).await?;
        if !response.is_success() {
            return Err(IndexError::lifecycle(
                "open point in time",
                format!("Failed to create point in time on {}: {}", index, response.status_line()),
            ));
        }
        let id = response.json::<PitResponse>()?.id.ok_or_else(|| {
            IndexError::decode(format!("Point in time response for {} has no id", index))
        })?;
        debug!(index = %index, "Opened point in time");
        Ok(Self {
            transport,
            id,
            keep_alive: keep_alive.to_string(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Replace the id with the one returned by the latest search.
    pub fn refresh(&mut self, id: String) {
        self.id = id;
    }

    fn search_clause(&self) -> Value {
        json!({ "id": self.id, "keep_alive": self.keep_alive })
    }
}

impl Drop for PointInTime {
    fn drop(&mut self) {
        let id = std::mem::take(&mut self.id);
        let transport = Arc::clone(&self.transport);
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(close_point_in_time(transport, id));
            }
            Err(_) => warn!("No runtime to close point in time, it expires after its keep-alive"),
        }
    }
}

async fn close_point_in_time(transport: Arc<dyn SearchTransport>, id: String) {
    let request = EngineRequest::new(HttpMethod::Delete, "/_pit").json(json!({ "id": id }));
    match transport.perform(request).await {
        Ok(response) if response.is_success() => debug!("Closed point in time"),
        Ok(response) => error!(status = %response.status_line(), "Failed to close point in time"),
        Err(e) => error!(error = %e, "Failed to close point in time"),
    }
}

fn sort_clause(sort: &[SortField]) -> Value {
    let clauses: Vec<Value> = sort
        .iter()
        .map(|s| {
            let mut spec = json!({ "order": s.order.as_str() });
            if let Some(unmapped) = &s.unmapped_type {
                spec["unmapped_type"] = json!(unmapped);
            }
            let mut clause = Map::new();
            clause.insert(s.field.clone(), spec);
            Value::Object(clause)
        })
        .collect();
    Value::Array(clauses)
}

/// A query ready to be read, as typed values or as raw field bundles.
pub struct QuerySource<K, V> {
    transport: Arc<dyn SearchTransport>,
    binding: Arc<dyn EntityBinding<K, V>>,
    schema: Arc<Schema>,
    settings: ReadSettings,
    index: String,
    query: Value,
    opts: QueryOptions,
}

impl<K, V> QuerySource<K, V> {
    pub(crate) fn new(
        transport: Arc<dyn SearchTransport>,
        binding: Arc<dyn EntityBinding<K, V>>,
        schema: Arc<Schema>,
        settings: ReadSettings,
        index: String,
        query: Value,
        opts: QueryOptions,
    ) -> Self {
        Self {
            transport,
            binding,
            schema,
            settings,
            index,
            query,
            opts,
        }
    }

    pub fn options(&self) -> &QueryOptions {
        &self.opts
    }

    /// Read matching entities. Hits the binding cannot resolve are skipped.
    pub async fn read(&self) -> Result<Vec<V>, IndexError> {
        let fields = &self.opts.fields;
        let binding = &self.binding;
        self.read_with(|doc| binding.from_document(&doc, fields)).await
    }

    /// Read matching documents as raw field bundles.
    pub async fn read_raw(&self) -> Result<Vec<FieldBundle>, IndexError> {
        self.read_with(|doc| Some(FieldBundle::from(doc))).await
    }

    async fn read_with<T, F>(&self, mut decode: F) -> Result<Vec<T>, IndexError>
    where
        F: FnMut(Document) -> Option<T>,
    {
        if self.opts.limit == 0 {
            return Ok(Vec::new());
        }
        let sort = sort_clause(&self.binding.sort_order());

        if let Some(pit) = &self.settings.point_in_time {
            if self.opts.start == 0 {
                match PointInTime::open(Arc::clone(&self.transport), &self.index, &pit.keep_alive)
                    .await
                {
                    Ok(handle) => {
                        return self
                            .read_point_in_time(handle, pit.page_size, &sort, &mut decode)
                            .await
                    }
                    Err(e) => error!(
                        index = %self.index,
                        error = %e,
                        "Point in time unavailable, falling back to a single search"
                    ),
                }
            } else {
                debug!(index = %self.index, start = self.opts.start, "Offset query, not using point in time");
            }
        }
        self.read_offset(&sort, &mut decode).await
    }

    async fn read_point_in_time<T, F>(
        &self,
        mut pit: PointInTime,
        page_size: usize,
        sort: &Value,
        decode: &mut F,
    ) -> Result<Vec<T>, IndexError>
    where
        F: FnMut(Document) -> Option<T>,
    {
        let mut results = Vec::new();
        let mut search_after: Option<Vec<Value>> = None;

        for (page, size) in page_sizes(page_size, self.opts.limit).enumerate() {
            let mut body = self.search_body(sort, size.saturating_add(1));
            body["pit"] = pit.search_clause();
            if let Some(after) = &search_after {
                body["search_after"] = json!(after);
            }
            debug!(index = %self.index, page, size, "Searching point in time page");

            let response = self
                .transport
                .perform(EngineRequest::new(HttpMethod::Post, "/_search").json(body))
                .await?;
            if !response.is_success() {
                error!(
                    index = %self.index,
                    page,
                    status = %response.status_line(),
                    "Search page failed, returning partial results"
                );
                break;
            }

            let parsed: SearchResponse = response.json()?;
            if let Some(id) = parsed.pit_id.clone() {
                pit.refresh(id);
            }
            let mut hits = parsed.into_hits();
            if hits.is_empty() {
                break;
            }
            let exhausted = hits.len() <= size;
            hits.truncate(size);
            if let Some(after) = hits.last().map(|hit| &hit.sort).filter(|s| !s.is_empty()) {
                search_after = Some(after.clone());
            }
            self.decode_hits(hits, decode, &mut results)?;
            if exhausted {
                break;
            }
        }
        Ok(results)
    }

    async fn read_offset<T, F>(&self, sort: &Value, decode: &mut F) -> Result<Vec<T>, IndexError>
    where
        F: FnMut(Document) -> Option<T>,
    {
        let start = self.opts.start;
        let window = self.settings.max_result_window.saturating_sub(start);
        let mut size = self.opts.limit;
        if size > window {
            warn!(
                index = %self.index,
                start,
                limit = size,
                max_result_window = self.settings.max_result_window,
                "Query exceeds the result window, clamping"
            );
            size = window;
        }
        if size == 0 {
            return Ok(Vec::new());
        }

        let mut body = self.search_body(sort, size);
        body["from"] = json!(start);
        debug!(index = %self.index, start, size, "Searching");

        let request =
            EngineRequest::new(HttpMethod::Post, format!("/{}/_search", self.index)).json(body);
        let response = self.transport.perform(request).await?;
        if !response.is_success() {
            error!(
                index = %self.index,
                status = %response.status_line(),
                "Search failed, returning no results"
            );
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        let hits = response.json::<SearchResponse>()?.into_hits();
        self.decode_hits(hits, decode, &mut results)?;
        Ok(results)
    }

    fn search_body(&self, sort: &Value, size: usize) -> Value {
        let mut body = json!({
            "query": self.query,
            "size": size,
            "sort": sort,
            "track_total_hits": false
        });
        if !self.opts.fields.is_empty() {
            body["_source"] = json!(self.opts.fields);
        }
        body
    }

    fn decode_hits<T, F>(
        &self,
        hits: Vec<Hit>,
        decode: &mut F,
        results: &mut Vec<T>,
    ) -> Result<(), IndexError>
    where
        F: FnMut(Document) -> Option<T>,
    {
        for hit in hits {
            let document = match hit.raw_fields(self.settings.raw_fields_key) {
                Some(raw) => decode_document(raw, &self.schema)?,
                None => Document::new(),
            };
            if let Some(value) = decode(document) {
                results.push(value);
            }
        }
        Ok(())
    }
}
