//! In-memory engine and fixtures shared by the unit tests.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;

use crate::config::{ElasticConfig, RefreshPolicy};
use crate::errors::TransportError;
use crate::interfaces::{EntityBinding, SearchTransport};
use crate::types::{EngineRequest, EngineResponse, HttpMethod, RequestBody};
use search_index_shared::{Document, FieldDef, QueryOptions, Schema, SortField};

type Source = Map<String, Value>;

#[derive(Default)]
struct StoredIndex {
    definition: Option<Value>,
    docs: BTreeMap<String, Source>,
}

#[derive(Default)]
struct EngineState {
    version: String,
    indices: BTreeMap<String, StoredIndex>,
    pits: HashMap<u64, Arc<BTreeMap<String, Source>>>,
    pit_aliases: HashMap<String, u64>,
    next_pit: u64,
    requests: Vec<EngineRequest>,
    failures: Vec<(HttpMethod, String, u16, Option<String>)>,
    searches_before_failure: Option<usize>,
    reject_bulk: bool,
    omit_sort: bool,
    disconnected: bool,
}

/// In-memory stand-in for the search engine.
///
/// Understands the subset of the REST API the index client uses, keeps a
/// snapshot per point in time, and records every request it receives.
pub struct FakeEngine {
    state: Mutex<EngineState>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::with_version("7.17.0")
    }

    pub fn with_version(version: &str) -> Self {
        Self {
            state: Mutex::new(EngineState {
                version: version.to_string(),
                ..Default::default()
            }),
        }
    }

    /// Answer every request matching `method` and ending in `path_suffix`
    /// with `status`.
    pub async fn fail(&self, method: HttpMethod, path_suffix: &str, status: u16) {
        self.state
            .lock()
            .await
            .failures
            .push((method, path_suffix.to_string(), status, None));
    }

    /// Answer every request matching `method` and ending in `path_suffix`
    /// with `status` and a verbatim `body`.
    pub async fn respond_with(&self, method: HttpMethod, path_suffix: &str, status: u16, body: &str) {
        self.state.lock().await.failures.push((
            method,
            path_suffix.to_string(),
            status,
            Some(body.to_string()),
        ));
    }

    /// Let `count` searches succeed, then answer searches with 500.
    pub async fn fail_searches_after(&self, count: usize) {
        self.state.lock().await.searches_before_failure = Some(count);
    }

    /// Answer bulk requests with 200 but a true `errors` flag.
    pub async fn reject_bulk(&self) {
        self.state.lock().await.reject_bulk = true;
    }

    /// Return hits without their `sort` values.
    pub async fn omit_sort(&self) {
        self.state.lock().await.omit_sort = true;
    }

    /// Fail every following request at the transport level.
    pub async fn disconnect(&self) {
        self.state.lock().await.disconnected = true;
    }

    pub async fn create_index(&self, index: &str) {
        self.state
            .lock()
            .await
            .indices
            .entry(index.to_string())
            .or_default();
    }

    pub async fn insert(&self, index: &str, id: &str, source: Value) {
        let source = source.as_object().cloned().unwrap_or_default();
        self.state
            .lock()
            .await
            .indices
            .entry(index.to_string())
            .or_default()
            .docs
            .insert(id.to_string(), source);
    }

    pub async fn source(&self, index: &str, id: &str) -> Option<Value> {
        let state = self.state.lock().await;
        let doc = state.indices.get(index)?.docs.get(id)?;
        Some(Value::Object(doc.clone()))
    }

    pub async fn doc_count(&self, index: &str) -> usize {
        let state = self.state.lock().await;
        state.indices.get(index).map_or(0, |i| i.docs.len())
    }

    pub async fn index_exists(&self, index: &str) -> bool {
        self.state.lock().await.indices.contains_key(index)
    }

    /// Body of the `PUT` that created `index`.
    pub async fn index_definition(&self, index: &str) -> Option<Value> {
        let state = self.state.lock().await;
        state.indices.get(index)?.definition.clone()
    }

    pub async fn open_pits(&self) -> usize {
        self.state.lock().await.pits.len()
    }

    pub async fn requests(&self) -> Vec<EngineRequest> {
        self.state.lock().await.requests.clone()
    }

    /// Recorded requests with `method` whose path ends in `path_suffix`.
    pub async fn requests_to(&self, method: HttpMethod, path_suffix: &str) -> Vec<EngineRequest> {
        self.requests()
            .await
            .into_iter()
            .filter(|r| r.method == method && r.path.ends_with(path_suffix))
            .collect()
    }

    pub async fn clear_requests(&self) {
        self.state.lock().await.requests.clear();
    }

    fn handle(state: &mut EngineState, request: &EngineRequest) -> EngineResponse {
        if let Some((_, _, status, body)) = state
            .failures
            .iter()
            .find(|(m, suffix, _, _)| *m == request.method && request.path.ends_with(suffix.as_str()))
        {
            return match body {
                Some(body) => EngineResponse::new(*status, body.clone()),
                None => error_response(*status, "injected failure"),
            };
        }

        let body = match &request.body {
            Some(RequestBody::Json(value)) => value.clone(),
            _ => Value::Null,
        };
        let segments: Vec<&str> = request
            .path
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        match (request.method, segments.as_slice()) {
            (HttpMethod::Get, []) => ok(json!({
                "name": "fake",
                "version": { "number": state.version, "distribution": "elasticsearch" }
            })),
            (HttpMethod::Delete, ["_pit"]) => state.delete_pit(&body),
            (HttpMethod::Post, ["_search"]) => state.search(None, &body),
            (HttpMethod::Post, [index, "_search"]) => state.search(Some(*index), &body),
            (HttpMethod::Post, [index, "_pit"]) => state.open_pit(index),
            (HttpMethod::Post, [index, "_bulk"]) => match &request.body {
                Some(RequestBody::NdJson(text)) => state.bulk(index, text),
                _ => error_response(400, "bulk body must be ndjson"),
            },
            (HttpMethod::Post, [index, "_delete_by_query"]) => state.delete_by_query(index, &body),
            (HttpMethod::Head, [index]) => {
                if state.indices.contains_key(*index) {
                    EngineResponse::new(200, "")
                } else {
                    EngineResponse::new(404, "")
                }
            }
            (HttpMethod::Delete, [index]) => match state.indices.remove(*index) {
                Some(_) => ok(json!({ "acknowledged": true })),
                None => error_response(404, "index_not_found_exception"),
            },
            (HttpMethod::Put, [index]) => {
                if state.indices.contains_key(*index) {
                    return error_response(400, "resource_already_exists_exception");
                }
                state.indices.insert(
                    index.to_string(),
                    StoredIndex {
                        definition: Some(body),
                        docs: BTreeMap::new(),
                    },
                );
                ok(json!({ "acknowledged": true, "index": index }))
            }
            _ => error_response(400, "unsupported request"),
        }
    }
}

impl EngineState {
    fn open_pit(&mut self, index: &str) -> EngineResponse {
        let Some(stored) = self.indices.get(index) else {
            return error_response(404, "index_not_found_exception");
        };
        let snapshot = Arc::new(stored.docs.clone());
        self.next_pit += 1;
        let key = self.next_pit;
        let id = format!("pit-{}", key);
        self.pits.insert(key, snapshot);
        self.pit_aliases.insert(id.clone(), key);
        ok(json!({ "id": id }))
    }

    fn delete_pit(&mut self, body: &Value) -> EngineResponse {
        let id = body.get("id").and_then(Value::as_str).unwrap_or_default();
        match self.pit_aliases.get(id).copied() {
            Some(key) if self.pits.remove(&key).is_some() => {
                self.pit_aliases.retain(|_, k| *k != key);
                ok(json!({ "succeeded": true, "num_freed": 1 }))
            }
            _ => error_response(404, "search_context_missing_exception"),
        }
    }

    fn search(&mut self, index: Option<&str>, body: &Value) -> EngineResponse {
        if let Some(remaining) = self.searches_before_failure.as_mut() {
            if *remaining == 0 {
                return error_response(500, "search failed");
            }
            *remaining -= 1;
        }

        let mut next_pit_id = None;
        let docs: Arc<BTreeMap<String, Source>> = match (index, body.get("pit")) {
            (None, Some(pit)) => {
                let id = pit.get("id").and_then(Value::as_str).unwrap_or_default();
                let Some(key) = self.pit_aliases.get(id).copied() else {
                    return error_response(404, "search_context_missing_exception");
                };
                let Some(snapshot) = self.pits.get(&key) else {
                    return error_response(404, "search_context_missing_exception");
                };
                let snapshot = Arc::clone(snapshot);
                self.next_pit += 1;
                let refreshed = format!("pit-{}-{}", key, self.next_pit);
                self.pit_aliases.insert(refreshed.clone(), key);
                next_pit_id = Some(refreshed);
                snapshot
            }
            (Some(index), None) => match self.indices.get(index) {
                Some(stored) => Arc::new(stored.docs.clone()),
                None => return error_response(404, "index_not_found_exception"),
            },
            _ => return error_response(400, "pit and index are mutually exclusive"),
        };

        let query = body.get("query").cloned().unwrap_or(json!({ "match_all": {} }));
        let sort: Vec<(String, bool)> = body
            .get("sort")
            .and_then(Value::as_array)
            .map(|clauses| clauses.iter().filter_map(sort_key).collect())
            .unwrap_or_default();

        let mut hits: Vec<(&String, &Source, Vec<Value>)> = docs
            .iter()
            .filter(|(_, source)| matches(&query, source))
            .map(|(id, source)| {
                let values = sort.iter().map(|(f, _)| first_value(source, f)).collect();
                (id, source, values)
            })
            .collect();
        hits.sort_by(|a, b| compare_keys(&a.2, &b.2, &sort));

        if let Some(after) = body.get("search_after").and_then(Value::as_array) {
            if after.is_empty() {
                return error_response(400, "search_after must not be empty");
            }
            hits.retain(|(_, _, values)| compare_keys(values, after, &sort) == Ordering::Greater);
        }

        let from = body.get("from").and_then(Value::as_u64).unwrap_or(0) as usize;
        let size = body.get("size").and_then(Value::as_u64).unwrap_or(10) as usize;
        let includes: Option<BTreeSet<&str>> = body
            .get("_source")
            .and_then(Value::as_array)
            .map(|fields| fields.iter().filter_map(Value::as_str).collect());

        let omit_sort = self.omit_sort;
        let hits: Vec<Value> = hits
            .into_iter()
            .skip(from)
            .take(size)
            .map(|(id, source, values)| {
                let source: Source = source
                    .iter()
                    .filter(|(k, _)| includes.as_ref().map_or(true, |inc| inc.contains(k.as_str())))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                if omit_sort {
                    json!({ "_id": id, "_source": source })
                } else {
                    json!({ "_id": id, "_source": source, "sort": values })
                }
            })
            .collect();

        let mut response = json!({ "hits": { "hits": hits } });
        if let Some(id) = next_pit_id {
            response["pit_id"] = json!(id);
        }
        ok(response)
    }

    fn bulk(&mut self, path_index: &str, text: &str) -> EngineResponse {
        let mut items = Vec::new();
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        while let Some(line) = lines.next() {
            let Ok(Value::Object(header)) = serde_json::from_str::<Value>(line) else {
                return error_response(400, "malformed action line");
            };
            let Some((verb, meta)) = header.into_iter().next() else {
                return error_response(400, "empty action line");
            };
            let id = meta.get("_id").and_then(Value::as_str).unwrap_or_default().to_string();
            let index = meta
                .get("_index")
                .and_then(Value::as_str)
                .unwrap_or(path_index)
                .to_string();
            match verb.as_str() {
                "index" => {
                    let Some(Ok(Value::Object(doc))) = lines.next().map(serde_json::from_str::<Value>) else {
                        return error_response(400, "missing document line");
                    };
                    if self.reject_bulk {
                        items.push(json!({ "index": { "_id": id, "status": 400,
                            "error": { "type": "mapper_parsing_exception", "reason": "rejected" } } }));
                        continue;
                    }
                    self.indices.entry(index).or_default().docs.insert(id.clone(), doc);
                    items.push(json!({ "index": { "_id": id, "status": 201 } }));
                }
                "delete" => {
                    if self.reject_bulk {
                        items.push(json!({ "delete": { "_id": id, "status": 400,
                            "error": { "type": "illegal_argument_exception", "reason": "rejected" } } }));
                        continue;
                    }
                    let removed = self
                        .indices
                        .get_mut(&index)
                        .and_then(|i| i.docs.remove(&id))
                        .is_some();
                    let status = if removed { 200 } else { 404 };
                    items.push(json!({ "delete": { "_id": id, "status": status } }));
                }
                _ => return error_response(400, "unknown bulk action"),
            }
        }
        ok(json!({ "took": 1, "errors": self.reject_bulk, "items": items }))
    }

    fn delete_by_query(&mut self, index: &str, body: &Value) -> EngineResponse {
        let Some(stored) = self.indices.get_mut(index) else {
            return error_response(404, "index_not_found_exception");
        };
        let query = body.get("query").cloned().unwrap_or(Value::Null);
        let before = stored.docs.len();
        stored.docs.retain(|_, source| !matches(&query, source));
        ok(json!({ "deleted": before - stored.docs.len() }))
    }
}

#[async_trait]
impl SearchTransport for FakeEngine {
    async fn perform(&self, request: EngineRequest) -> Result<EngineResponse, TransportError> {
        let mut state = self.state.lock().await;
        state.requests.push(request.clone());
        if state.disconnected {
            return Err(TransportError::connection("Connection refused"));
        }
        Ok(Self::handle(&mut state, &request))
    }
}

fn ok(body: Value) -> EngineResponse {
    EngineResponse::new(200, body.to_string())
}

fn error_response(status: u16, reason: &str) -> EngineResponse {
    EngineResponse::new(status, json!({ "error": { "reason": reason }, "status": status }).to_string())
}

fn sort_key(clause: &Value) -> Option<(String, bool)> {
    let (field, spec) = clause.as_object()?.iter().next()?;
    let descending = spec.get("order").and_then(Value::as_str) == Some("desc");
    Some((field.clone(), descending))
}

fn values_of<'a>(source: &'a Source, field: &str) -> Vec<&'a Value> {
    match source.get(field) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(value) => vec![value],
    }
}

fn first_value(source: &Source, field: &str) -> Value {
    values_of(source, field).first().map_or(Value::Null, |v| (*v).clone())
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

/// Missing values sort last in either direction.
fn compare_keys(a: &[Value], b: &[Value], sort: &[(String, bool)]) -> Ordering {
    for (i, (_, descending)) in sort.iter().enumerate() {
        let (x, y) = (&a[i], &b[i]);
        let ord = match (x.is_null(), y.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            _ if *descending => compare_values(y, x),
            _ => compare_values(x, y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn matches(query: &Value, source: &Source) -> bool {
    let Some((kind, body)) = query.as_object().and_then(|q| q.iter().next()) else {
        return false;
    };
    let field_clause = || body.as_object().and_then(|b| b.iter().next());
    match kind.as_str() {
        "match_all" => true,
        "bool" => {
            let clauses = |name: &str| {
                body.get(name)
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default()
            };
            let must = clauses("must");
            let should = clauses("should");
            let must_not = clauses("must_not");
            let minimum = body
                .get("minimum_should_match")
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize;
            must.iter().all(|q| matches(q, source))
                && should.iter().filter(|q| matches(q, source)).count() >= minimum
                && !must_not.iter().any(|q| matches(q, source))
        }
        "exists" => {
            let field = body.get("field").and_then(Value::as_str).unwrap_or_default();
            !values_of(source, field).is_empty()
        }
        "term" => field_clause().is_some_and(|(field, expected)| {
            values_of(source, field)
                .into_iter()
                .any(|v| compare_values(v, expected) == Ordering::Equal && same_kind(v, expected))
        }),
        "match_phrase" | "match_phrase_prefix" => field_clause().is_some_and(|(field, text)| {
            let needle = text.as_str().unwrap_or_default().to_lowercase();
            values_of(source, field).into_iter().any(|v| {
                let hay = v.as_str().unwrap_or_default().to_lowercase();
                if kind == "match_phrase" {
                    hay.contains(&needle)
                } else {
                    hay.split_whitespace().any(|word| word.starts_with(&needle))
                        || hay.starts_with(&needle)
                }
            })
        }),
        "range" => field_clause().is_some_and(|(field, bounds)| {
            values_of(source, field).into_iter().any(|v| {
                let check = |op: &str, accept: &[Ordering]| {
                    bounds
                        .get(op)
                        .map_or(true, |bound| accept.contains(&compare_values(v, bound)))
                };
                v.is_number()
                    && check("gte", &[Ordering::Greater, Ordering::Equal])
                    && check("gt", &[Ordering::Greater])
                    && check("lte", &[Ordering::Less, Ordering::Equal])
                    && check("lt", &[Ordering::Less])
            })
        }),
        _ => false,
    }
}

fn same_kind(a: &Value, b: &Value) -> bool {
    (a.is_number() && b.is_number()) || (a.is_string() && b.is_string())
}

/// Yield to the runtime so spawned background requests complete.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// Configuration pointing at a local engine with immediate refresh.
pub fn test_config() -> ElasticConfig {
    ElasticConfig::with_servers(&["http://localhost:9200"])
        .unwrap()
        .with_refresh(RefreshPolicy::Immediate)
}

/// A code review change, the entity indexed by the tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub id: i64,
    pub project: String,
    pub subject: String,
    pub updated: DateTime<Utc>,
}

impl Change {
    /// A change updated `minutes` after a fixed epoch.
    pub fn new(id: i64, project: &str, minutes: i64) -> Self {
        Self {
            id,
            project: project.to_string(),
            subject: format!("Change {}", id),
            updated: Utc.timestamp_millis_opt(1_600_000_000_000 + minutes * 60_000).unwrap(),
        }
    }
}

pub fn change_schema() -> Schema {
    Schema::builder(1)
        .field(FieldDef::integer("id").stored())
        .field(FieldDef::exact("project").stored())
        .field(FieldDef::full_text("subject").stored())
        .field(FieldDef::timestamp("updated").stored())
        .field(FieldDef::prefix("file").repeatable())
        .field(FieldDef::stored_only("blob").stored())
        .build()
        .unwrap()
}

/// Binding for [`Change`]. Ids passed to [`ChangeBinding::forget`] decode to
/// `None`, like entities deleted from the system of record.
#[derive(Default)]
pub struct ChangeBinding {
    forgotten: std::sync::Mutex<HashSet<i64>>,
}

impl ChangeBinding {
    pub fn forget(&self, id: i64) {
        self.forgotten.lock().unwrap().insert(id);
    }
}

impl EntityBinding<i64, Change> for ChangeBinding {
    fn base_name(&self) -> &str {
        "changes"
    }

    fn key(&self, change: &Change) -> i64 {
        change.id
    }

    fn to_document(&self, change: &Change) -> Document {
        Document::new()
            .with("id", change.id)
            .with("project", change.project.as_str())
            .with("subject", change.subject.as_str())
            .with("updated", change.updated)
    }

    fn from_document(&self, doc: &Document, _fields: &BTreeSet<String>) -> Option<Change> {
        let id = doc.integer("id")?;
        if self.forgotten.lock().unwrap().contains(&id) {
            return None;
        }
        Some(Change {
            id,
            project: doc.text("project")?.to_string(),
            subject: doc.text("subject")?.to_string(),
            updated: doc.timestamp("updated")?,
        })
    }

    fn sort_order(&self) -> Vec<SortField> {
        vec![SortField::desc("updated"), SortField::desc("id")]
    }

    fn filter_options(&self, opts: QueryOptions) -> QueryOptions {
        opts.filter_fields(|o| {
            let mut fields = o.fields.clone();
            if !fields.is_empty() {
                fields.insert("id".to_string());
            }
            fields
        })
    }
}
