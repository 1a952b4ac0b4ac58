//! In-memory gateway for testing and simulation.
//!
//! `MemoryGateway` keeps every collection as a vector of JSON records and
//! behaves like the remote database closely enough for the stores: it assigns
//! ids and timestamps, resolves `expand` through a relation registry, pages and
//! sorts listings, and fans out create/update/delete events to subscribers.
//! Tests can count calls and inject one-shot failures per operation.

use crate::error::GatewayError;
use crate::gateway::{
    Gateway, ListQuery, ListResult, RecordEvent, RecordOptions, SendOptions, Subscription,
};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use psalter_core::{Action, RealtimeEvent};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use ulid::Ulid;

/// Gateway operations, used to address call counters and injected failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    GetOne,
    GetFullList,
    GetList,
    Create,
    Update,
    Delete,
    Subscribe,
    Send,
}

type RpcHandler = Arc<dyn Fn(&Value) -> Result<Value, GatewayError> + Send + Sync>;

struct Subscriber {
    collection: String,
    topic: String,
    tx: mpsc::UnboundedSender<RecordEvent>,
}

/// Type alias for the subscriber table shared with unsubscribe hooks.
type SharedSubscribers = Arc<Mutex<HashMap<u64, Subscriber>>>;

pub struct MemoryGateway {
    collections: RwLock<HashMap<String, Vec<Value>>>,
    relations: RwLock<HashMap<(String, String), String>>,
    handlers: RwLock<HashMap<String, RpcHandler>>,
    subscribers: SharedSubscribers,
    next_subscriber: AtomicU64,
    failures: Mutex<Vec<(Operation, String, GatewayError)>>,
    calls: Mutex<HashMap<(Operation, String), usize>>,
    latency: Mutex<Option<Duration>>,
    unsubscribe_hooks: AtomicBool,
    last_stamp: AtomicI64,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            relations: RwLock::new(HashMap::new()),
            handlers: RwLock::new(HashMap::new()),
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            next_subscriber: AtomicU64::new(1),
            failures: Mutex::new(Vec::new()),
            calls: Mutex::new(HashMap::new()),
            latency: Mutex::new(None),
            unsubscribe_hooks: AtomicBool::new(true),
            last_stamp: AtomicI64::new(0),
        }
    }

    /// Declare that `field` on `collection` holds ids from `target`.
    pub fn relate(&self, collection: &str, field: &str, target: &str) {
        self.relations
            .write()
            .insert((collection.to_string(), field.to_string()), target.to_string());
    }

    /// Insert a record directly, without events or call accounting.
    ///
    /// Missing `id`, `created` and `updated` fields are filled in.
    pub fn seed(&self, collection: &str, record: Value) -> Value {
        let record = self.stamp_new(record);
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .push(record.clone());
        record
    }

    pub fn records(&self, collection: &str) -> Vec<Value> {
        self.collections
            .read()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Register the handler answering `send(path, ..)`.
    pub fn on_send<F>(&self, path: &str, handler: F)
    where
        F: Fn(&Value) -> Result<Value, GatewayError> + Send + Sync + 'static,
    {
        self.handlers.write().insert(path.to_string(), Arc::new(handler));
    }

    /// Make the next `operation` on `target` (collection name or send path) fail.
    pub fn fail_next(&self, operation: Operation, target: &str, error: GatewayError) {
        self.failures
            .lock()
            .push((operation, target.to_string(), error));
    }

    pub fn call_count(&self, operation: Operation, target: &str) -> usize {
        self.calls
            .lock()
            .get(&(operation, target.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Delay every call by `latency` before it touches any data.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Hand out subscriptions without an unsubscribe hook.
    pub fn set_unsubscribe_hooks(&self, enabled: bool) {
        self.unsubscribe_hooks.store(enabled, AtomicOrdering::SeqCst);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Push an event to subscribers without touching stored data, as if another
    /// client had changed the record.
    pub fn emit(&self, collection: &str, action: Action, record: Value) {
        self.notify(collection, RealtimeEvent::new(action, record));
    }

    async fn enter(&self, operation: Operation, target: &str) -> Result<(), GatewayError> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        *self
            .calls
            .lock()
            .entry((operation, target.to_string()))
            .or_insert(0) += 1;

        let mut failures = self.failures.lock();
        if let Some(at) = failures
            .iter()
            .position(|(op, t, _)| *op == operation && t == target)
        {
            let (_, _, error) = failures.remove(at);
            return Err(error);
        }
        Ok(())
    }

    fn stamp(&self) -> String {
        let now = chrono::Utc::now().timestamp_micros();
        let mut last = self.last_stamp.load(AtomicOrdering::SeqCst);
        let micros = loop {
            let next = now.max(last + 1);
            match self.last_stamp.compare_exchange(
                last,
                next,
                AtomicOrdering::SeqCst,
                AtomicOrdering::SeqCst,
            ) {
                Ok(_) => break next,
                Err(actual) => last = actual,
            }
        };

        chrono::DateTime::from_timestamp(
            micros.div_euclid(1_000_000),
            (micros.rem_euclid(1_000_000) * 1_000) as u32,
        )
        .map(|t| t.format("%Y-%m-%d %H:%M:%S%.6fZ").to_string())
        .unwrap_or_default()
    }

    fn stamp_new(&self, record: Value) -> Value {
        let mut object = match record {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        if !object.get("id").is_some_and(Value::is_string) {
            object.insert(
                "id".to_string(),
                Value::String(Ulid::new().to_string().to_lowercase()),
            );
        }
        let now = self.stamp();
        object
            .entry("created")
            .or_insert_with(|| Value::String(now.clone()));
        object.entry("updated").or_insert(Value::String(now));
        Value::Object(object)
    }

    fn notify(&self, collection: &str, event: RecordEvent) {
        let id = event
            .record
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        self.subscribers.lock().retain(|_, sub| {
            if sub.collection != collection || (sub.topic != "*" && sub.topic != id) {
                return true;
            }
            sub.tx.send(event.clone()).is_ok()
        });
    }

    fn expand(&self, collection: &str, mut record: Value, fields: &[String]) -> Value {
        if fields.is_empty() {
            return record;
        }

        let relations = self.relations.read();
        let collections = self.collections.read();
        let mut expanded = Map::new();

        for field in fields {
            let Some(target) = relations.get(&(collection.to_string(), field.clone())) else {
                continue;
            };
            let Some(rows) = collections.get(target) else {
                continue;
            };
            let find = |id: &str| rows.iter().find(|r| r.get("id").and_then(Value::as_str) == Some(id));

            match record.get(field) {
                Some(Value::String(id)) => {
                    if let Some(found) = find(id.as_str()) {
                        expanded.insert(field.clone(), found.clone());
                    }
                }
                Some(Value::Array(ids)) => {
                    let found: Vec<Value> = ids
                        .iter()
                        .filter_map(Value::as_str)
                        .filter_map(|id| find(id).cloned())
                        .collect();
                    expanded.insert(field.clone(), Value::Array(found));
                }
                _ => {}
            }
        }

        if !expanded.is_empty() {
            record["expand"] = Value::Object(expanded);
        }
        record
    }

    fn query(&self, collection: &str, query: &ListQuery) -> Vec<Value> {
        let mut rows: Vec<Value> = self
            .collections
            .read()
            .get(collection)
            .map(|rows| rows.iter().filter(|r| matches(r, query)).cloned().collect())
            .unwrap_or_default();

        if let Some(sort) = &query.sort {
            let keys: Vec<(&str, bool)> = sort
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(|k| match k.strip_prefix('-') {
                    Some(field) => (field, true),
                    None => (k.trim_start_matches('+'), false),
                })
                .collect();

            rows.sort_by(|a, b| {
                keys.iter()
                    .map(|(field, desc)| {
                        let ord = compare_values(a.get(*field), b.get(*field));
                        if *desc {
                            ord.reverse()
                        } else {
                            ord
                        }
                    })
                    .find(|ord| *ord != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }

        rows.into_iter()
            .map(|r| self.expand(collection, r, &query.expand))
            .collect()
    }
}

fn matches(record: &Value, query: &ListQuery) -> bool {
    let filters_match = query.filters.iter().all(|(field, expected)| match record.get(field) {
        Some(Value::Array(values)) if !expected.is_array() => values.contains(expected),
        Some(actual) => actual == expected,
        None => expected.is_null(),
    });
    if !filters_match {
        return false;
    }

    match &query.search {
        Some(search) => {
            let term = search.term.to_lowercase();
            search.fields.iter().any(|field| {
                record
                    .get(field)
                    .and_then(Value::as_str)
                    .is_some_and(|v| v.to_lowercase().contains(&term))
            })
        }
        None => true,
    }
}

fn rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(_) => 4,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn get_one(
        &self,
        collection: &str,
        id: &str,
        options: &RecordOptions,
    ) -> Result<Value, GatewayError> {
        self.enter(Operation::GetOne, collection).await?;

        let found = self
            .collections
            .read()
            .get(collection)
            .and_then(|rows| {
                rows.iter()
                    .find(|r| r.get("id").and_then(Value::as_str) == Some(id))
                    .cloned()
            })
            .ok_or_else(|| GatewayError::not_found(collection, id))?;

        Ok(self.expand(collection, found, &options.expand))
    }

    async fn get_full_list(&self, collection: &str, query: &ListQuery) -> Result<Vec<Value>, GatewayError> {
        self.enter(Operation::GetFullList, collection).await?;
        Ok(self.query(collection, query))
    }

    async fn get_list(
        &self,
        collection: &str,
        page: u32,
        per_page: u32,
        query: &ListQuery,
    ) -> Result<ListResult<Value>, GatewayError> {
        self.enter(Operation::GetList, collection).await?;

        let page = page.max(1);
        let per_page = per_page.max(1);
        let rows = self.query(collection, query);
        let total_items = rows.len();
        let items = rows
            .into_iter()
            .skip(((page - 1) * per_page) as usize)
            .take(per_page as usize)
            .collect();

        Ok(ListResult {
            page,
            per_page,
            total_items,
            items,
        })
    }

    async fn create(
        &self,
        collection: &str,
        data: Value,
        options: &RecordOptions,
    ) -> Result<Value, GatewayError> {
        self.enter(Operation::Create, collection).await?;

        if !data.is_object() {
            return Err(GatewayError::bad_request("Failed to create record.")
                .with_data(serde_json::json!({"message": "Record data must be an object"})));
        }

        let record = self.seed(collection, data);
        self.notify(collection, RealtimeEvent::new(Action::Create, record.clone()));
        Ok(self.expand(collection, record, &options.expand))
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        options: &RecordOptions,
    ) -> Result<Value, GatewayError> {
        self.enter(Operation::Update, collection).await?;

        let stamp = self.stamp();
        let updated = {
            let mut collections = self.collections.write();
            let record = collections
                .get_mut(collection)
                .and_then(|rows| {
                    rows.iter_mut()
                        .find(|r| r.get("id").and_then(Value::as_str) == Some(id))
                })
                .ok_or_else(|| GatewayError::not_found(collection, id))?;

            if let (Some(target), Value::Object(patch)) = (record.as_object_mut(), data) {
                for (key, value) in patch {
                    if key != "id" && key != "created" && key != "expand" {
                        target.insert(key, value);
                    }
                }
                target.insert("updated".to_string(), Value::String(stamp));
            }
            record.clone()
        };

        self.notify(collection, RealtimeEvent::new(Action::Update, updated.clone()));
        Ok(self.expand(collection, updated, &options.expand))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), GatewayError> {
        self.enter(Operation::Delete, collection).await?;

        let removed = {
            let mut collections = self.collections.write();
            let rows = collections
                .get_mut(collection)
                .ok_or_else(|| GatewayError::not_found(collection, id))?;
            let at = rows
                .iter()
                .position(|r| r.get("id").and_then(Value::as_str) == Some(id))
                .ok_or_else(|| GatewayError::not_found(collection, id))?;
            rows.remove(at)
        };

        self.notify(collection, RealtimeEvent::new(Action::Delete, removed));
        Ok(())
    }

    async fn subscribe(&self, collection: &str, topic: &str) -> Result<Subscription, GatewayError> {
        self.enter(Operation::Subscribe, collection).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let key = self.next_subscriber.fetch_add(1, AtomicOrdering::SeqCst);
        self.subscribers.lock().insert(
            key,
            Subscriber {
                collection: collection.to_string(),
                topic: topic.to_string(),
                tx,
            },
        );

        if !self.unsubscribe_hooks.load(AtomicOrdering::SeqCst) {
            return Ok(Subscription::new(rx, None));
        }

        let subscribers = Arc::clone(&self.subscribers);
        let unsubscribe: Box<dyn FnOnce() + Send> = Box::new(move || {
            subscribers.lock().remove(&key);
        });
        Ok(Subscription::new(rx, Some(unsubscribe)))
    }

    async fn send(&self, path: &str, options: SendOptions) -> Result<Value, GatewayError> {
        self.enter(Operation::Send, path).await?;

        let handler = self
            .handlers
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| GatewayError::new(404, format!("No route for {}", path)))?;
        handler(&options.body)
    }
}
