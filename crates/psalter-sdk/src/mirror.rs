//! Collection Mirror - the reconciliation engine shared by every store.
//!
//! A mirror keeps a [`MirrorState`] consistent with one remote collection
//! under three kinds of input: its own loads, its own mutations, and pushed
//! real-time events. The status protocol is the same for every operation:
//!
//! 1. `loading = true`, `error = None` at dispatch
//! 2. the remote call settles
//! 3. the cache is reconciled with the server's answer, or the normalized
//!    error message is recorded
//! 4. `loading = false`, also when the call's future is dropped
//!
//! Reads record failures without returning them; writes record and return
//! them. Nothing serializes overlapping calls: the last one to settle wins.

use crate::auth::{AuthProvider, StoreContext};
use crate::config::OncePolicy;
use crate::error::{Result, StoreError};
use crate::gateway::{Gateway, ListQuery, RecordEvent, RecordOptions};
use crate::realtime::SubscriptionHandle;
use parking_lot::RwLock;
use psalter_core::{Entity, MirrorState, Placement, RealtimeEvent};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Changes observers can react to.
#[derive(Clone, Debug, PartialEq)]
pub enum MirrorEvent {
    /// A load replaced the cache.
    Loaded { count: usize },
    /// An entity was inserted or replaced.
    Upserted { id: String },
    /// An entity was removed.
    Removed { id: String },
    /// An operation failed with the given display message.
    Failed { message: String },
}

pub(crate) fn decode<T: DeserializeOwned>(collection: &str, raw: Value) -> Result<T> {
    serde_json::from_value(raw).map_err(|e| StoreError::decode(collection, e))
}

pub(crate) fn decode_all<T: DeserializeOwned>(collection: &str, raw: Vec<Value>) -> Result<Vec<T>> {
    raw.into_iter().map(|r| decode(collection, r)).collect()
}

/// Clears `loading` when the operation settles or is dropped.
struct Pending<'a, T> {
    state: &'a RwLock<MirrorState<T>>,
}

impl<'a, T> Pending<'a, T> {
    fn begin(state: &'a RwLock<MirrorState<T>>) -> Self {
        {
            let mut state = state.write();
            state.loading = true;
            state.error = None;
        }
        Self { state }
    }
}

impl<T> Drop for Pending<'_, T> {
    fn drop(&mut self) {
        self.state.write().loading = false;
    }
}

fn fold_into<T: Entity + PartialEq>(
    state: &RwLock<MirrorState<T>>,
    changes: &broadcast::Sender<MirrorEvent>,
    event: RealtimeEvent<T>,
) -> bool {
    let id = event.record.id().to_string();
    let removal = event.action == psalter_core::Action::Delete;
    let changed = state.write().fold(event);
    if changed {
        let _ = changes.send(if removal {
            MirrorEvent::Removed { id }
        } else {
            MirrorEvent::Upserted { id }
        });
    }
    changed
}

/// Whether a pushed `record` belongs to the signed-in church.
///
/// Unscoped mirrors accept every record; scoped ones drop everything while
/// signed out.
fn in_scope(auth: &dyn AuthProvider, field: Option<&str>, record: &Value) -> bool {
    let Some(field) = field else {
        return true;
    };
    match auth.current() {
        Some(auth) => record.get(field).and_then(Value::as_str) == Some(auth.church_id.as_str()),
        None => false,
    }
}

/// Cached mirror of one remote collection.
pub struct CollectionMirror<T, G: Gateway> {
    collection: &'static str,
    ctx: StoreContext<G>,
    placement: Placement,
    scope_field: Option<&'static str>,
    state: Arc<RwLock<MirrorState<T>>>,
    once_claimed: AtomicBool,
    changes: broadcast::Sender<MirrorEvent>,
}

impl<T: Entity + PartialEq, G: Gateway> CollectionMirror<T, G> {
    pub fn new(collection: &'static str, ctx: StoreContext<G>, placement: Placement) -> Self {
        let (changes, _) = broadcast::channel(ctx.config.event_capacity);
        Self {
            collection,
            ctx,
            placement,
            scope_field: None,
            state: Arc::new(RwLock::new(MirrorState::new())),
            once_claimed: AtomicBool::new(false),
            changes,
        }
    }

    /// Stamp the signed-in church id into `field` of every created record.
    pub fn scoped_by(mut self, field: &'static str) -> Self {
        self.scope_field = Some(field);
        self
    }

    pub fn collection(&self) -> &'static str {
        self.collection
    }

    pub fn context(&self) -> &StoreContext<G> {
        &self.ctx
    }

    pub fn snapshot(&self) -> MirrorState<T> {
        self.state.read().clone()
    }

    pub fn items(&self) -> Vec<T> {
        self.state.read().items.clone()
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.state.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().is_empty()
    }

    pub fn is_loading(&self) -> bool {
        self.state.read().loading
    }

    pub fn error(&self) -> Option<String> {
        self.state.read().error.clone()
    }

    pub fn success(&self) -> Option<String> {
        self.state.read().success.clone()
    }

    pub fn initialized(&self) -> bool {
        self.state.read().initialized
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<MirrorEvent> {
        self.changes.subscribe()
    }

    pub fn clear_error(&self) {
        self.state.write().clear_error();
    }

    pub fn clear_success(&self) {
        self.state.write().clear_success();
    }

    pub fn set_success(&self, message: impl Into<String>) {
        self.state.write().success = Some(message.into());
    }

    /// Record a failure without a remote call, e.g. a local validation error.
    pub fn record_error(&self, operation: &str, error: &StoreError) {
        let message = error.display_message();
        warn!("{} {} failed: {}", self.collection, operation, message);
        self.state.write().error = Some(message.clone());
        let _ = self.changes.send(MirrorEvent::Failed { message });
    }

    /// Apply a synchronous local adjustment to the cache.
    pub fn modify<R>(&self, f: impl FnOnce(&mut MirrorState<T>) -> R) -> R {
        f(&mut self.state.write())
    }

    /// Run a mutating remote call under the status protocol.
    ///
    /// Failures are recorded in `error` and returned.
    pub async fn track<R, Fut>(&self, operation: &str, call: Fut) -> Result<R>
    where
        Fut: Future<Output = Result<R>>,
    {
        debug!("{} {} dispatched", self.collection, operation);
        let _pending = Pending::begin(&self.state);
        match call.await {
            Ok(value) => Ok(value),
            Err(e) => {
                self.record_error(operation, &e);
                Err(e)
            }
        }
    }

    /// Run a read under the status protocol. Failures are recorded, not returned.
    pub async fn track_read<R, Fut>(&self, operation: &str, call: Fut) -> Option<R>
    where
        Fut: Future<Output = Result<R>>,
    {
        self.track(operation, call).await.ok()
    }

    /// Fetch the full collection matching `query`, decoded.
    pub async fn fetch_all(&self, query: &ListQuery) -> Result<Vec<T>> {
        let raw = self.ctx.gateway.get_full_list(self.collection, query).await?;
        decode_all(self.collection, raw)
    }

    /// Replace the cache with the result of `fetch`.
    ///
    /// On failure the previous items stay in place. Returns whether the load
    /// succeeded.
    pub async fn load_from<Fut>(&self, fetch: Fut) -> bool
    where
        Fut: Future<Output = Result<Vec<T>>>,
    {
        match self.track_read("load", fetch).await {
            Some(items) => {
                let count = {
                    let mut state = self.state.write();
                    state.replace_all(items);
                    state.initialized = true;
                    state.len()
                };
                debug!("{} loaded {} records", self.collection, count);
                let _ = self.changes.send(MirrorEvent::Loaded { count });
                true
            }
            None => false,
        }
    }

    pub async fn load(&self, query: &ListQuery) -> bool {
        self.load_from(self.fetch_all(query)).await
    }

    /// Load unless this mirror already has been, or is being, loaded once.
    ///
    /// Overlapping first calls share a single round-trip. What a failed first
    /// attempt means is decided by the configured [`OncePolicy`].
    pub async fn load_once_from<F, Fut>(&self, fetch: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        let initialized = self.state.read().initialized;
        if initialized || self.once_claimed.swap(true, Ordering::SeqCst) {
            debug!("{} already loaded once, skipping", self.collection);
            return;
        }

        let ok = self.load_from(fetch()).await;
        match self.ctx.config.once_policy {
            OncePolicy::MarkOnAttempt => self.state.write().initialized = true,
            OncePolicy::MarkOnSuccess if !ok => self.once_claimed.store(false, Ordering::SeqCst),
            OncePolicy::MarkOnSuccess => {}
        }
    }

    pub async fn load_once(&self, query: &ListQuery) {
        self.load_once_from(|| self.fetch_all(query)).await
    }

    /// Forget the once-only marker so the next `load_once` hits the gateway.
    pub fn reset(&self) {
        self.state.write().initialized = false;
        self.once_claimed.store(false, Ordering::SeqCst);
    }

    fn scope(&self, data: Value) -> Result<Value> {
        let auth = self.ctx.require_auth()?;
        let Value::Object(mut object) = data else {
            return Err(StoreError::Validation(format!(
                "{} data must be an object",
                self.collection
            )));
        };
        if let Some(field) = self.scope_field {
            object.insert(field.to_string(), Value::String(auth.church_id));
        }
        Ok(Value::Object(object))
    }

    pub async fn create(&self, data: Value) -> Result<T> {
        self.create_with(data, &RecordOptions::default()).await
    }

    /// Create a record and insert the server's version into the cache.
    pub async fn create_with(&self, data: Value, options: &RecordOptions) -> Result<T> {
        let created: T = self
            .track("create", async {
                let data = self.scope(data)?;
                let raw = self.ctx.gateway.create(self.collection, data, options).await?;
                decode(self.collection, raw)
            })
            .await?;

        self.state.write().insert(created.clone(), self.placement);
        let _ = self.changes.send(MirrorEvent::Upserted {
            id: created.id().to_string(),
        });
        Ok(created)
    }

    pub async fn update(&self, id: &str, data: Value) -> Result<T> {
        self.update_with(id, data, &RecordOptions::default()).await
    }

    /// Update a record and replace the cached version. Uncached ids stay uncached.
    pub async fn update_with(&self, id: &str, data: Value, options: &RecordOptions) -> Result<T> {
        let updated: T = self
            .track("update", async {
                self.ctx.require_auth()?;
                let raw = self.ctx.gateway.update(self.collection, id, data, options).await?;
                decode(self.collection, raw)
            })
            .await?;

        if self.state.write().replace(updated.clone()) {
            let _ = self.changes.send(MirrorEvent::Upserted { id: id.to_string() });
        }
        Ok(updated)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.track("delete", async {
            self.ctx.require_auth()?;
            self.ctx.gateway.delete(self.collection, id).await?;
            Ok::<_, StoreError>(())
        })
        .await?;

        if self.state.write().remove(id).is_some() {
            let _ = self.changes.send(MirrorEvent::Removed { id: id.to_string() });
        }
        Ok(())
    }

    /// Fold one typed real-time event into the cache.
    pub fn apply_event(&self, event: RealtimeEvent<T>) -> bool {
        fold_into(&self.state, &self.changes, event)
    }

    /// Decode and fold a raw real-time event. Undecodable records are skipped.
    /// Records scoped to another church are ignored.
    pub fn apply_raw(&self, event: RecordEvent) -> bool {
        if !in_scope(self.ctx.auth.as_ref(), self.scope_field, &event.record) {
            debug!("Ignoring out-of-scope {} event", self.collection);
            return false;
        }
        match event.try_map(|raw| decode::<T>(self.collection, raw)) {
            Ok(event) => self.apply_event(event),
            Err(e) => {
                warn!("Dropping undecodable {} event: {}", self.collection, e);
                false
            }
        }
    }

    /// Subscribe to `topic` (`*` or a record id) and fold every event.
    ///
    /// Opening a subscription leaves `loading` and `error` alone; only a
    /// failure to open is recorded. Events for records of another church are
    /// dropped, checked against the auth context current at delivery.
    pub async fn subscribe_to_updates(&self, topic: &str) -> Result<SubscriptionHandle> {
        self.subscribe_with(topic, |_, _| true).await
    }

    /// Like [`subscribe_to_updates`](Self::subscribe_to_updates), folding only
    /// the events `admit` accepts. `admit` sees the cache as it was before the
    /// event.
    pub async fn subscribe_with<F>(&self, topic: &str, mut admit: F) -> Result<SubscriptionHandle>
    where
        F: FnMut(&RealtimeEvent<T>, &MirrorState<T>) -> bool + Send + 'static,
    {
        let subscription = match self.ctx.gateway.subscribe(self.collection, topic).await {
            Ok(subscription) => subscription,
            Err(e) => {
                let e = StoreError::from(e);
                self.record_error("subscribe", &e);
                return Err(e);
            }
        };

        let collection = self.collection;
        let scope_field = self.scope_field;
        let auth = Arc::clone(&self.ctx.auth);
        let state = Arc::clone(&self.state);
        let changes = self.changes.clone();
        Ok(SubscriptionHandle::spawn(collection, subscription, move |raw| {
            if !in_scope(auth.as_ref(), scope_field, &raw.record) {
                debug!("Ignoring out-of-scope {} event", collection);
                return;
            }
            match raw.try_map(|r| decode::<T>(collection, r)) {
                Ok(event) => {
                    let admitted = admit(&event, &state.read());
                    if admitted {
                        fold_into(&state, &changes, event);
                    }
                }
                Err(e) => warn!("Dropping undecodable {} event: {}", collection, e),
            }
        }))
    }
}
