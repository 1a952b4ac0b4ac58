//! Remote collection API abstractions.
//!
//! The gateway is the only component that talks to the remote database. Records
//! cross it as raw JSON; the mirrors decode them into typed entities.

use crate::error::GatewayError;
use async_trait::async_trait;
use psalter_core::RealtimeEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// Raw real-time event as delivered by the transport.
pub type RecordEvent = RealtimeEvent<Value>;

/// Free-text search across a set of fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Search {
    pub fields: Vec<String>,
    pub term: String,
}

/// Structured list query.
///
/// Equality filters are ANDed together. `sort` is a comma-separated list of
/// field names, each optionally prefixed with `-` for descending order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ListQuery {
    pub filters: Vec<(String, Value)>,
    pub search: Option<Search>,
    pub sort: Option<String>,
    pub expand: Vec<String>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    /// Add a search clause. Blank terms are dropped.
    pub fn search<I, S>(mut self, fields: I, term: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let term = term.into();
        if !term.trim().is_empty() {
            self.search = Some(Search {
                fields: fields.into_iter().map(Into::into).collect(),
                term: term.trim().to_string(),
            });
        }
        self
    }

    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn expand(mut self, field: impl Into<String>) -> Self {
        self.expand.push(field.into());
        self
    }
}

/// Options for single-record calls.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordOptions {
    pub expand: Vec<String>,
}

impl RecordOptions {
    pub fn expand(field: impl Into<String>) -> Self {
        Self {
            expand: vec![field.into()],
        }
    }
}

/// One page of a paginated listing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult<T> {
    pub page: u32,
    pub per_page: u32,
    pub total_items: usize,
    pub items: Vec<T>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    #[default]
    Post,
    Patch,
    Delete,
}

/// Options for a one-off RPC-style call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SendOptions {
    pub method: Method,
    pub body: Value,
}

impl SendOptions {
    pub fn post(body: Value) -> Self {
        Self {
            method: Method::Post,
            body,
        }
    }
}

type Unsubscribe = Box<dyn FnOnce() + Send>;

/// An open real-time subscription.
///
/// `events` ends when the gateway closes the subscription. The unsubscribe
/// hook is optional; some transports have nothing to close.
pub struct Subscription {
    pub events: mpsc::UnboundedReceiver<RecordEvent>,
    unsubscribe: Option<Unsubscribe>,
}

impl Subscription {
    pub fn new(events: mpsc::UnboundedReceiver<RecordEvent>, unsubscribe: Option<Unsubscribe>) -> Self {
        Self {
            events,
            unsubscribe,
        }
    }

    pub fn into_parts(self) -> (mpsc::UnboundedReceiver<RecordEvent>, Option<Unsubscribe>) {
        (self.events, self.unsubscribe)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("has_unsubscribe", &self.unsubscribe.is_some())
            .finish()
    }
}

/// Remote collection API.
#[async_trait]
pub trait Gateway: Send + Sync + 'static {
    async fn get_one(
        &self,
        collection: &str,
        id: &str,
        options: &RecordOptions,
    ) -> Result<Value, GatewayError>;

    async fn get_full_list(&self, collection: &str, query: &ListQuery) -> Result<Vec<Value>, GatewayError>;

    async fn get_list(
        &self,
        collection: &str,
        page: u32,
        per_page: u32,
        query: &ListQuery,
    ) -> Result<ListResult<Value>, GatewayError>;

    async fn create(
        &self,
        collection: &str,
        data: Value,
        options: &RecordOptions,
    ) -> Result<Value, GatewayError>;

    async fn update(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        options: &RecordOptions,
    ) -> Result<Value, GatewayError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), GatewayError>;

    /// Subscribe to a collection. `topic` is `*` for every record or a record id.
    async fn subscribe(&self, collection: &str, topic: &str) -> Result<Subscription, GatewayError>;

    /// One-off RPC-style call returning a free-form result.
    async fn send(&self, path: &str, options: SendOptions) -> Result<Value, GatewayError>;
}
