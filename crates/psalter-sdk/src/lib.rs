//! Psalter SDK - reactive stores for a church scheduling workspace.
//!
//! Each store mirrors one or more remote collections (roles, setlists,
//! skills, church settings) in memory, keeps that mirror consistent with its
//! own writes and with pushed real-time events, and exposes `loading`,
//! `error` and `success` status for a UI to render.
//!
//! # Quick Start
//!
//! ```rust
//! use psalter_sdk::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> psalter_sdk::Result<()> {
//! let auth = Arc::new(StaticAuth::new(AuthContext::new("church-1", "user-1")));
//! let client = ChurchClient::with_memory_gateway(auth, StoreConfig::default());
//!
//! let skills = client.skill_store();
//! skills.create_skill(SkillDraft::new("Keys").category("Band")).await?;
//! skills.load_skills_once().await;
//!
//! assert_eq!(skills.skills().len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`gateway`] - Remote collection API and its query types
//! - [`memory`] - In-process gateway for tests and demos
//! - [`auth`] - Auth providers and the per-store context
//! - [`mirror`] - Generic collection mirror implementing the status protocol
//! - [`realtime`] - Subscription handles
//! - [`stores`] - Role, setlist, skill and settings stores
//! - [`client`] - Composition root
//! - [`config`] - Store configuration
//! - [`error`] - Error types

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod mirror;
pub mod realtime;
pub mod stores;

// Re-exports for convenience
pub use auth::{AuthContext, AuthProvider, LiveAuth, LiveAuthHandle, StaticAuth, StoreContext};
pub use client::ChurchClient;
pub use config::{OncePolicy, StoreConfig, StoreConfigBuilder};
pub use error::{GatewayError, Result, StoreError};
pub use gateway::{
    Gateway, ListQuery, ListResult, Method, RecordEvent, RecordOptions, Search, SendOptions, Subscription,
};
pub use memory::{MemoryGateway, Operation};
pub use mirror::{CollectionMirror, MirrorEvent};
pub use realtime::SubscriptionHandle;
pub use stores::{
    ImportSummary, KeyTestOutcome, RoleDraft, RoleStore, SetlistDraft, SetlistFilter, SetlistStore,
    SettingsStore, SkillDraft, SkillStore, StatusCounts,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::auth::{AuthContext, AuthProvider, LiveAuth, StaticAuth};
    pub use crate::client::ChurchClient;
    pub use crate::config::{OncePolicy, StoreConfig, StoreConfigBuilder};
    pub use crate::error::StoreError;
    pub use crate::gateway::{Gateway, ListQuery};
    pub use crate::memory::MemoryGateway;
    pub use crate::stores::{RoleDraft, SetlistDraft, SkillDraft};
    pub use psalter_core::{Permission, ReorderEntry, SetlistStatus};
}
