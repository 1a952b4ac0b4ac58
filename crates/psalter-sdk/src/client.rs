//! Composition root for the stores of one signed-in session.

use crate::auth::{AuthProvider, StoreContext};
use crate::config::StoreConfig;
use crate::gateway::Gateway;
use crate::memory::MemoryGateway;
use crate::stores::{RoleStore, SettingsStore, SetlistStore, SkillStore};
use parking_lot::Mutex;
use std::sync::Arc;

/// Hands out stores bound to one gateway, auth provider and config.
///
/// Role, setlist and settings stores are created fresh on every call, each
/// owning its own cache. The skill store is shared: every call returns the
/// same instance, so all holders read and write one cache.
///
/// # Example
///
/// ```rust
/// use psalter_sdk::{AuthContext, ChurchClient, StaticAuth, StoreConfig};
/// use std::sync::Arc;
///
/// let auth = Arc::new(StaticAuth::new(AuthContext::new("church-1", "user-1")));
/// let client = ChurchClient::with_memory_gateway(auth, StoreConfig::default());
///
/// let a = client.skill_store();
/// let b = client.skill_store();
/// assert!(Arc::ptr_eq(&a, &b));
/// ```
pub struct ChurchClient<G: Gateway> {
    ctx: StoreContext<G>,
    skills: Mutex<Option<Arc<SkillStore<G>>>>,
}

impl ChurchClient<MemoryGateway> {
    /// Create a client over a fresh in-process gateway (for tests and demos).
    pub fn with_memory_gateway(auth: Arc<dyn AuthProvider>, config: StoreConfig) -> Self {
        Self::new(Arc::new(MemoryGateway::new()), auth, config)
    }
}

impl<G: Gateway> ChurchClient<G> {
    pub fn new(gateway: Arc<G>, auth: Arc<dyn AuthProvider>, config: StoreConfig) -> Self {
        Self {
            ctx: StoreContext::new(gateway, auth, config),
            skills: Mutex::new(None),
        }
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.ctx.gateway
    }

    pub fn config(&self) -> &StoreConfig {
        &self.ctx.config
    }

    pub fn context(&self) -> &StoreContext<G> {
        &self.ctx
    }

    pub fn role_store(&self) -> RoleStore<G> {
        RoleStore::new(self.ctx.clone())
    }

    pub fn setlist_store(&self) -> SetlistStore<G> {
        SetlistStore::new(self.ctx.clone())
    }

    pub fn settings_store(&self) -> SettingsStore<G> {
        SettingsStore::new(self.ctx.clone())
    }

    /// The shared skill store, created on first use.
    pub fn skill_store(&self) -> Arc<SkillStore<G>> {
        let mut shared = self.skills.lock();
        Arc::clone(shared.get_or_insert_with(|| Arc::new(SkillStore::new(self.ctx.clone()))))
    }
}
