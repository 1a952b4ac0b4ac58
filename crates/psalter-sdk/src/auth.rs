//! Authentication context and the store context handed to every store.

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::gateway::Gateway;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Who is signed in, and for which church.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub church_id: String,
    pub user_id: String,
    pub membership_id: Option<String>,
}

impl AuthContext {
    pub fn new(church_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            church_id: church_id.into(),
            user_id: user_id.into(),
            membership_id: None,
        }
    }

    pub fn with_membership(mut self, membership_id: impl Into<String>) -> Self {
        self.membership_id = Some(membership_id.into());
        self
    }
}

/// Source of the current auth context.
///
/// Stores call [`AuthProvider::current`] at the start of every operation and
/// never cache the result.
pub trait AuthProvider: Send + Sync + 'static {
    fn current(&self) -> Option<AuthContext>;
}

/// A fixed snapshot.
#[derive(Clone, Debug)]
pub struct StaticAuth(Option<AuthContext>);

impl StaticAuth {
    pub fn new(context: AuthContext) -> Self {
        Self(Some(context))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl AuthProvider for StaticAuth {
    fn current(&self) -> Option<AuthContext> {
        self.0.clone()
    }
}

/// A live source that follows sign-in, church switches and sign-out.
#[derive(Clone, Debug)]
pub struct LiveAuth {
    rx: watch::Receiver<Option<AuthContext>>,
}

/// Writer side of a [`LiveAuth`].
#[derive(Debug)]
pub struct LiveAuthHandle {
    tx: watch::Sender<Option<AuthContext>>,
}

impl LiveAuth {
    pub fn new(initial: Option<AuthContext>) -> (Self, LiveAuthHandle) {
        let (tx, rx) = watch::channel(initial);
        (Self { rx }, LiveAuthHandle { tx })
    }

    /// Wait for the next change of auth context.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

impl AuthProvider for LiveAuth {
    fn current(&self) -> Option<AuthContext> {
        self.rx.borrow().clone()
    }
}

impl LiveAuthHandle {
    pub fn sign_in(&self, context: AuthContext) {
        self.tx.send_replace(Some(context));
    }

    pub fn switch_church(&self, church_id: impl Into<String>) {
        let church_id = church_id.into();
        self.tx.send_modify(|current| {
            if let Some(context) = current {
                context.church_id = church_id;
            }
        });
    }

    pub fn sign_out(&self) {
        self.tx.send_replace(None);
    }
}

/// Everything a store needs: the gateway handle, the auth source and config.
pub struct StoreContext<G: Gateway> {
    pub gateway: Arc<G>,
    pub auth: Arc<dyn AuthProvider>,
    pub config: StoreConfig,
}

impl<G: Gateway> Clone for StoreContext<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
            auth: Arc::clone(&self.auth),
            config: self.config.clone(),
        }
    }
}

impl<G: Gateway> StoreContext<G> {
    pub fn new(gateway: Arc<G>, auth: Arc<dyn AuthProvider>, config: StoreConfig) -> Self {
        Self {
            gateway,
            auth,
            config,
        }
    }

    /// Read the auth context fresh, failing when nobody is signed in.
    pub fn require_auth(&self) -> Result<AuthContext, StoreError> {
        self.auth.current().ok_or(StoreError::Unauthenticated)
    }
}
