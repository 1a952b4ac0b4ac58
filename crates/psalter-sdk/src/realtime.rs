//! Real-time subscription handles.

use crate::gateway::{RecordEvent, Subscription};
use tokio::task::JoinHandle;

/// An active real-time subscription feeding a store.
///
/// Dropping the handle leaves the subscription running; the owner must call
/// [`SubscriptionHandle::unsubscribe`] when the store is discarded.
pub struct SubscriptionHandle {
    collection: String,
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    /// Spawn a task applying every event of `subscription` with `fold`.
    pub(crate) fn spawn<F>(collection: &str, subscription: Subscription, mut fold: F) -> Self
    where
        F: FnMut(RecordEvent) + Send + 'static,
    {
        let (mut events, unsubscribe) = subscription.into_parts();
        let name = collection.to_string();
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                fold(event);
            }
            tracing::debug!("Real-time stream for {} ended", name);
        });

        Self {
            collection: collection.to_string(),
            unsubscribe,
            task: Some(task),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Whether events are still being folded.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Close the subscription and stop folding.
    ///
    /// A gateway that provided no unsubscribe hook is simply left alone.
    pub fn unsubscribe(mut self) {
        match self.unsubscribe.take() {
            Some(unsubscribe) => unsubscribe(),
            None => tracing::debug!(
                "Subscription to {} has no unsubscribe hook, skipping",
                self.collection
            ),
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("collection", &self.collection)
            .field("active", &self.is_active())
            .finish()
    }
}
